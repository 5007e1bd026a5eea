//! Screen regions and cropping.

use anyhow::{anyhow, Result};
use image::RgbaImage;

/// A rectangle in virtual-desktop pixels.
///
/// The origin is the top-left corner of the bounding box of all monitors,
/// so coordinates are never negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScreenRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRegion {
    /// Creates a region. Returns `None` for an empty rectangle.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Whether the region lies fully inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x
            .checked_add(self.width)
            .is_some_and(|right| right <= width)
            && self
                .y
                .checked_add(self.height)
                .is_some_and(|bottom| bottom <= height)
    }
}

impl std::fmt::Display for ScreenRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Crops `region` out of `img`.
///
/// Unlike a clamping crop, this fails when the region sticks out of the
/// image: a frame of the wrong size must never reach the recorder.
pub fn crop_region(img: &RgbaImage, region: &ScreenRegion) -> Result<RgbaImage> {
    let (w, h) = img.dimensions();
    if !region.fits_within(w, h) {
        return Err(anyhow!(
            "Region {} is outside the {}x{} screen",
            region,
            w,
            h
        ));
    }

    Ok(image::imageops::crop_imm(img, region.x, region.y, region.width, region.height).to_image())
}
