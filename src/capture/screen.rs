//! Screen grabbing via xcap.

use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use tracing::debug;
use xcap::Monitor;

use super::region::{crop_region, ScreenRegion};

/// Source of screen pixels.
pub trait ScreenSource {
    /// Grabs the whole virtual desktop.
    fn capture_screen(&self) -> Result<RgbaImage>;

    /// Grabs exactly `region.width` x `region.height` pixels.
    fn capture_region(&self, region: ScreenRegion) -> Result<RgbaImage> {
        let screen = self.capture_screen()?;
        crop_region(&screen, &region)
    }
}

/// Captures every monitor with xcap and lays them out at their desktop
/// positions, like a single large screenshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }
}

/// One captured monitor and where it sits on the desktop.
struct MonitorShot {
    x: i32,
    y: i32,
    image: RgbaImage,
}

impl ScreenSource for XcapScreen {
    fn capture_screen(&self) -> Result<RgbaImage> {
        let monitors = Monitor::all().context("Failed to enumerate monitors")?;
        if monitors.is_empty() {
            return Err(anyhow!("No monitors detected"));
        }

        let mut shots = Vec::with_capacity(monitors.len());
        for monitor in &monitors {
            let x = monitor.x().context("Failed to read monitor position")?;
            let y = monitor.y().context("Failed to read monitor position")?;
            let image = monitor
                .capture_image()
                .context("Failed to capture monitor")?;
            shots.push(MonitorShot { x, y, image });
        }

        let screen = composite(&shots);
        debug!(
            "Captured {} monitor(s) as {}x{}",
            shots.len(),
            screen.width(),
            screen.height()
        );
        Ok(screen)
    }
}

/// Places monitor images on one canvas spanning their bounding box.
fn composite(shots: &[MonitorShot]) -> RgbaImage {
    if let [single] = shots {
        return single.image.clone();
    }

    let min_x = shots.iter().map(|s| s.x).min().unwrap_or(0);
    let min_y = shots.iter().map(|s| s.y).min().unwrap_or(0);
    let max_x = shots
        .iter()
        .map(|s| s.x as i64 + s.image.width() as i64)
        .max()
        .unwrap_or(0);
    let max_y = shots
        .iter()
        .map(|s| s.y as i64 + s.image.height() as i64)
        .max()
        .unwrap_or(0);

    let width = (max_x - min_x as i64).max(0) as u32;
    let height = (max_y - min_y as i64).max(0) as u32;
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));

    for shot in shots {
        image::imageops::overlay(
            &mut canvas,
            &shot.image,
            shot.x as i64 - min_x as i64,
            shot.y as i64 - min_y as i64,
        );
    }

    canvas
}
