use image::{GrayImage, Luma, RgbaImage};

/// Sharpening kernel (divided by 16): a strong center tap against its eight neighbors.
const SHARPEN_KERNEL: [[i32; 3]; 3] = [[-2, -2, -2], [-2, 32, -2], [-2, -2, -2]];
const SHARPEN_SCALE: i32 = 16;

/// Prepares raw captures for OCR.
///
/// Every frame gets the same treatment: grayscale, linear contrast boost,
/// sharpen. Nothing depends on previous frames or OCR results.
#[derive(Clone, Copy, Debug)]
pub struct ImageEnhancer {
    pub contrast: f32,
}

impl Default for ImageEnhancer {
    fn default() -> Self {
        Self { contrast: 1.5 }
    }
}

impl ImageEnhancer {
    pub fn new(contrast: f32) -> Self {
        Self { contrast }
    }

    pub fn enhance(&self, frame: &RgbaImage) -> GrayImage {
        let gray = grayscale(frame);
        let contrasted = adjust_contrast(&gray, self.contrast);
        sharpen(&contrasted)
    }
}

/// Converts to single-channel luma using the ITU-R 601 weights
/// (0.299 R + 0.587 G + 0.114 B) in 16-bit fixed point.
pub fn grayscale(img: &RgbaImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = GrayImage::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let r = pixel[0] as u32;
        let g = pixel[1] as u32;
        let b = pixel[2] as u32;
        let luma = (r * 19595 + g * 38470 + b * 7471 + 0x8000) >> 16;
        output.put_pixel(x, y, Luma([luma as u8]));
    }

    output
}

/// Rounded mean gray level of the image.
pub fn mean_level(img: &GrayImage) -> u8 {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0;
    }
    let total: u64 = img.pixels().map(|p| p[0] as u64).sum();
    ((total as f64 / count as f64) + 0.5) as u8
}

/// Scales each pixel's distance from the image's mean gray level by `factor`.
///
/// A factor of 1.0 is the identity, 0.0 flattens the image to its mean.
pub fn adjust_contrast(img: &GrayImage, factor: f32) -> GrayImage {
    let mean = mean_level(img) as f32;
    let mut output = img.clone();

    for pixel in output.pixels_mut() {
        let value = mean + factor * (pixel[0] as f32 - mean);
        pixel[0] = value.round().clamp(0.0, 255.0) as u8;
    }

    output
}

/// Applies the 3x3 sharpening kernel. Border pixels are copied unchanged.
pub fn sharpen(img: &GrayImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = img.clone();
    if width < 3 || height < 3 {
        return output;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = 0i32;
            for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let px = img.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1)[0] as i32;
                    acc += weight * px;
                }
            }
            // Round half up, then clamp
            let value = (acc + SHARPEN_SCALE / 2).div_euclid(SHARPEN_SCALE);
            output.put_pixel(x, y, Luma([value.clamp(0, 255) as u8]));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_grayscale_weights() {
        let mut img = RgbaImage::new(4, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 255, 0, 255]));
        img.put_pixel(2, 0, Rgba([0, 0, 255, 255]));
        img.put_pixel(3, 0, Rgba([255, 255, 255, 255]));

        let gray = grayscale(&img);
        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(2, 0)[0], 29);
        assert_eq!(gray.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn test_contrast_spreads_around_mean() {
        // Mean of 100 and 200 is 150
        let img = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 100 } else { 200 }]));
        let out = adjust_contrast(&img, 1.5);
        assert_eq!(out.get_pixel(0, 0)[0], 75);
        assert_eq!(out.get_pixel(1, 0)[0], 225);
    }

    #[test]
    fn test_contrast_clamps() {
        let img = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 255 }]));
        let out = adjust_contrast(&img, 3.0);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_sharpen_keeps_uniform_image() {
        let img = GrayImage::from_pixel(5, 5, Luma([90]));
        assert_eq!(sharpen(&img), img);
    }

    #[test]
    fn test_sharpen_boosts_isolated_dot() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([100]));
        img.put_pixel(2, 2, Luma([120]));

        let out = sharpen(&img);
        // (32*120 - 16*100) / 16 = 140
        assert_eq!(out.get_pixel(2, 2)[0], 140);
        // Neighbor: (32*100 - 14*100 - 2*120) / 16 = 97.5 -> 98
        assert_eq!(out.get_pixel(1, 1)[0], 98);
        // Borders untouched
        assert_eq!(out.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn test_enhance_is_deterministic_and_grayscale() {
        let frame =
            RgbaImage::from_fn(16, 8, |x, y| Rgba([(x * 13) as u8, (y * 29) as u8, 40, 255]));
        let enhancer = ImageEnhancer::default();

        let a = enhancer.enhance(&frame);
        let b = enhancer.enhance(&frame);
        assert_eq!(a.dimensions(), (16, 8));
        assert_eq!(a, b);
    }
}
