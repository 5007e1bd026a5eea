//! Anchor detection via template matching.
//!
//! The anchor is a reference image whose on-screen bounding box becomes the
//! capture region. Matching uses zero-mean normalized cross-correlation, so
//! a confidence of 1.0 is a pixel-perfect match up to brightness and
//! contrast, and 0.0 means no correlation at all.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::capture::{ScreenRegion, ScreenSource};
use crate::ocr::grayscale;

/// Coarse search keeps the downscaled template at least this many pixels wide and tall.
const MIN_COARSE_TEMPLATE_SIZE: u32 = 8;

/// Coarse hits refined at full resolution.
const COARSE_CANDIDATES: usize = 4;

/// Windows whose intensity variance is below this are treated as flat.
const FLAT_VARIANCE: f64 = 1e-6;

/// The reference image, loaded once.
#[derive(Clone, Debug)]
pub struct Anchor {
    pub path: PathBuf,
    pub image: GrayImage,
}

impl Anchor {
    /// Loads the reference image from disk as grayscale.
    pub fn load(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("Failed to load anchor image {}", path.display()))?
            .to_rgba8();
        Ok(Self {
            path: path.to_path_buf(),
            image: grayscale(&image),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// "Find this image on screen" capability.
pub trait ImageLocator {
    /// Returns the anchor's bounding box when it is visible with at least
    /// `confidence` similarity.
    fn locate_on_screen(&self, anchor: &Anchor, confidence: f32) -> Result<Option<ScreenRegion>>;
}

/// Grabs the screen and searches it for the anchor.
pub struct TemplateMatcher<S> {
    screen: S,
    downscale: u32,
}

impl<S: ScreenSource> TemplateMatcher<S> {
    pub fn new(screen: S, downscale: u32) -> Self {
        Self {
            screen,
            downscale: downscale.max(1),
        }
    }
}

impl<S: ScreenSource> ImageLocator for TemplateMatcher<S> {
    fn locate_on_screen(&self, anchor: &Anchor, confidence: f32) -> Result<Option<ScreenRegion>> {
        let screen = grayscale(&self.screen.capture_screen()?);

        let Some(found) = find_template(&screen, &anchor.image, self.downscale, confidence)
        else {
            return Ok(None);
        };

        debug!(
            "Best anchor match at ({}, {}) score {:.3}",
            found.x, found.y, found.score
        );

        if found.score < confidence {
            return Ok(None);
        }

        let (width, height) = anchor.dimensions();
        Ok(ScreenRegion::new(found.x, found.y, width, height))
    }
}

/// Best template position and its correlation score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemplateMatch {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Zero-mean template values and their norm.
struct PreparedTemplate {
    width: u32,
    height: u32,
    values: Vec<f64>,
    norm: f64,
}

impl PreparedTemplate {
    /// Returns `None` for a flat template, which correlates with nothing.
    fn new(template: &GrayImage) -> Option<Self> {
        let (width, height) = template.dimensions();
        let count = (width as usize) * (height as usize);
        if count == 0 {
            return None;
        }

        let mean = template.as_raw().iter().map(|&v| v as f64).sum::<f64>() / count as f64;
        let values: Vec<f64> = template.as_raw().iter().map(|&v| v as f64 - mean).collect();
        let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();

        if norm * norm / (count as f64) < FLAT_VARIANCE {
            return None;
        }

        Some(Self {
            width,
            height,
            values,
            norm,
        })
    }
}

/// Summed-area tables of pixel values and squared values.
struct Integral {
    stride: usize,
    sum: Vec<u64>,
    sq: Vec<u64>,
}

impl Integral {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq = vec![0u64; stride * (h + 1)];
        let raw = img.as_raw();

        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = raw[y * w + x] as u64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }

        Self { stride, sum, sq }
    }

    /// Sum and squared sum over the `w` x `h` window at (x, y).
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let at = |table: &[u64]| {
            (table[(y + h) * s + x + w] + table[y * s + x]) as f64
                - (table[y * s + x + w] + table[(y + h) * s + x]) as f64
        };
        (at(&self.sum), at(&self.sq))
    }
}

/// Correlation score of the template placed at (x, y).
fn score_at(
    haystack: &GrayImage,
    integral: &Integral,
    template: &PreparedTemplate,
    x: u32,
    y: u32,
) -> f64 {
    let (tw, th) = (template.width as usize, template.height as usize);
    let (x, y) = (x as usize, y as usize);
    let n = (tw * th) as f64;

    let (sum, sq) = integral.window(x, y, tw, th);
    let variance_sum = sq - sum * sum / n;
    if variance_sum / n < FLAT_VARIANCE {
        return 0.0;
    }

    let stride = haystack.width() as usize;
    let raw = haystack.as_raw();
    let mut acc = 0.0;
    for j in 0..th {
        let row = &raw[(y + j) * stride + x..(y + j) * stride + x + tw];
        let t_row = &template.values[j * tw..(j + 1) * tw];
        for (p, t) in row.iter().zip(t_row) {
            acc += *p as f64 * t;
        }
    }

    acc / (variance_sum.sqrt() * template.norm)
}

/// Exhaustive search over the given top-left ranges (inclusive).
fn best_in(
    haystack: &GrayImage,
    integral: &Integral,
    template: &PreparedTemplate,
    xs: (u32, u32),
    ys: (u32, u32),
) -> Option<TemplateMatch> {
    let mut best: Option<TemplateMatch> = None;

    for y in ys.0..=ys.1 {
        for x in xs.0..=xs.1 {
            let score = score_at(haystack, integral, template, x, y) as f32;
            if best.is_none_or(|b| score > b.score) {
                best = Some(TemplateMatch { x, y, score });
            }
        }
    }

    best
}

/// The `count` best placements, at least half a template apart.
///
/// The template must fit inside the haystack.
fn top_candidates(
    haystack: &GrayImage,
    template: &PreparedTemplate,
    count: usize,
) -> Vec<TemplateMatch> {
    let integral = Integral::new(haystack);
    let max_x = haystack.width() - template.width;
    let max_y = haystack.height() - template.height;

    let mut all = Vec::with_capacity(((max_x + 1) * (max_y + 1)) as usize);
    for y in 0..=max_y {
        for x in 0..=max_x {
            let score = score_at(haystack, &integral, template, x, y) as f32;
            all.push(TemplateMatch { x, y, score });
        }
    }
    all.sort_by(|a, b| b.score.total_cmp(&a.score));

    let (rx, ry) = ((template.width / 2).max(1), (template.height / 2).max(1));
    let mut picked: Vec<TemplateMatch> = Vec::with_capacity(count);
    for m in all {
        if picked.len() == count {
            break;
        }
        if picked
            .iter()
            .all(|p| p.x.abs_diff(m.x) >= rx || p.y.abs_diff(m.y) >= ry)
        {
            picked.push(m);
        }
    }

    picked
}

/// Picks a coarse factor that keeps the shrunken template usable.
fn effective_factor(downscale: u32, template: &GrayImage) -> u32 {
    let (tw, th) = template.dimensions();
    downscale
        .min(tw / MIN_COARSE_TEMPLATE_SIZE)
        .min(th / MIN_COARSE_TEMPLATE_SIZE)
        .max(1)
}

/// Finds the best placement of `template` inside `haystack`.
///
/// With `downscale > 1` the whole image is searched at reduced resolution
/// first and the best few coarse hits are refined at full resolution. When
/// none of them reaches `accept`, the full-resolution image is scanned, so
/// a visible template is never missed because of the shortcut. Returns
/// `None` when the template does not fit or is flat.
pub fn find_template(
    haystack: &GrayImage,
    template: &GrayImage,
    downscale: u32,
    accept: f32,
) -> Option<TemplateMatch> {
    let (hw, hh) = haystack.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > hw || th > hh {
        return None;
    }

    let full = PreparedTemplate::new(template)?;
    let integral = Integral::new(haystack);
    let (max_x, max_y) = (hw - tw, hh - th);
    let full_search = || best_in(haystack, &integral, &full, (0, max_x), (0, max_y));

    let factor = effective_factor(downscale, template);
    if factor == 1 {
        return full_search();
    }

    // Shrink an exact multiple of the factor so coarse pixels map back without drift
    let (sw, sh) = (hw / factor, hh / factor);
    let cropped = image::imageops::crop_imm(haystack, 0, 0, sw * factor, sh * factor).to_image();
    let small_haystack = image::imageops::resize(&cropped, sw, sh, FilterType::Triangle);
    let small_template =
        image::imageops::resize(template, tw / factor, th / factor, FilterType::Triangle);

    let candidates = match PreparedTemplate::new(&small_template) {
        Some(small) if small.width <= sw && small.height <= sh => {
            top_candidates(&small_haystack, &small, COARSE_CANDIDATES)
        }
        _ => Vec::new(),
    };

    // Sizes round down when shrunk, so the last column and row need two coarse pixels
    let radius = 2 * factor;
    let refined = candidates
        .iter()
        .filter_map(|c| {
            let (cx, cy) = (c.x * factor, c.y * factor);
            let xs = (cx.saturating_sub(radius).min(max_x), (cx + radius).min(max_x));
            let ys = (cy.saturating_sub(radius).min(max_y), (cy + radius).min(max_y));
            best_in(haystack, &integral, &full, xs, ys)
        })
        .max_by(|a, b| a.score.total_cmp(&b.score));

    match refined {
        Some(found) if found.score >= accept => Some(found),
        _ => {
            debug!("Coarse search found nothing above {:.2}, scanning full image", accept);
            full_search()
        }
    }
}

/// Polls for the anchor with a bounded wait.
pub struct AnchorLocator {
    anchor: Anchor,
    locator: Box<dyn ImageLocator + Send>,
    poll_interval: Duration,
}

impl AnchorLocator {
    pub fn new(
        anchor: Anchor,
        locator: Box<dyn ImageLocator + Send>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            anchor,
            locator,
            poll_interval,
        }
    }

    /// One probe. Lookup failures are logged and reported as absent.
    pub fn locate(&self, confidence: f32) -> Option<ScreenRegion> {
        match self.locator.locate_on_screen(&self.anchor, confidence) {
            Ok(found) => found,
            Err(e) => {
                warn!("Error while searching for anchor: {:#}", e);
                None
            }
        }
    }

    /// Probes every poll interval until the anchor shows up or `timeout` has
    /// elapsed.
    ///
    /// Always probes at least once. When the anchor never appears this
    /// returns after `timeout` and before `timeout` plus one interval (plus
    /// the duration of the last probe).
    pub fn wait_for_anchor(&self, confidence: f32, timeout: Duration) -> Option<ScreenRegion> {
        let start = Instant::now();

        loop {
            if let Some(region) = self.locate(confidence) {
                info!("Anchor found: {}", region);
                return Some(region);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                warn!(
                    "Anchor {} not found within {:.1}s",
                    self.anchor.path.display(),
                    timeout.as_secs_f32()
                );
                return None;
            }

            debug!(
                "Anchor not found, {:.2}s left",
                (timeout - elapsed).as_secs_f32()
            );
            std::thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Deterministic texture: 4x4 blocks of pseudo-random gray levels.
    fn blocky_noise(width: u32, height: u32, seed: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let mut v = (x / 4).wrapping_mul(73_856_093) ^ (y / 4).wrapping_mul(19_349_663) ^ seed;
            v ^= v << 13;
            v ^= v >> 17;
            v ^= v << 5;
            Luma([(v % 256) as u8])
        })
    }

    fn paste(haystack: &mut GrayImage, template: &GrayImage, x: u32, y: u32) {
        image::imageops::replace(haystack, template, x as i64, y as i64);
    }

    #[test]
    fn test_find_template_exact_full_resolution() {
        let mut haystack = blocky_noise(120, 80, 1);
        let template = blocky_noise(24, 16, 99);
        paste(&mut haystack, &template, 37, 21);

        let found = find_template(&haystack, &template, 1, 0.7).unwrap();
        assert_eq!((found.x, found.y), (37, 21));
        assert!(found.score > 0.999, "score {}", found.score);
    }

    #[test]
    fn test_find_template_coarse_to_fine() {
        let mut haystack = blocky_noise(320, 200, 7);
        let template = blocky_noise(48, 32, 1234);
        paste(&mut haystack, &template, 160, 96);

        let found = find_template(&haystack, &template, 4, 0.7).unwrap();
        assert_eq!((found.x, found.y), (160, 96));
        assert!(found.score > 0.999, "score {}", found.score);
    }

    /// Per-pixel noise, no 4x4 structure for the coarse pass to lean on.
    fn pixel_noise(width: u32, height: u32, seed: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let mut v = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503) ^ seed;
            v ^= v << 13;
            v ^= v >> 17;
            v ^= v << 5;
            Luma([(v % 256) as u8])
        })
    }

    #[test]
    fn test_find_template_near_right_edge_of_odd_width() {
        // 1366 is not a multiple of the coarse factor
        for x in [1264, 1300, 1302] {
            let mut haystack = blocky_noise(1366, 96, 17);
            let template = blocky_noise(64, 48, 4242);
            paste(&mut haystack, &template, x, 40);

            let found = find_template(&haystack, &template, 4, 0.7).unwrap();
            assert_eq!((found.x, found.y), (x, 40));
            assert!(found.score > 0.999, "x {} score {}", x, found.score);
        }
    }

    #[test]
    fn test_find_template_fine_detail_is_not_missed() {
        for (x, y) in [(3, 5), (601, 41), (990, 95)] {
            let mut haystack = pixel_noise(1023, 120, 5);
            let template = pixel_noise(32, 24, 999);
            paste(&mut haystack, &template, x, y);

            let found = find_template(&haystack, &template, 4, 0.7).unwrap();
            assert_eq!((found.x, found.y), (x, y));
            assert!(found.score > 0.999, "score {}", found.score);
        }
    }

    #[test]
    fn test_find_template_score_invariant_to_brightness() {
        let mut haystack = blocky_noise(100, 60, 3);
        let template = blocky_noise(20, 12, 42);
        // Paste a darkened copy: v / 2 + 10
        let darker =
            GrayImage::from_fn(20, 12, |x, y| Luma([template.get_pixel(x, y)[0] / 2 + 10]));
        paste(&mut haystack, &darker, 50, 30);

        let found = find_template(&haystack, &template, 1, 0.7).unwrap();
        assert_eq!((found.x, found.y), (50, 30));
        assert!(found.score > 0.99, "score {}", found.score);
    }

    #[test]
    fn test_find_template_too_large_or_flat() {
        let haystack = blocky_noise(20, 20, 5);
        assert!(find_template(&haystack, &blocky_noise(30, 10, 1), 1, 0.7).is_none());
        let flat = GrayImage::from_pixel(5, 5, Luma([40]));
        assert!(find_template(&haystack, &flat, 1, 0.7).is_none());
    }

    #[test]
    fn test_absent_template_scores_low() {
        let haystack = blocky_noise(160, 100, 11);
        let template = blocky_noise(48, 40, 777);
        let found = find_template(&haystack, &template, 1, 0.7).unwrap();
        assert!(found.score < 0.7, "score {}", found.score);
    }

    #[test]
    fn test_effective_factor_keeps_template_usable() {
        assert_eq!(effective_factor(4, &GrayImage::new(100, 40)), 4);
        assert_eq!(effective_factor(4, &GrayImage::new(100, 20)), 2);
        assert_eq!(effective_factor(4, &GrayImage::new(10, 10)), 1);
    }

    struct NoiseScreen(RgbaImage);

    impl ScreenSource for NoiseScreen {
        fn capture_screen(&self) -> Result<RgbaImage> {
            Ok(self.0.clone())
        }
    }

    fn gray_to_rgba(img: &GrayImage) -> RgbaImage {
        RgbaImage::from_fn(img.width(), img.height(), |x, y| {
            let v = img.get_pixel(x, y)[0];
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn test_template_matcher_returns_anchor_box() {
        let mut desktop = blocky_noise(200, 120, 21);
        let template = blocky_noise(40, 24, 8);
        paste(&mut desktop, &template, 99, 60);

        let matcher = TemplateMatcher::new(NoiseScreen(gray_to_rgba(&desktop)), 4);
        let anchor = Anchor {
            path: PathBuf::from("anchor.png"),
            image: template,
        };

        let region = matcher.locate_on_screen(&anchor, 0.7).unwrap();
        assert_eq!(region, ScreenRegion::new(99, 60, 40, 24));
    }

    #[test]
    fn test_template_matcher_respects_confidence() {
        let desktop = blocky_noise(200, 120, 21);
        let matcher = TemplateMatcher::new(NoiseScreen(gray_to_rgba(&desktop)), 1);
        let anchor = Anchor {
            path: PathBuf::from("anchor.png"),
            image: blocky_noise(40, 40, 555),
        };

        assert_eq!(matcher.locate_on_screen(&anchor, 0.8).unwrap(), None);
    }

    /// Scripted locator: absent until `appear_after` probes, or always failing.
    struct ScriptedLocator {
        probes: Arc<AtomicUsize>,
        appear_after: Option<usize>,
        fail: bool,
    }

    impl ImageLocator for ScriptedLocator {
        fn locate_on_screen(
            &self,
            _anchor: &Anchor,
            _confidence: f32,
        ) -> Result<Option<ScreenRegion>> {
            let n = self.probes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("screen grab failed");
            }
            Ok(match self.appear_after {
                Some(after) if n >= after => ScreenRegion::new(1, 2, 3, 4),
                _ => None,
            })
        }
    }

    fn locator(
        appear_after: Option<usize>,
        fail: bool,
        interval: Duration,
    ) -> (AnchorLocator, Arc<AtomicUsize>) {
        let probes = Arc::new(AtomicUsize::new(0));
        let anchor = Anchor {
            path: PathBuf::from("anchor.png"),
            image: GrayImage::new(3, 4),
        };
        let scripted = ScriptedLocator {
            probes: probes.clone(),
            appear_after,
            fail,
        };
        (AnchorLocator::new(anchor, Box::new(scripted), interval), probes)
    }

    #[test]
    fn test_locate_swallows_errors() {
        let (locator, probes) = locator(None, true, Duration::from_millis(1));
        assert_eq!(locator.locate(0.7), None);
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_returns_as_soon_as_found() {
        let (locator, probes) = locator(Some(2), false, Duration::from_millis(10));
        let start = Instant::now();
        let region = locator.wait_for_anchor(0.7, Duration::from_secs(5));

        assert_eq!(region, ScreenRegion::new(1, 2, 3, 4));
        assert_eq!(probes.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_times_out_within_one_interval() {
        let interval = Duration::from_millis(100);
        let timeout = Duration::from_millis(300);
        let (locator, probes) = locator(None, false, interval);

        let start = Instant::now();
        assert_eq!(locator.wait_for_anchor(0.7, timeout), None);
        let elapsed = start.elapsed();

        assert!(elapsed >= timeout, "returned early: {:?}", elapsed);
        // One interval of slack plus scheduling jitter
        assert!(
            elapsed < timeout + interval + Duration::from_millis(100),
            "too late: {:?}",
            elapsed
        );
        // Probing is paced by the interval, not a busy loop
        assert!(probes.load(Ordering::SeqCst) <= 5);
    }

    #[test]
    fn test_wait_keeps_polling_through_errors() {
        let (locator, probes) = locator(None, true, Duration::from_millis(20));
        assert_eq!(locator.wait_for_anchor(0.7, Duration::from_millis(70)), None);
        assert!(probes.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_zero_timeout_probes_once() {
        let (locator, probes) = locator(None, false, Duration::from_millis(50));
        assert_eq!(locator.wait_for_anchor(0.7, Duration::ZERO), None);
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }
}
