//! Configuration types for the capture monitor.
//!
//! Loads settings from config.json at startup. Every field has a default, so
//! a missing or partial file still yields a usable configuration. The loaded
//! value is passed explicitly to whoever needs it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

/// Complete monitor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Reference image whose presence starts and sustains a capture session
    pub anchor_image: String,
    /// Similarity required to accept the anchor when starting a session (0.0-1.0)
    pub locate_confidence: f32,
    /// Stricter similarity for the per-iteration "still present" check (0.0-1.0)
    pub presence_confidence: f32,
    /// Delay between anchor probes while waiting (milliseconds)
    pub poll_interval_ms: u64,
    /// Give up waiting for the anchor after this long (milliseconds)
    pub anchor_timeout_ms: u64,
    /// Downscale factor for the coarse template search pass
    pub search_downscale: u32,
    /// Linear contrast multiplier applied before OCR
    pub contrast_factor: f32,
    /// Explicit tesseract executable; searched for when unset
    pub tesseract_path: Option<String>,
    /// Explicit tessdata directory; searched for when unset
    pub tessdata_dir: Option<String>,
    /// Tesseract language
    pub ocr_language: String,
    /// Tesseract page segmentation mode
    pub ocr_psm: u8,
    /// ffmpeg executable used for recording
    pub ffmpeg_path: String,
    /// Recording file name inside the recordings directory
    pub video_file_name: String,
    /// Recording frame rate
    pub video_fps: u32,
    /// Stop after this many restarts in a row without a completed iteration.
    /// `null` never stops.
    pub max_consecutive_restarts: Option<u32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            anchor_image: "resources/anchor.png".to_string(),
            locate_confidence: 0.7,
            presence_confidence: 0.8,
            poll_interval_ms: 500,
            anchor_timeout_ms: 10_000,
            search_downscale: 4,
            contrast_factor: 1.5,
            tesseract_path: None,
            tessdata_dir: None,
            ocr_language: "eng".to_string(),
            ocr_psm: 3,
            ffmpeg_path: "ffmpeg".to_string(),
            video_file_name: "output.avi".to_string(),
            video_fps: 20,
            max_consecutive_restarts: Some(5),
        }
    }
}

impl MonitorConfig {
    /// Clamps values into their valid ranges.
    pub fn sanitized(mut self) -> Self {
        self.locate_confidence = self.locate_confidence.clamp(0.0, 1.0);
        self.presence_confidence = self.presence_confidence.clamp(0.0, 1.0);
        self.search_downscale = self.search_downscale.max(1);
        self.video_fps = self.video_fps.max(1);
        if !self.contrast_factor.is_finite() || self.contrast_factor < 0.0 {
            self.contrast_factor = 1.5;
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn anchor_timeout(&self) -> Duration {
        Duration::from_millis(self.anchor_timeout_ms)
    }

    /// Anchor image path, resolved against the exe directory.
    pub fn anchor_path(&self) -> PathBuf {
        crate::paths::resolve(&self.anchor_image)
    }

    /// Recording output path inside the recordings directory.
    pub fn video_path(&self) -> PathBuf {
        crate::paths::get_recordings_dir().join(&self.video_file_name)
    }
}

/// Returns the path of config.json next to the executable.
pub fn config_path() -> PathBuf {
    crate::paths::get_exe_dir().join("config.json")
}

/// Loads configuration from config.json or returns defaults.
pub fn load_config() -> MonitorConfig {
    load_config_from(&config_path())
}

/// Loads configuration from the given file, falling back to defaults.
pub fn load_config_from(path: &Path) -> MonitorConfig {
    info!("Looking for config at: {}", path.display());

    if !path.exists() {
        info!("config.json not found. Using default config.");
        return MonitorConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<MonitorConfig>(&contents) {
            Ok(config) => {
                info!("Config loaded from {}", path.display());
                config.sanitized()
            }
            Err(e) => {
                warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                MonitorConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
            MonitorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_design_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.locate_confidence, 0.7);
        assert_eq!(config.presence_confidence, 0.8);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.anchor_timeout(), Duration::from_secs(10));
        assert_eq!(config.video_fps, 20);
        assert_eq!(config.video_file_name, "output.avi");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "presence_confidence": 0.9, "ocr_language": "por" }}"#).unwrap();

        let config = load_config_from(file.path());
        assert_eq!(config.presence_confidence, 0.9);
        assert_eq!(config.ocr_language, "por");
        assert_eq!(config.locate_confidence, 0.7);
        assert_eq!(config.max_consecutive_restarts, Some(5));
    }

    #[test]
    fn test_null_restart_limit_is_unbounded() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_consecutive_restarts": null }}"#).unwrap();

        let config = load_config_from(file.path());
        assert_eq!(config.max_consecutive_restarts, None);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let config = load_config_from(file.path());
        assert_eq!(config.anchor_image, "resources/anchor.png");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json"));
        assert_eq!(config.ffmpeg_path, "ffmpeg");
    }

    #[test]
    fn test_sanitized_clamps_ranges() {
        let config = MonitorConfig {
            locate_confidence: 1.7,
            presence_confidence: -0.2,
            search_downscale: 0,
            video_fps: 0,
            contrast_factor: f32::NAN,
            ..MonitorConfig::default()
        }
        .sanitized();

        assert_eq!(config.locate_confidence, 1.0);
        assert_eq!(config.presence_confidence, 0.0);
        assert_eq!(config.search_downscale, 1);
        assert_eq!(config.video_fps, 1);
        assert_eq!(config.contrast_factor, 1.5);
    }
}
