use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use tempfile::NamedTempFile;

use super::setup::TesseractPaths;

/// Image-to-text capability.
///
/// An empty string is a normal answer ("nothing legible"), not an error.
/// Errors mean the engine itself could not run.
pub trait OcrEngine {
    fn image_to_string(&self, img: &GrayImage) -> Result<String>;
}

/// Runs the Tesseract command-line program.
#[derive(Clone, Debug)]
pub struct Tesseract {
    paths: TesseractPaths,
    language: String,
    psm: u8,
}

impl Tesseract {
    pub fn new(paths: TesseractPaths, language: impl Into<String>, psm: u8) -> Self {
        Self {
            paths,
            language: language.into(),
            psm,
        }
    }

    /// Arguments for recognizing `input` with text on stdout.
    fn args(&self, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![input.into(), "stdout".into()];
        if let Some(tessdata) = &self.paths.tessdata {
            args.push("--tessdata-dir".into());
            args.push(tessdata.into());
        }
        args.push("-l".into());
        args.push(self.language.as_str().into());
        args.push("--psm".into());
        args.push(self.psm.to_string().into());
        args
    }
}

impl OcrEngine for Tesseract {
    fn image_to_string(&self, img: &GrayImage) -> Result<String> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())
            .context("Failed to write OCR input image")?;

        let output = Command::new(&self.paths.executable)
            .args(self.args(temp_input.path()))
            .output()
            .with_context(|| {
                format!(
                    "Failed to run Tesseract at {}",
                    self.paths.executable.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn engine(tessdata: Option<&str>) -> Tesseract {
        Tesseract::new(
            TesseractPaths {
                executable: PathBuf::from("tesseract"),
                tessdata: tessdata.map(PathBuf::from),
            },
            "por",
            6,
        )
    }

    #[test]
    fn test_args_with_tessdata() {
        let args = engine(Some("/opt/tessdata")).args(Path::new("in.png"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(
            args,
            vec!["in.png", "stdout", "--tessdata-dir", "/opt/tessdata", "-l", "por", "--psm", "6"]
        );
    }

    #[test]
    fn test_args_without_tessdata() {
        let args = engine(None).args(Path::new("in.png"));
        assert!(!args.iter().any(|a| a == "--tessdata-dir"));
        assert_eq!(args.len(), 6);
    }

    #[test]
    fn test_missing_executable_is_an_error() {
        let engine = Tesseract::new(
            TesseractPaths {
                executable: PathBuf::from("/definitely/not/here/tesseract"),
                tessdata: None,
            },
            "eng",
            3,
        );
        let img = GrayImage::new(4, 4);
        assert!(engine.image_to_string(&img).is_err());
    }
}
