use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::monitor::config::MonitorConfig;

/// Well-known Windows install locations.
const COMMON_WINDOWS_PATHS: [&str; 2] = [
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];

#[cfg(windows)]
const TESSERACT_EXE: &str = "tesseract.exe";
#[cfg(not(windows))]
const TESSERACT_EXE: &str = "tesseract";

/// Location of the OCR engine, resolved once at startup and handed to the
/// engine wrapper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets tesseract use its built-in tessdata location
    pub tessdata: Option<PathBuf>,
}

/// Returns the app-local directory where a portable Tesseract may be placed.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flow-capture")
        .join("tesseract")
}

/// Finds the Tesseract executable and its language data.
pub fn locate_tesseract(config: &MonitorConfig) -> Result<TesseractPaths> {
    let executable = find_tesseract_executable(config)?;
    let tessdata = find_tessdata_dir(config);

    info!("Tesseract: {}", executable.display());
    match &tessdata {
        Some(dir) => info!("tessdata: {}", dir.display()),
        None => info!("tessdata: tesseract default"),
    }

    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Finds the Tesseract executable: config, local dir, PATH, then common paths.
pub fn find_tesseract_executable(config: &MonitorConfig) -> Result<PathBuf> {
    if let Some(path) = &config.tesseract_path {
        let path = crate::paths::resolve(path);
        if path.exists() {
            return Ok(path);
        }
        return Err(anyhow!(
            "Configured tesseract_path does not exist: {}",
            path.display()
        ));
    }

    let local_exe = get_tesseract_dir().join(TESSERACT_EXE);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    if cfg!(windows) {
        for dir in COMMON_WINDOWS_PATHS {
            let p = Path::new(dir).join("tesseract.exe");
            if p.exists() {
                return Ok(p);
            }
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR, add it to PATH, \
         or set tesseract_path in config.json"
    ))
}

/// Finds a tessdata directory, or `None` to use tesseract's default.
pub fn find_tessdata_dir(config: &MonitorConfig) -> Option<PathBuf> {
    let language_file = format!("{}.traineddata", config.ocr_language);

    if let Some(dir) = &config.tessdata_dir {
        return Some(crate::paths::resolve(dir));
    }

    let mut candidates = vec![get_tesseract_dir().join("tessdata")];

    // Check TESSDATA_PREFIX environment variable
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let prefix = PathBuf::from(prefix);
        candidates.push(prefix.join("tessdata"));
        candidates.push(prefix);
    }

    if cfg!(windows) {
        candidates.extend(
            COMMON_WINDOWS_PATHS
                .iter()
                .map(|dir| Path::new(dir).join("tessdata")),
        );
    }

    let found = first_with_file(&candidates, &language_file);
    if found.is_none() {
        debug!("No tessdata directory with {} found", language_file);
    }
    found
}

/// Returns the first directory containing `file_name`.
fn first_with_file(dirs: &[PathBuf], file_name: &str) -> Option<PathBuf> {
    dirs.iter().find(|dir| dir.join(file_name).exists()).cloned()
}
