//! Flow Capture
//!
//! Watches the screen for a reference image, then reads the investor-flow
//! amounts shown next to it with OCR and records that region to video until
//! the image disappears.

// Hide console window on Windows for GUI mode
#![windows_subsystem = "windows"]

mod capture;
mod gui;
mod logging;
mod monitor;
mod ocr;
mod paths;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

fn main() -> Result<()> {
    // Ensure output directories exist
    paths::ensure_directories()?;

    logging::init_logging(&paths::get_logs_dir())?;
    logging::install_panic_hook();

    // Screen coordinates must be physical pixels on scaled displays
    capture::make_dpi_aware();

    let config = monitor::load_config();

    // Resolve the OCR engine once; the monitor receives it explicitly
    let tesseract = match ocr::locate_tesseract(&config) {
        Ok(paths) => Some(paths),
        Err(e) => {
            warn!("Failed to locate Tesseract: {:#}", e);
            warn!("Capture cannot start until Tesseract is installed.");
            None
        }
    };

    info!("Starting GUI application...");
    match gui::run_gui(config, tesseract) {
        Ok(()) => {
            info!("GUI application exited normally");
            Ok(())
        }
        Err(e) => Err(anyhow!("GUI error: {}", e)),
    }
}
