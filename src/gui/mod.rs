//! GUI module for the application.
//!
//! One window with Start/Stop, the monitor status, the latest records and a
//! preview of the last captured frame. The window only polls the controller;
//! it never waits on the monitor thread.

pub mod render;
pub mod state;

use std::time::Duration;

use eframe::egui::{self, TextureHandle, Vec2};
use tracing::{info, warn};

use crate::monitor::{MonitorConfig, MonitorController, RecordBatch};
use crate::ocr::TesseractPaths;

use state::{GuiState, RunStatus};

/// How many record batches the window lists.
const VISIBLE_BATCHES: usize = 20;

/// Main GUI application struct.
pub struct GuiApp {
    config: MonitorConfig,
    /// `None` when Tesseract could not be found at startup
    tesseract: Option<TesseractPaths>,
    controller: MonitorController,
    /// Application state.
    state: GuiState,
    preview: Option<TextureHandle>,
    /// Frame serial the preview texture was built from
    preview_serial: u64,
}

impl GuiApp {
    /// Create a new GUI application instance.
    pub fn new(config: MonitorConfig, tesseract: Option<TesseractPaths>) -> Self {
        Self {
            config,
            tesseract,
            controller: MonitorController::new(),
            state: GuiState::default(),
            preview: None,
            preview_serial: 0,
        }
    }

    /// Update monitor status by polling the controller.
    fn update_status(&mut self) {
        let status = self.controller.status();
        self.state.status = RunStatus::from_monitor(&status, self.controller.is_running());
        self.state.region = status.region;
    }

    /// Re-uploads the preview texture when the monitor has a new frame.
    fn update_preview(&mut self, ctx: &egui::Context) {
        let frame = {
            let display = self.controller.display().lock();
            if display.frame_serial == self.preview_serial {
                return;
            }
            self.preview_serial = display.frame_serial;
            display.frame.clone()
        };

        let Some(frame) = frame else {
            self.preview = None;
            return;
        };

        let size = [frame.width() as usize, frame.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, frame.as_raw());
        match &mut self.preview {
            Some(texture) => texture.set(color_image, egui::TextureOptions::LINEAR),
            None => {
                self.preview = Some(ctx.load_texture(
                    "capture_preview",
                    color_image,
                    egui::TextureOptions::LINEAR,
                ))
            }
        }
    }

    fn recent_batches(&self) -> Vec<RecordBatch> {
        self.controller
            .display()
            .lock()
            .history
            .iter()
            .take(VISIBLE_BATCHES)
            .cloned()
            .collect()
    }

    /// Handle start button click.
    fn handle_start(&mut self) {
        let Some(tesseract) = &self.tesseract else {
            self.state.start_error = Some(
                "Tesseract not found. Install Tesseract-OCR or set tesseract_path in config.json"
                    .to_string(),
            );
            return;
        };

        match self.controller.start(&self.config, tesseract) {
            Ok(()) => {
                self.state.start_error = None;
                info!("GUI: Started monitor");
            }
            Err(e) => {
                warn!("GUI: Failed to start monitor: {:#}", e);
                self.state.start_error = Some(format!("{:#}", e));
            }
        }
    }

    /// Handle stop button click.
    fn handle_stop(&mut self) {
        self.controller.request_stop();
        info!("GUI: Requested monitor stop");
    }

    /// Handle open recordings button click.
    fn handle_open_folder(&self) {
        let path = crate::paths::get_recordings_dir();
        let opener = if cfg!(windows) {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };

        if let Err(e) = std::process::Command::new(opener).arg(&path).spawn() {
            warn!("GUI: Failed to open folder {}: {}", path.display(), e);
        }
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Poll monitor status
        self.update_status();
        self.update_preview(ctx);

        // Request repaint while running (for status and preview updates)
        if self.state.status.is_running() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        let batches = self.recent_batches();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Flow Capture");
            ui.add_space(16.0);

            egui::ScrollArea::vertical().show(ui, |ui| {
                let (start_clicked, stop_clicked) = render::render_controls(ui, &self.state);

                if start_clicked {
                    self.handle_start();
                }
                if stop_clicked {
                    self.handle_stop();
                }

                render::render_status(ui, &self.state);
                render::render_records(ui, &batches);
                render::render_preview(ui, self.preview.as_ref());

                if render::render_actions(ui) {
                    self.handle_open_folder();
                }
            });
        });
    }
}

impl Drop for GuiApp {
    fn drop(&mut self) {
        // Stop the monitor with the window
        self.controller.request_stop();
    }
}

/// Run the GUI application.
/// This function blocks until the window is closed.
pub fn run_gui(config: MonitorConfig, tesseract: Option<TesseractPaths>) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(Vec2::new(520.0, 640.0))
            .with_min_inner_size(Vec2::new(400.0, 400.0))
            .with_title("Flow Capture"),
        ..Default::default()
    };

    info!("GUI: Calling eframe::run_native...");

    eframe::run_native(
        "Flow Capture",
        options,
        Box::new(|_cc| Ok(Box::new(GuiApp::new(config, tesseract)))),
    )
}
