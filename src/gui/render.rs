//! GUI rendering functions.
//!
//! Contains UI layout and component rendering logic.

use eframe::egui::{self, Color32, RichText, TextureHandle, Vec2};

use super::state::{GuiState, RunStatus};
use crate::monitor::{RecordBatch, StopReason};

/// Render the Start/Stop buttons.
/// Returns (start_clicked, stop_clicked).
pub fn render_controls(ui: &mut egui::Ui, state: &GuiState) -> (bool, bool) {
    let mut start_clicked = false;
    let mut stop_clicked = false;

    ui.horizontal(|ui| {
        let is_running = state.status.is_running();

        // Start button - disabled while running
        ui.add_enabled_ui(!is_running, |ui| {
            if ui.button(RichText::new("▶ Start").size(16.0)).clicked() {
                start_clicked = true;
            }
        });

        ui.add_space(20.0);

        // Stop button - enabled only while running
        ui.add_enabled_ui(is_running, |ui| {
            if ui.button(RichText::new("◼ Stop").size(16.0)).clicked() {
                stop_clicked = true;
            }
        });
    });

    if let Some(err) = &state.start_error {
        ui.add_space(4.0);
        ui.label(RichText::new(err).color(Color32::from_rgb(200, 0, 0)));
    }

    (start_clicked, stop_clicked)
}

/// Render the status section.
pub fn render_status(ui: &mut egui::Ui, state: &GuiState) {
    ui.add_space(8.0);
    ui.separator();
    ui.add_space(8.0);

    ui.horizontal(|ui| {
        ui.label("Status:");

        let status_color = match &state.status {
            RunStatus::Idle => Color32::GRAY,
            RunStatus::Running { .. } => Color32::from_rgb(0, 120, 200),
            RunStatus::Finished {
                reason: Some(StopReason::AnchorLost | StopReason::Cancelled),
                ..
            } => Color32::from_rgb(0, 150, 0),
            RunStatus::Finished { .. } => Color32::from_rgb(200, 150, 0),
        };

        ui.label(RichText::new(state.status.status_text()).color(status_color));
    });

    if let Some(stats) = state.status.stats() {
        ui.add_space(4.0);
        ui.label(format!(
            "Sessions: {}   Restarts: {}   Iterations: {}",
            stats.sessions, stats.restarts, stats.iterations
        ));
    }

    if let Some(region) = state.region {
        ui.add_space(4.0);
        ui.label(format!("Region: {}", region));
    }

    // Elapsed time (if running)
    if let Some(elapsed) = state.status.elapsed_text() {
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.label("Elapsed:");
            ui.label(elapsed);
        });
    }
}

/// Render the latest extracted records, newest first.
pub fn render_records(ui: &mut egui::Ui, batches: &[RecordBatch]) {
    ui.add_space(8.0);
    ui.separator();
    ui.add_space(8.0);

    ui.heading("Records");
    ui.add_space(4.0);

    if batches.is_empty() {
        ui.label(RichText::new("Nothing recognized yet").color(Color32::GRAY));
        return;
    }

    egui::ScrollArea::vertical()
        .id_salt("records")
        .max_height(160.0)
        .show(ui, |ui| {
            for batch in batches {
                let time = batch.captured_at.format("%H:%M:%S").to_string();
                for line in batch.lines() {
                    ui.horizontal(|ui| {
                        ui.label(RichText::new(&time).monospace().color(Color32::GRAY));
                        ui.label(RichText::new(line).monospace());
                    });
                }
            }
        });
}

/// Render the last captured frame scaled to the panel width.
pub fn render_preview(ui: &mut egui::Ui, preview: Option<&TextureHandle>) {
    ui.add_space(8.0);
    ui.separator();
    ui.add_space(8.0);

    ui.heading("Preview");
    ui.add_space(4.0);

    let Some(texture) = preview else {
        ui.label(RichText::new("No frame captured").color(Color32::GRAY));
        return;
    };

    let [w, h] = texture.size();
    let scale = (ui.available_width() / w as f32).min(1.0);
    ui.image((texture.id(), Vec2::new(w as f32 * scale, h as f32 * scale)));
}

/// Render the action buttons.
/// Returns true when "Open recordings" was clicked.
pub fn render_actions(ui: &mut egui::Ui) -> bool {
    ui.add_space(8.0);
    ui.separator();
    ui.add_space(8.0);

    ui.button("📁 Open recordings").clicked()
}
