//! Where parsed records and preview frames go.

use chrono::{DateTime, Local};
use image::RgbaImage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use crate::ocr::ExtractedRecord;

/// Number of batches kept for the GUI history list.
pub const HISTORY_LEN: usize = 50;

/// Records extracted from one iteration.
#[derive(Clone, Debug)]
pub struct RecordBatch {
    pub session: u32,
    pub iteration: u64,
    pub captured_at: DateTime<Local>,
    pub records: Vec<ExtractedRecord>,
}

impl RecordBatch {
    /// One `"LABEL: R$ N"` line per record, in text order.
    pub fn lines(&self) -> Vec<String> {
        self.records.iter().map(ExtractedRecord::display_line).collect()
    }
}

/// Consumer of the loop's human-readable output.
pub trait DisplaySink {
    /// Called only for iterations that produced at least one record.
    fn show_records(&mut self, batch: &RecordBatch);
    /// Called with every captured frame.
    fn show_frame(&mut self, frame: &RgbaImage);
    /// Called once when the monitor stops for good.
    fn release(&mut self);
}

#[derive(Default)]
pub struct DisplayState {
    /// Newest first
    pub history: VecDeque<RecordBatch>,
    pub frame: Option<RgbaImage>,
    /// Bumped on every new frame so viewers can skip re-uploading.
    pub frame_serial: u64,
}

/// Display shared between the monitor thread and the GUI.
#[derive(Clone, Default)]
pub struct SharedDisplay {
    inner: Arc<Mutex<DisplayState>>,
}

impl SharedDisplay {
    /// Locks the state, recovering it if a previous holder panicked.
    pub fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forgets everything shown so far.
    pub fn clear(&self) {
        *self.lock() = DisplayState::default();
    }
}

impl DisplaySink for SharedDisplay {
    fn show_records(&mut self, batch: &RecordBatch) {
        for record in &batch.records {
            info!(
                "[session {} #{}] {} ({})",
                batch.session,
                batch.iteration,
                record.display_line(),
                record.category
            );
        }

        let mut state = self.lock();
        state.history.push_front(batch.clone());
        state.history.truncate(HISTORY_LEN);
    }

    fn show_frame(&mut self, frame: &RgbaImage) {
        let mut state = self.lock();
        state.frame = Some(frame.clone());
        state.frame_serial += 1;
    }

    fn release(&mut self) {
        let mut state = self.lock();
        state.frame = None;
        state.frame_serial += 1;
    }
}
