//! Monitor runner - starts the capture loop on a background thread.
//!
//! The GUI owns one `MonitorController`. `start` returns as soon as the
//! thread is spawned; nothing that happens inside the loop is reported back
//! except through `status()` and the shared display.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use tracing::info;

use crate::capture::{ScreenRegion, XcapScreen};
use crate::monitor::config::MonitorConfig;
use crate::monitor::detection::{Anchor, AnchorLocator, TemplateMatcher};
use crate::monitor::display::SharedDisplay;
use crate::monitor::recorder::FfmpegRecorderFactory;
use crate::monitor::state::{
    Collaborators, LoopSettings, MonitorContext, MonitorState, MonitorStats,
};
use crate::ocr::{ImageEnhancer, RecordParser, Tesseract, TesseractPaths};

/// Snapshot of the monitor for display.
#[derive(Debug, Clone, Default)]
pub struct MonitorStatus {
    /// `None` until the first start
    pub state: Option<MonitorState>,
    pub stats: MonitorStats,
    /// Region of the active session
    pub region: Option<ScreenRegion>,
    pub started_at: Option<Instant>,
}

/// Starts and stops the capture loop. At most one loop runs at a time.
#[derive(Clone, Default)]
pub struct MonitorController {
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    status: Arc<Mutex<MonitorStatus>>,
    display: SharedDisplay,
}

/// Clears the running flag when the monitor thread exits, even by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl MonitorController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display the loop writes records and frames to.
    pub fn display(&self) -> &SharedDisplay {
        &self.display
    }

    /// Checks if the capture loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> MonitorStatus {
        lock_status(&self.status).clone()
    }

    /// Asks the loop to stop after its current iteration.
    pub fn request_stop(&self) {
        if self.is_running() {
            info!("Stop requested");
            self.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Builds the screen, OCR and recording collaborators and starts the loop.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The monitor is already running
    /// - The anchor image cannot be loaded
    pub fn start(&self, config: &MonitorConfig, tesseract: &TesseractPaths) -> Result<()> {
        if self.is_running() {
            bail!("Monitor is already running");
        }

        let anchor = Anchor::load(&config.anchor_path())?;
        let screen = XcapScreen::new();
        let matcher = TemplateMatcher::new(screen, config.search_downscale);

        let collab = Collaborators {
            anchor: AnchorLocator::new(anchor, Box::new(matcher), config.poll_interval()),
            screen: Box::new(screen),
            enhancer: ImageEnhancer::new(config.contrast_factor),
            ocr: Box::new(Tesseract::new(
                tesseract.clone(),
                config.ocr_language.clone(),
                config.ocr_psm,
            )),
            parser: RecordParser::new()?,
            recorder: Box::new(FfmpegRecorderFactory {
                ffmpeg: PathBuf::from(&config.ffmpeg_path),
                output: config.video_path(),
                fps: config.video_fps,
            }),
            display: Box::new(self.display.clone()),
        };

        self.display.clear();
        self.start_with(collab, LoopSettings::from_config(config))
    }

    /// Starts the loop with the given collaborators.
    ///
    /// Returns immediately after spawning the monitor thread.
    pub fn start_with(&self, collab: Collaborators, settings: LoopSettings) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            bail!("Monitor is already running");
        }

        self.cancel.store(false, Ordering::SeqCst);
        *lock_status(&self.status) = MonitorStatus {
            state: Some(MonitorState::AwaitingAnchor),
            stats: MonitorStats::default(),
            region: None,
            started_at: Some(Instant::now()),
        };

        let ctx = MonitorContext::new(collab, settings, self.cancel.clone());
        let status = self.status.clone();
        let guard = RunningGuard(self.running.clone());

        thread::Builder::new()
            .name("monitor".to_string())
            .spawn(move || {
                let _guard = guard;
                run_monitor_loop(ctx, &status);
                info!("Monitor thread finished");
            })
            .context("Failed to spawn monitor thread")?;

        info!("Monitor started");
        Ok(())
    }
}

fn lock_status(status: &Mutex<MonitorStatus>) -> MutexGuard<'_, MonitorStatus> {
    status.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs the state machine until it stops (called from the monitor thread).
fn run_monitor_loop(mut ctx: MonitorContext, status: &Mutex<MonitorStatus>) {
    loop {
        let more = ctx.step();

        {
            let mut status = lock_status(status);
            status.state = Some(ctx.state);
            status.stats = ctx.stats;
            status.region = ctx.region();
        }

        if !more {
            break;
        }
    }

    info!(
        "{}: {} session(s), {} restart(s), {} iteration(s)",
        ctx.state, ctx.stats.sessions, ctx.stats.restarts, ctx.stats.iterations
    );
}
