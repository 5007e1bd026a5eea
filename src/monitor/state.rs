//! Capture loop state machine.
//!
//! AwaitingAnchor → Running → {Stopped, Restarting}; Restarting tears the
//! session down and goes back to AwaitingAnchor with fresh resources.
//! Each call to `MonitorContext::step` performs one transition or one
//! capture iteration.

use anyhow::{anyhow, Result};
use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::capture::{ScreenRegion, ScreenSource};
use crate::monitor::config::MonitorConfig;
use crate::monitor::detection::AnchorLocator;
use crate::monitor::display::{DisplaySink, RecordBatch};
use crate::monitor::recorder::{RecorderFactory, VideoSink};
use crate::ocr::{ImageEnhancer, OcrEngine, RecordParser};

/// Why the monitor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The anchor did not appear within the timeout
    AnchorNotFound,
    /// The anchor disappeared while capturing
    AnchorLost,
    /// The user asked to stop
    Cancelled,
    /// Too many restarts without a completed iteration
    RestartLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::AnchorNotFound => write!(f, "anchor not found"),
            StopReason::AnchorLost => write!(f, "anchor gone"),
            StopReason::Cancelled => write!(f, "stopped by user"),
            StopReason::RestartLimit => write!(f, "too many restarts"),
        }
    }
}

/// Monitor state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Polling the screen for the anchor
    AwaitingAnchor,
    /// Capturing frames from the session region
    Running,
    /// Tearing down after a failed iteration
    Restarting,
    /// Terminal
    Stopped(StopReason),
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorState::AwaitingAnchor => write!(f, "Waiting for anchor"),
            MonitorState::Running => write!(f, "Capturing"),
            MonitorState::Restarting => write!(f, "Restarting"),
            MonitorState::Stopped(reason) => write!(f, "Stopped ({})", reason),
        }
    }
}

/// Counters across all sessions of one monitor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub sessions: u32,
    pub restarts: u32,
    pub iterations: u64,
}

/// Everything the loop talks to.
pub struct Collaborators {
    pub anchor: AnchorLocator,
    pub screen: Box<dyn ScreenSource + Send>,
    pub enhancer: ImageEnhancer,
    pub ocr: Box<dyn OcrEngine + Send>,
    pub parser: RecordParser,
    pub recorder: Box<dyn RecorderFactory + Send>,
    pub display: Box<dyn DisplaySink + Send>,
}

/// Loop thresholds, fixed for the whole run.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Confidence for finding the anchor when a session starts
    pub locate_confidence: f32,
    /// Confidence for the per-iteration presence check
    pub presence_confidence: f32,
    pub anchor_timeout: Duration,
    /// `None` restarts forever
    pub max_consecutive_restarts: Option<u32>,
}

impl LoopSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            locate_confidence: config.locate_confidence,
            presence_confidence: config.presence_confidence,
            anchor_timeout: config.anchor_timeout(),
            max_consecutive_restarts: config.max_consecutive_restarts,
        }
    }
}

/// One anchor-to-teardown span with its own region and recording.
pub struct CaptureSession {
    pub id: u32,
    pub region: ScreenRegion,
    sink: Box<dyn VideoSink + Send>,
    pub iterations: u64,
}

/// Monitor context holding state, collaborators and the current session.
pub struct MonitorContext {
    pub state: MonitorState,
    pub stats: MonitorStats,
    collab: Collaborators,
    settings: LoopSettings,
    session: Option<CaptureSession>,
    /// Restarts since the last completed iteration
    consecutive_restarts: u32,
    cancel: Arc<AtomicBool>,
}

impl MonitorContext {
    pub fn new(collab: Collaborators, settings: LoopSettings, cancel: Arc<AtomicBool>) -> Self {
        Self {
            state: MonitorState::AwaitingAnchor,
            stats: MonitorStats::default(),
            collab,
            settings,
            session: None,
            consecutive_restarts: 0,
            cancel,
        }
    }

    /// Region of the active session, if any.
    pub fn region(&self) -> Option<ScreenRegion> {
        self.session.as_ref().map(|s| s.region)
    }

    /// Advances the state machine by one step.
    ///
    /// Returns `true` while there is more to do, `false` once stopped.
    pub fn step(&mut self) -> bool {
        match self.state {
            MonitorState::AwaitingAnchor => self.await_anchor(),
            MonitorState::Running => match self.run_iteration() {
                Ok(None) => {}
                Ok(Some(reason)) => self.stop(reason),
                Err(e) => {
                    warn!("Capture iteration failed, restarting: {:#}", e);
                    self.state = MonitorState::Restarting;
                }
            },
            MonitorState::Restarting => self.restart(),
            MonitorState::Stopped(_) => {}
        }

        !matches!(self.state, MonitorState::Stopped(_))
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn await_anchor(&mut self) {
        if self.cancel_requested() {
            self.stop(StopReason::Cancelled);
            return;
        }

        let Some(region) = self
            .collab
            .anchor
            .wait_for_anchor(self.settings.locate_confidence, self.settings.anchor_timeout)
        else {
            self.stop(StopReason::AnchorNotFound);
            return;
        };

        match self.collab.recorder.open(region.width, region.height) {
            Ok(sink) => {
                self.stats.sessions += 1;
                info!("Session {} started on region {}", self.stats.sessions, region);
                self.session = Some(CaptureSession {
                    id: self.stats.sessions,
                    region,
                    sink,
                    iterations: 0,
                });
                self.state = MonitorState::Running;
            }
            Err(e) => {
                warn!("Failed to open recording, restarting: {:#}", e);
                self.state = MonitorState::Restarting;
            }
        }
    }

    /// One capture iteration. `Ok(Some(_))` ends the run, `Err` restarts it.
    fn run_iteration(&mut self) -> Result<Option<StopReason>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("No active capture session"))?;

        let frame = self.collab.screen.capture_region(session.region)?;
        let enhanced = self.collab.enhancer.enhance(&frame);
        let text = self.collab.ocr.image_to_string(&enhanced)?;
        debug!("OCR text: {:?}", text);

        session.iterations += 1;
        let records = self.collab.parser.parse(&text);
        if records.is_empty() {
            info!("No records recognized");
        } else {
            let batch = RecordBatch {
                session: session.id,
                iteration: session.iterations,
                captured_at: Local::now(),
                records,
            };
            self.collab.display.show_records(&batch);
        }

        session.sink.append(&frame)?;
        self.collab.display.show_frame(&frame);

        self.stats.iterations += 1;
        self.consecutive_restarts = 0;

        if self
            .collab
            .anchor
            .locate(self.settings.presence_confidence)
            .is_none()
        {
            info!("Anchor no longer on screen");
            return Ok(Some(StopReason::AnchorLost));
        }

        if self.cancel_requested() {
            return Ok(Some(StopReason::Cancelled));
        }

        Ok(None)
    }

    fn restart(&mut self) {
        self.end_session();
        self.stats.restarts += 1;
        self.consecutive_restarts += 1;

        if self
            .settings
            .max_consecutive_restarts
            .is_some_and(|max| self.consecutive_restarts > max)
        {
            warn!(
                "Giving up after {} restarts without a completed iteration",
                self.consecutive_restarts
            );
            self.stop(StopReason::RestartLimit);
            return;
        }

        info!("Restart #{}: waiting for anchor again", self.stats.restarts);
        self.state = MonitorState::AwaitingAnchor;
    }

    /// Releases the session's recording. The sink is consumed, so this runs
    /// at most once per session.
    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            info!(
                "Session {} ended after {} iterations",
                session.id, session.iterations
            );
            if let Err(e) = session.sink.release() {
                warn!("Failed to release recording: {:#}", e);
            }
        }
    }

    fn stop(&mut self, reason: StopReason) {
        self.end_session();
        self.collab.display.release();
        match reason {
            StopReason::AnchorNotFound | StopReason::RestartLimit => {
                warn!("Monitor stopped: {}", reason)
            }
            StopReason::AnchorLost | StopReason::Cancelled => info!("Monitor stopped: {}", reason),
        }
        self.state = MonitorState::Stopped(reason);
    }
}
