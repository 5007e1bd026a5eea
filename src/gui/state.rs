//! GUI application state management.
//!
//! Turns monitor status snapshots into what the window shows.

use std::time::{Duration, Instant};

use crate::capture::ScreenRegion;
use crate::monitor::{MonitorState, MonitorStats, MonitorStatus, StopReason};

/// Monitor status for display in GUI.
#[derive(Clone, Debug, Default)]
pub enum RunStatus {
    /// Never started
    #[default]
    Idle,
    /// Monitor thread is alive
    Running {
        state: MonitorState,
        stats: MonitorStats,
        start_time: Instant,
    },
    /// Monitor thread has exited
    Finished {
        reason: Option<StopReason>,
        stats: MonitorStats,
    },
}

impl RunStatus {
    /// Derives the display status from a controller snapshot.
    pub fn from_monitor(status: &MonitorStatus, running: bool) -> Self {
        match (status.state, running) {
            (None, _) => Self::Idle,
            (Some(state), true) => Self::Running {
                state,
                stats: status.stats,
                start_time: status.started_at.unwrap_or_else(Instant::now),
            },
            (Some(state), false) => Self::Finished {
                reason: match state {
                    MonitorState::Stopped(reason) => Some(reason),
                    _ => None,
                },
                stats: status.stats,
            },
        }
    }

    /// Get display text for current status.
    pub fn status_text(&self) -> String {
        match self {
            Self::Idle => "Idle".to_string(),
            Self::Running { state, .. } => state.to_string(),
            Self::Finished {
                reason: Some(reason),
                ..
            } => format!("Finished: {}", reason),
            Self::Finished { reason: None, .. } => "Finished unexpectedly".to_string(),
        }
    }

    pub fn stats(&self) -> Option<MonitorStats> {
        match self {
            Self::Idle => None,
            Self::Running { stats, .. } | Self::Finished { stats, .. } => Some(*stats),
        }
    }

    /// Get elapsed time string if running.
    pub fn elapsed_text(&self) -> Option<String> {
        match self {
            Self::Running { start_time, .. } => Some(format_elapsed(start_time.elapsed())),
            _ => None,
        }
    }

    /// Check if the monitor is currently running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// `mm:ss`, minutes keep counting past an hour.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// GUI application state.
#[derive(Debug, Default)]
pub struct GuiState {
    /// Current monitor status.
    pub status: RunStatus,
    /// Capture region while a session is active.
    pub region: Option<ScreenRegion>,
    /// Why the last Start click did nothing.
    pub start_error: Option<String>,
}
