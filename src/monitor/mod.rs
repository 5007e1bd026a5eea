//! Anchor-triggered screen monitoring.
//!
//! Waits for a reference image to appear, then repeatedly captures the
//! region it occupies, reads the amounts shown there and records the region
//! to video until the image goes away.

pub mod config;
pub mod detection;
pub mod display;
pub mod recorder;
pub mod runner;
pub mod state;

pub use config::{load_config, MonitorConfig};
pub use display::RecordBatch;
pub use runner::{MonitorController, MonitorStatus};
pub use state::{MonitorState, MonitorStats, StopReason};
