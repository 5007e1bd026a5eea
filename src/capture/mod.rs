//! Screen capture.
//!
//! This module provides:
//! - Capture regions (`ScreenRegion`, `crop_region`)
//! - The screen capability (`ScreenSource`) and its xcap implementation
//! - DPI awareness setup for Windows (`make_dpi_aware`)

pub mod dpi;
pub mod region;
pub mod screen;

pub use dpi::make_dpi_aware;
pub use region::ScreenRegion;
pub use screen::{ScreenSource, XcapScreen};
