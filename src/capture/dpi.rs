//! Process DPI awareness.
//!
//! Without it Windows reports scaled coordinates to the process while the
//! capture returns physical pixels, and located anchors drift.

#[cfg(windows)]
pub fn make_dpi_aware() {
    use windows::Win32::UI::HiDpi::{
        SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
    };

    // Fails harmlessly when a manifest already set the awareness.
    let result =
        unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) };
    if let Err(e) = result {
        tracing::debug!("SetProcessDpiAwarenessContext: {}", e);
    }
}

#[cfg(not(windows))]
pub fn make_dpi_aware() {}
