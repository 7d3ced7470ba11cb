//! Terminal UI utilities for status messages and formatted output.
//!
//! This module provides a small API for printing session status, build
//! results, and warnings to the terminal. It handles environment detection
//! (CI, TTY) and gracefully degrades when terminal features aren't available.
//!
//! # Examples
//!
//! ```no_run
//! use plinth_cli::ui;
//!
//! // Initialize color support
//! ui::init_colors();
//!
//! // Status messages
//! ui::success("Plugin built");
//! ui::error("Failed to read manifest");
//! ```

// Submodules
mod format;
mod messages;

// Re-exports for convenient access
pub use format::{format_duration, format_size, print_build_summary};
pub use messages::{debug, error, info, success, warning};

/// Check if color output should be enabled.
///
/// Respects NO_COLOR and FORCE_COLOR environment variables, falls back to
/// terminal capability detection.
///
/// # Returns
///
/// `true` if colors should be used
pub fn should_use_color() -> bool {
    // NO_COLOR environment variable disables colors
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    // FORCE_COLOR enables colors even in non-TTY
    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    // Check if stderr is a terminal
    console::user_attended_stderr()
}

/// Initialize color support based on environment.
///
/// Should be called early in the application lifecycle (e.g., in main).
/// Respects NO_COLOR and FORCE_COLOR environment variables.
///
/// **Note**: `owo-colors` automatically respects NO_COLOR and terminal
/// capabilities. This function is provided for explicit initialization
/// and future extensibility.
pub fn init_colors() {
    let _ = should_use_color();
}
