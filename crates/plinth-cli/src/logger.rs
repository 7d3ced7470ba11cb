//! Logging infrastructure for the plinth CLI.
//!
//! This module provides a structured logging setup using the `tracing`
//! ecosystem. It supports multiple verbosity levels, colored output, and
//! environment-based configuration for debugging.
//!
//! # Features
//!
//! - **Verbosity control**: `--verbose` for debug, `--quiet` for errors only
//! - **Color support**: Automatic detection with `--no-color` override
//! - **Environment filters**: Override via `RUST_LOG` environment variable
//! - **Structured logging**: Use tracing spans for context
//!
//! # Example
//!
//! ```rust,no_run
//! use plinth_cli::logger::init_logger;
//! use tracing::{info, debug};
//!
//! init_logger(false, false, false);
//!
//! info!("Starting session");
//! debug!("Watching {}", "src/ui.html");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with the specified options.
///
/// This function sets up structured logging for the CLI. It should be called
/// once at the start of the program, before any logging occurs.
///
/// # Arguments
///
/// * `verbose` - Enable debug-level logging (overrides `quiet`)
/// * `quiet` - Only show error-level logs
/// * `no_color` - Disable colored output
///
/// # Verbosity Levels
///
/// The logging level is determined in this order:
/// 1. `--verbose` flag: Sets level to DEBUG for plinth crates
/// 2. `--quiet` flag: Sets level to ERROR only
/// 3. `RUST_LOG` environment variable: Custom filter
/// 4. Default: INFO level for plinth crates
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    // Determine the filter level based on flags and environment
    let filter = if verbose {
        // Verbose mode: debug level for plinth crates, info for dependencies
        EnvFilter::new("plinth_cli=debug,plinth_relay=debug")
    } else if quiet {
        // Quiet mode: only errors
        EnvFilter::new("plinth_cli=error,plinth_relay=error")
    } else {
        // Try to read from RUST_LOG env var, fallback to info level
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("plinth_cli=info,plinth_relay=info"))
    };

    // Configure the formatter
    let fmt_layer = fmt::layer()
        .with_target(false) // Don't show the module path (keeps output clean)
        .with_level(true) // Show log level (INFO, DEBUG, etc.)
        .with_ansi(!no_color) // Enable colors unless disabled
        .compact(); // Use compact formatting for better readability

    // Initialize the global subscriber
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
