//! Plinth CLI - develop, preview and build design-tool plugins.
//!
//! This crate provides the `plinth` command-line tool. It builds a
//! plugin's three artifacts (manifest, main-thread script, UI document),
//! serves the UI during development, and relays events between the
//! plugin sandbox, a browser preview and host tooling through
//! `plinth-relay`.
//!
//! # Architecture
//!
//! The CLI is organized into several key modules:
//!
//! - [`error`] - Comprehensive error types with actionable messages
//! - [`logger`] - Structured logging with tracing
//! - [`ui`] - Terminal UI utilities for status lines and formatting
//! - [`cli`] - clap argument surface
//! - [`config`] - Layered configuration and per-session options
//! - [`manifest`] - Descriptor discovery and manifest artifact builds
//! - [`bundler`] - Facade over the project's external bundler commands
//! - [`dev`] - Watchers, rebuild orchestration, executors and servers
//! - `commands` - Individual CLI command implementations
//!
//! # Example
//!
//! ```rust
//! use plinth_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     // CLI command implementations...
//!     Ok(())
//! }
//! ```

// Public modules
pub mod bundler;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dev;
pub mod error;
pub mod logger;
pub mod manifest;
pub mod pm;
pub mod ui;

// Re-export commonly used types
pub use error::{BuildError, CliError, ConfigError, Result, ResultExt};
