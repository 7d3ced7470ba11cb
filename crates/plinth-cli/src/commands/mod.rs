//! Command implementations for the plinth CLI.
//!
//! This module contains the implementation of all CLI commands:
//!
//! - [`dev`] - Interactive session with rebuild-on-change and reload
//! - [`preview`] - Interactive session that opens a browser preview
//! - [`build`] - One-shot or watching artifact builds
//!
//! Each command is implemented in its own module and provides an
//! `execute` function that takes the parsed command arguments and
//! returns a Result. The shared session assembly (config resolution,
//! initial pipeline, watcher wiring) lives in [`pipeline`].

pub mod build;
pub mod dev;
pub mod preview;

mod pipeline;
pub(crate) mod utils;

// Re-export execute functions for convenience
pub use build::execute as build_execute;
pub use dev::execute as dev_execute;
pub use preview::execute as preview_execute;
