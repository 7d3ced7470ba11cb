//! Miette diagnostic conversion for CLI errors.
//!
//! This module provides conversion from CLI errors to miette diagnostics
//! for readable error reporting at the binary boundary.

use crate::error::{BuildError, CliError};
use miette::Report;

/// Convert CliError to miette Report
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Build(e) => build_error_to_miette(e),
        CliError::Config(e) => miette::miette!("Configuration error: {}", e),
        CliError::Relay(e) => miette::miette!("Relay error: {}", e),
        _ => miette::miette!("{}", err),
    }
}

/// Convert BuildError to miette Report
fn build_error_to_miette(err: BuildError) -> Report {
    match err {
        BuildError::Exited {
            command,
            status,
            stderr,
        } => {
            miette::miette!(
                "Bundler command '{}' exited with {}\n{}\n\nHint: Run the command manually to see its full output",
                command,
                status,
                stderr
            )
        }
        BuildError::Spawn {
            command,
            hint,
            source,
        } => {
            miette::miette!(
                "Bundler command '{}' failed to start: {}\n\nHint: {}",
                command,
                source,
                hint
            )
        }
        _ => miette::miette!("{}", err),
    }
}
