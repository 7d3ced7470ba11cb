//! Development session command implementation.
//!
//! Orchestrates the entire interactive session lifecycle:
//! - Initial pipeline (manifest → main script → UI document)
//! - Message relay between the sandbox, the preview and host tooling
//! - Development server with reload-on-change
//! - File watching feeding the rebuild orchestrator
//! - Graceful shutdown on Ctrl+C

use crate::cli::DevArgs;
use crate::commands::pipeline;
use crate::config::CommandMode;
use crate::error::Result;

/// Execute the dev command.
///
/// # Errors
///
/// Returns errors for invalid configuration, a missing or malformed
/// descriptor, initial build failures and server startup failures. Once
/// the session is up, rebuild errors are reported and swallowed so the
/// watch loop survives them.
pub async fn execute(args: DevArgs) -> Result<()> {
    pipeline::run_interactive(CommandMode::Dev, &args.session, args.open).await
}
