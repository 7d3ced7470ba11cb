//! Preview command implementation.
//!
//! A preview session is a dev session that opens the served UI in the
//! default browser once everything is up. `--no-open` turns that back
//! off for terminals where a browser launch is unwanted.

use crate::cli::PreviewArgs;
use crate::commands::pipeline;
use crate::config::CommandMode;
use crate::error::Result;

/// Execute the preview command.
///
/// # Errors
///
/// Same failure surface as `dev`: configuration, descriptor, initial
/// build and server startup errors end the command; later rebuild
/// errors only end the affected rebuild.
pub async fn execute(args: PreviewArgs) -> Result<()> {
    pipeline::run_interactive(CommandMode::Preview, &args.session, !args.no_open).await
}
