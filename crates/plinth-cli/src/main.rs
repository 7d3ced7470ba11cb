//! Plinth CLI - develop, preview and build design-tool plugins.
//!
//! This is the main entry point for the plinth CLI. It handles
//! command-line argument parsing, logging initialization, and command
//! dispatch.

use clap::Parser;
use miette::Result;
use plinth_cli::{cli, commands, error, logger, ui};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = cli::Cli::parse();

    // Initialize logging and colors based on global flags
    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors();

    // Execute the appropriate command
    let result = match args.command {
        cli::Command::Dev(dev_args) => commands::dev_execute(dev_args).await,
        cli::Command::Preview(preview_args) => commands::preview_execute(preview_args).await,
        cli::Command::Build(build_args) => commands::build_execute(build_args).await,
    };

    // Convert CLI errors to miette diagnostics for readable reporting
    result.map_err(error::cli_error_to_miette)
}
