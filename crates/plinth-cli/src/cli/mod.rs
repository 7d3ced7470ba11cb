//! Command-line interface definition for the plinth CLI.
//!
//! This module defines the complete CLI structure using clap v4's derive
//! macros. It provides type-safe argument parsing with clear error
//! messages.
//!
//! # Command Structure
//!
//! - `plinth dev` - Interactive session with rebuild-on-change and reload
//! - `plinth preview` - Interactive session that opens a browser preview
//! - `plinth build` - Produce plugin artifacts once, or keep watching

mod commands;

use clap::Parser;

pub use commands::{BuildArgs, Command, DevArgs, PreviewArgs, SessionArgs};

/// Plinth - a development toolkit for design-tool plugins
#[derive(Parser, Debug)]
#[command(
    name = "plinth",
    version,
    about = "Develop, preview and build design-tool plugins",
    long_about = "Plinth builds a plugin's manifest, main-thread script and UI \
                  document,\nserves the UI during development, and relays events \
                  between the plugin\nsandbox, a browser preview and host tooling."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    ///
    /// Shows detailed information about the session, including watcher
    /// events, rebuild decisions and relay traffic.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    ///
    /// Only critical errors will be displayed. Useful for CI/CD
    /// environments or when piping output to other tools.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    ///
    /// Outputs plain text without ANSI color codes. Useful for logging to
    /// files or systems that don't support colored terminal output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_dev_with_defaults() {
        let cli = parse(&["plinth", "dev"]);
        assert!(!cli.verbose);
        assert!(!cli.quiet);
        match cli.command {
            Command::Dev(args) => {
                assert!(!args.open);
                assert!(args.session.port.is_none());
                assert!(args.session.cwd.is_none());
            }
            _ => panic!("expected dev"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["plinth", "build", "--verbose"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Build(_)));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["plinth", "dev", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_build_watch_flag() {
        let cli = parse(&["plinth", "build", "--watch"]);
        match cli.command {
            Command::Build(args) => assert!(args.watch),
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_session_overrides() {
        let cli = parse(&[
            "plinth", "dev", "--port", "5100", "--output", "out", "--cwd", "/tmp/p",
        ]);
        match cli.command {
            Command::Dev(args) => {
                assert_eq!(args.session.port, Some(5100));
                assert_eq!(args.session.output.as_deref().unwrap().to_str(), Some("out"));
                assert_eq!(args.session.cwd.as_deref().unwrap().to_str(), Some("/tmp/p"));
            }
            _ => panic!("expected dev"),
        }
    }

    #[test]
    fn test_preview_opens_by_default() {
        let cli = parse(&["plinth", "preview"]);
        match cli.command {
            Command::Preview(args) => assert!(!args.no_open),
            _ => panic!("expected preview"),
        }
    }
}
