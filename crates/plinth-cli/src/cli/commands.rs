use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Available plinth subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive development session
    ///
    /// Builds the manifest, main script and UI document, watches the
    /// project for changes, serves the UI with reload-on-change and runs
    /// the message relay between the plugin sandbox and the browser.
    Dev(DevArgs),

    /// Start a development session and open a browser preview
    ///
    /// Identical to `dev`, plus the served UI is opened in the default
    /// browser once the session is up.
    Preview(PreviewArgs),

    /// Build plugin artifacts
    ///
    /// Writes the processed manifest, the bundled main-thread script and
    /// the self-contained UI document into the output directory. With
    /// `--watch`, bundler watch processes stay alive and artifacts are
    /// regenerated on change, without any servers.
    Build(BuildArgs),
}

/// Options shared by every session-driving command.
#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Project root directory
    ///
    /// Defaults to the current directory. The manifest descriptor and
    /// `plinth.config.json` are looked up here.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Path to the configuration file
    ///
    /// Defaults to `plinth.config.json` in the project root. The file is
    /// optional; missing keys fall back to built-in defaults.
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output directory for built artifacts
    ///
    /// Created if it doesn't exist. Overrides the `output` key of the
    /// configuration file.
    #[arg(short = 'd', long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Development server port
    ///
    /// When the port is taken the next few are probed as fallbacks. The
    /// relay listens on the port after the server's unless `relayPort`
    /// is configured.
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,
}

/// Arguments for the dev command
#[derive(Args, Debug)]
pub struct DevArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Open the served UI in the default browser
    #[arg(long)]
    pub open: bool,
}

/// Arguments for the preview command
#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Do not open a browser automatically
    #[arg(long)]
    pub no_open: bool,
}

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Keep watching and rebuilding after the first build
    ///
    /// Bundler watch processes stay alive and artifacts are regenerated
    /// when sources or the descriptor change. No servers are started.
    #[arg(short, long)]
    pub watch: bool,
}
