//! Session configuration for the plinth CLI.
//!
//! Configuration is layered from four sources, lowest priority first:
//! defaults, `plinth.config.json`, `PLINTH_*` environment variables, and
//! CLI flags. The merged [`PlinthConfig`] is then validated once at the
//! command boundary into a [`RuntimeOptions`] value that the rest of the
//! session reads without further checking.

mod loading;

use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Which command is driving the current session.
///
/// The mode decides which long-lived pieces a session runs: interactive
/// commands serve the UI over HTTP and relay plugin messages, watch builds
/// keep bundler processes alive without any servers, and one-shot builds
/// run the pipeline once and exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// `plinth dev`: full interactive session with reload-on-change.
    Dev,
    /// `plinth preview`: interactive session that opens the browser.
    Preview,
    /// `plinth build`: produce artifacts, optionally keeping watchers alive.
    Build {
        /// Keep bundler watch processes running after the first build.
        watch: bool,
    },
}

impl CommandMode {
    /// Command name as typed by the user.
    pub fn name(&self) -> &'static str {
        match self {
            CommandMode::Dev => "dev",
            CommandMode::Preview => "preview",
            CommandMode::Build { .. } => "build",
        }
    }

    /// Whether this session runs the development server and message relay.
    pub fn serves_ui(&self) -> bool {
        matches!(self, CommandMode::Dev | CommandMode::Preview)
    }

    /// Whether this session keeps file watchers and bundler processes alive.
    pub fn watches(&self) -> bool {
        !matches!(self, CommandMode::Build { watch: false })
    }
}

/// User-facing configuration, merged from file, environment and CLI flags.
///
/// Stored as `plinth.config.json` in the project root. All fields are
/// optional; missing ones fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlinthConfig {
    /// Output directory for built artifacts, relative to the project root.
    pub output: PathBuf,

    /// Preferred development server port. When taken, the next ten ports
    /// are probed before giving up.
    pub port: u16,

    /// Relay port. Defaults to the development server port plus one.
    pub relay_port: Option<u16>,

    /// Command template for bundling the main-thread script. `{entry}`,
    /// `{outfile}` and `{watch}` placeholders are substituted per build.
    /// Empty means the entry file is copied verbatim into the output
    /// directory, which suits plain-JavaScript plugins; sources that
    /// need compilation (TypeScript, JSX) require a command.
    pub main_command: Vec<String>,

    /// Command template for bundling the UI entry in one-shot builds.
    /// Same placeholders and same verbatim-copy fallback as
    /// `main_command`.
    pub ui_command: Vec<String>,

    /// Development server overrides, deep-merged over the built-in
    /// defaults. Objects merge recursively; scalars and arrays replace.
    pub server: Option<serde_json::Value>,

    /// Project root override. Defaults to the current directory.
    pub cwd: Option<PathBuf>,
}

impl Default for PlinthConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("dist"),
            port: 4400,
            relay_port: None,
            main_command: Vec::new(),
            ui_command: Vec::new(),
            server: None,
            cwd: None,
        }
    }
}

/// Validated per-session options.
///
/// Built once by the command entry point after config loading and port
/// resolution. Everything downstream treats this as read-only.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Which command is running.
    pub mode: CommandMode,
    /// Absolute project root.
    pub cwd: PathBuf,
    /// Absolute output directory.
    pub output: PathBuf,
    /// Resolved development server address. `None` for build sessions.
    pub server_addr: Option<SocketAddr>,
    /// Resolved relay address. `None` for build sessions.
    pub relay_addr: Option<SocketAddr>,
    /// Relay room shared by this session's peers. Fresh per invocation.
    pub room: String,
    /// Open the served UI in a browser once the session is up.
    pub open: bool,
}

impl RuntimeOptions {
    /// Path of an artifact inside the output directory.
    pub fn output_file(&self, name: &str) -> PathBuf {
        self.output.join(name)
    }

    /// Resolve a manifest-relative path against the project root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.cwd.join(relative).clean()
    }

    /// Whether `path` refers to the manifest entry `entry`.
    pub fn matches_entry(&self, path: &Path, entry: &str) -> bool {
        path.to_path_buf().clean() == self.resolve(entry)
    }

    /// HTTP URL of the development server, when one is running.
    pub fn server_url(&self) -> Option<String> {
        self.server_addr.map(|addr| format!("http://{}", addr))
    }
}
