//! Error handling for the plinth CLI.
//!
//! This module provides a hierarchical error type system using `thiserror` for
//! structured error handling with actionable messages. Each variant carries
//! enough context for users to resolve the problem without reading source.
//!
//! # Architecture
//!
//! The error hierarchy follows these principles:
//! - **Top-level errors** (`CliError`) represent broad categories of failures
//! - **Domain-specific errors** (`ConfigError`, `BuildError`, `ServerError`)
//!   provide detailed context
//! - **Error conversion** is automatic via `#[from]` attributes
//! - **Context helpers** allow attaching additional information to errors
//!
//! # Example
//!
//! ```rust,no_run
//! use plinth_cli::error::{Result, ResultExt, CliError};
//! use std::path::Path;
//! use std::str::FromStr;
//!
//! struct Descriptor;
//!
//! impl FromStr for Descriptor {
//!     type Err = CliError;
//!
//!     fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
//!         Ok(Descriptor)
//!     }
//! }
//!
//! fn load_descriptor(path: &Path) -> Result<Descriptor> {
//!     std::fs::read_to_string(path)
//!         .with_path(path)?
//!         .parse()
//!         .with_hint("Check JSON syntax")
//! }
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

mod miette;

pub use self::miette::cli_error_to_miette;

/// Top-level CLI error type.
///
/// This is the primary error type returned by CLI commands. It automatically
/// converts from domain-specific errors via `From` implementations.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration and manifest-descriptor errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Build pipeline errors (bundler invocations, artifact writes)
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Bridge template errors
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Development server errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Message relay errors
    #[error("Relay error: {0}")]
    Relay(#[from] plinth_relay::RelayError),

    /// Invalid command-line arguments or options
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

/// Configuration-specific errors.
///
/// These errors occur while locating and parsing the plugin manifest
/// descriptor, the `plinth.config.json` file, and CLI options.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither descriptor location yielded a manifest
    #[error("No plugin manifest found in {}\n\nHint: Add a manifest.json to the project root, or a \"plinth\": {{ \"manifest\": {{ ... }} }} field to package.json", .0.display())]
    DescriptorNotFound(PathBuf),

    /// A descriptor or config file has invalid JSON syntax
    #[error("Invalid JSON in {file}: {source}\n\nHint: Use a JSON validator to check syntax")]
    InvalidJson {
        /// File that failed to parse
        file: String,
        /// The underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// Missing required configuration field
    #[error("Missing required field: {field}\n\nHint: {hint}")]
    MissingField {
        /// Name of the missing field
        field: String,
        /// Helpful hint for providing the field
        hint: String,
    },

    /// Invalid value for a configuration option
    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The invalid value
        value: String,
        /// Helpful hint for correct values
        hint: String,
    },

    /// I/O error while reading a descriptor or config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Build pipeline errors.
///
/// These errors occur while running bundler commands for the main and UI
/// targets and while writing artifacts into the output directory.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A bundler invocation failed; the target names which artifact
    #[error("Failed to build {target}: {cause}")]
    TargetFailed {
        /// Build target label ("main" or "ui")
        target: String,
        /// The underlying failure, formatted
        cause: String,
    },

    /// The bundler command could not be started at all
    #[error("Bundler command '{command}' failed to start: {source}\n\nHint: {hint}")]
    Spawn {
        /// The executable that was invoked
        command: String,
        /// Installation hint for the resolved package manager
        hint: String,
        /// The underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// The bundler ran but exited unsuccessfully
    #[error("Bundler command '{command}' exited with {status}\n{stderr}\n\nHint: Run the command manually to see its full output")]
    Exited {
        /// The executable that was invoked
        command: String,
        /// Process exit status
        status: std::process::ExitStatus,
        /// Captured stderr tail
        stderr: String,
    },

    /// Generic build error
    #[error("{0}")]
    Custom(String),
}

/// Bridge template errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The embedded bridge template lost its insertion point
    #[error("Bridge template is missing a <body> tag\n\nHint: The bridge document needs a <body> anchor to receive the runtime script and UI markup")]
    MissingBodyAnchor,
}

/// Development server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The resolved address could not be bound
    #[error("Failed to bind development server on {addr}: {source}\n\nHint: Another process may be using this port. Stop it or pick a different one with --port")]
    Bind {
        /// Address the server tried to bind
        addr: SocketAddr,
        /// The underlying bind error
        #[source]
        source: std::io::Error,
    },

    /// Every candidate port in the scan window was taken
    #[error("Ports {start}-{end} are all in use\n\nHint: Free one of them or choose a different range with --port")]
    PortsExhausted {
        /// First port probed
        start: u16,
        /// Last port probed
        end: u16,
    },
}

/// Result type alias using `CliError` as the default error type.
///
/// This simplifies function signatures throughout the CLI.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
///
/// This trait provides convenient methods for enriching errors with additional
/// context like file paths or helpful hints.
pub trait ResultExt<T> {
    /// Add a file path to the error context.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use std::path::Path;
    /// # use plinth_cli::error::{Result, ResultExt};
    /// # fn run() -> Result<()> {
    /// let path = Path::new("non_existent_file.txt");
    /// std::fs::read_to_string(path)
    ///     .with_path(path)?;
    /// # Ok(())
    /// # }
    /// ```
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Add a helpful hint to the error context.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use plinth_cli::error::{Result, ResultExt, CliError};
    /// # fn run() -> Result<()> {
    /// fn parse_descriptor(content: &str) -> Result<()> {
    ///     Err(CliError::Custom("parsing failed".into()))
    /// }
    /// let content = r#"{ "key": "value" }"#;
    /// parse_descriptor(&content)
    ///     .with_hint("Check for trailing commas in JSON")?;
    /// # Ok(())
    /// # }
    /// ```
    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    /// Convert to a custom error message.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use plinth_cli::error::{Result, ResultExt, CliError};
    /// # fn run() -> Result<()> {
    /// fn operation() -> Result<()> {
    ///     Err(CliError::Custom("something went wrong".into()))
    /// }
    /// operation()
    ///     .context("Failed to start session")?;
    /// # Ok(())
    /// # }
    /// ```
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            // Enhance the error with path information if it's an I/O error
            match err {
                CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                    CliError::FileNotFound(path.as_ref().to_path_buf())
                }
                other => other,
            }
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}\n\nHint: {}", err, hint))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}: {}", msg, err))
        })
    }
}
