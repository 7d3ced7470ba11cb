//! Shared utilities for command implementations.
//!
//! This module provides common functionality used across multiple
//! commands: session option resolution, path handling and browser
//! launching.

use crate::cli::SessionArgs;
use crate::config::{CommandMode, PlinthConfig, RuntimeOptions};
use crate::error::{Result, ResultExt};
use crate::ui;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Resolve a path relative to a working directory.
///
/// If the path is absolute, returns it unchanged. Otherwise, joins it
/// with the working directory.
pub fn resolve_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Load the layered configuration and derive the session options.
///
/// The project root comes from `--cwd`, a `cwd` key in the config file,
/// or the current directory, in that order of preference. Interactive
/// modes also resolve the development server and relay addresses here so
/// the whole session agrees on them.
///
/// # Errors
///
/// Fails when the project root does not exist or the configuration is
/// invalid.
pub fn load_session(
    mode: CommandMode,
    args: &SessionArgs,
    open: bool,
) -> Result<(PlinthConfig, RuntimeOptions)> {
    let cwd = match &args.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    let cwd = cwd.canonicalize().with_path(&cwd)?;

    let config = PlinthConfig::load(&cwd, args.config.as_deref(), args.port, args.output.as_deref())?;

    let cwd = match &config.cwd {
        Some(root) => {
            let root = resolve_path(root, &cwd);
            root.canonicalize().with_path(&root)?
        }
        None => cwd,
    };
    let output = resolve_path(&config.output, &cwd);

    let (server_addr, relay_addr) = if mode.serves_ui() {
        let host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let server = SocketAddr::new(host, config.port);
        let relay_port = config.relay_port.unwrap_or(config.port.saturating_add(1));
        (Some(server), Some(SocketAddr::new(host, relay_port)))
    } else {
        (None, None)
    };

    let options = RuntimeOptions {
        mode,
        cwd,
        output,
        server_addr,
        relay_addr,
        room: session_room(),
        open,
    };
    Ok((config, options))
}

/// Fresh relay room shared by this session's peers.
fn session_room() -> String {
    format!("plinth-{}", uuid::Uuid::new_v4().simple())
}

/// Open a URL in the default browser.
///
/// Uses platform-specific commands:
/// - macOS: `open`
/// - Windows: `start`
/// - Linux: `xdg-open`
pub fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => ui::info(&format!("Opened browser at {}", url)),
        Err(e) => ui::warning(&format!("Failed to open browser: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn session_args(cwd: &Path) -> SessionArgs {
        SessionArgs {
            cwd: Some(cwd.to_path_buf()),
            config: None,
            output: None,
            port: None,
        }
    }

    #[test]
    fn test_resolve_path_absolute_is_untouched() {
        let abs = Path::new("/somewhere/file.ts");
        assert_eq!(resolve_path(abs, Path::new("/project")), abs);
    }

    #[test]
    fn test_resolve_path_relative_joins_cwd() {
        assert_eq!(
            resolve_path(Path::new("dist"), Path::new("/project")),
            PathBuf::from("/project/dist")
        );
    }

    #[test]
    fn test_session_rooms_are_unique() {
        assert_ne!(session_room(), session_room());
    }

    #[test]
    #[serial]
    fn test_interactive_session_resolves_addresses() {
        std::env::remove_var("PLINTH_PORT");
        let dir = tempfile::tempdir().unwrap();

        let (config, options) =
            load_session(CommandMode::Dev, &session_args(dir.path()), false).unwrap();

        assert_eq!(config.port, 4400);
        assert_eq!(options.server_addr.unwrap().port(), 4400);
        // Relay defaults to the port after the server's.
        assert_eq!(options.relay_addr.unwrap().port(), 4401);
        assert!(options.output.ends_with("dist"));
        assert!(options.output.is_absolute());
    }

    #[test]
    #[serial]
    fn test_build_session_has_no_addresses() {
        std::env::remove_var("PLINTH_PORT");
        let dir = tempfile::tempdir().unwrap();

        let (_, options) = load_session(
            CommandMode::Build { watch: false },
            &session_args(dir.path()),
            false,
        )
        .unwrap();

        assert!(options.server_addr.is_none());
        assert!(options.relay_addr.is_none());
    }

    #[test]
    #[serial]
    fn test_relay_port_override_wins() {
        std::env::remove_var("PLINTH_PORT");
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("plinth.config.json"),
            r#"{ "relayPort": 9100 }"#,
        )
        .unwrap();

        let (_, options) =
            load_session(CommandMode::Preview, &session_args(dir.path()), true).unwrap();
        assert_eq!(options.relay_addr.unwrap().port(), 9100);
        assert!(options.open);
    }

    #[test]
    #[serial]
    fn test_missing_project_root_is_an_error() {
        let args = SessionArgs {
            cwd: Some(PathBuf::from("/definitely/not/a/project")),
            config: None,
            output: None,
            port: None,
        };
        assert!(load_session(CommandMode::Dev, &args, false).is_err());
    }
}
