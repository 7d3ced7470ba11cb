//! Command-template bundler.
//!
//! Runs the `mainCommand`/`uiCommand` templates from the session config.
//! Templates are argv vectors with placeholders substituted per build:
//!
//! - `{entry}`: absolute path of the source entry point
//! - `{outfile}`: absolute path of the expected artifact
//! - `{outdir}`: directory containing the artifact
//! - `{watch}`: replaced by `--watch` in watch mode, dropped otherwise
//!
//! A target without a configured template is copied verbatim from entry to
//! artifact, which covers plain-JavaScript plugins that need no bundling.

use crate::bundler::{BuildTarget, BundleTask, BundleWatch, Bundler};
use crate::config::PlinthConfig;
use crate::error::{BuildError, Result};
use crate::pm::PackageManager;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Longest stderr tail carried into an error message.
const STDERR_TAIL: usize = 2000;

/// Bundler backed by user-configured shell commands.
pub struct ProcessBundler {
    cwd: PathBuf,
    manager: PackageManager,
    main_template: Vec<String>,
    ui_template: Vec<String>,
}

impl ProcessBundler {
    /// Build a bundler from the session config.
    pub fn from_config(config: &PlinthConfig, manager: PackageManager, cwd: &Path) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            manager,
            main_template: config.main_command.clone(),
            ui_template: config.ui_command.clone(),
        }
    }

    fn template(&self, target: BuildTarget) -> &[String] {
        match target {
            BuildTarget::Main => &self.main_template,
            BuildTarget::Ui => &self.ui_template,
        }
    }

    /// Copy the entry verbatim when no command is configured.
    async fn passthrough(&self, task: &BundleTask) -> Result<()> {
        debug!(
            target = task.target.label(),
            "no bundler command configured, copying entry verbatim"
        );
        if needs_compilation(&task.entry) {
            crate::ui::warning(&format!(
                "No {}Command configured: {} is copied verbatim, not compiled",
                task.target.label(),
                task.entry.display()
            ));
        }
        if let Some(parent) = task.outfile.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&task.entry, &task.outfile).await?;
        Ok(())
    }

    fn command(&self, argv: &[String]) -> Command {
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]).current_dir(&self.cwd);
        command
    }
}

#[async_trait]
impl Bundler for ProcessBundler {
    async fn build(&self, task: &BundleTask) -> Result<()> {
        let template = self.template(task.target);
        if template.is_empty() {
            return self.passthrough(task).await;
        }

        let argv = render(template, task, false);
        debug!(target = task.target.label(), command = ?argv, "running bundler");

        let output = self
            .command(&argv)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| BuildError::Spawn {
                command: argv[0].clone(),
                hint: self.manager.install_hint(),
                source,
            })?;

        if !output.status.success() {
            return Err(BuildError::Exited {
                command: argv[0].clone(),
                status: output.status,
                stderr: tail(&output.stderr),
            }
            .into());
        }
        Ok(())
    }

    async fn watch(&self, task: &BundleTask) -> Result<BundleWatch> {
        let template = self.template(task.target);
        if template.is_empty() {
            // Nothing external to keep alive; the initial copy is the build.
            self.passthrough(task).await?;
            return Ok(BundleWatch::detached(task.target));
        }

        let argv = render(template, task, true);
        info!(target = task.target.label(), command = ?argv, "starting bundler watch");

        let child = self
            .command(&argv)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildError::Spawn {
                command: argv[0].clone(),
                hint: self.manager.install_hint(),
                source,
            })?;

        Ok(BundleWatch::process(task.target, child))
    }

    fn watches_externally(&self, target: BuildTarget) -> bool {
        !self.template(target).is_empty()
    }
}

/// Substitute placeholders into a command template.
fn render(template: &[String], task: &BundleTask, watch: bool) -> Vec<String> {
    let outdir = task
        .outfile
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    template
        .iter()
        .filter_map(|part| {
            if part == "{watch}" {
                return watch.then(|| "--watch".to_string());
            }
            Some(
                part.replace("{entry}", &task.entry.to_string_lossy())
                    .replace("{outfile}", &task.outfile.to_string_lossy())
                    .replace("{outdir}", &outdir.to_string_lossy()),
            )
        })
        .collect()
}

/// Whether an entry's extension implies a compile step the passthrough
/// copy cannot provide.
fn needs_compilation(entry: &Path) -> bool {
    matches!(
        entry.extension().and_then(|ext| ext.to_str()),
        Some("ts" | "tsx" | "jsx" | "mts" | "cts")
    )
}

fn tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim_end();
    match text.char_indices().nth_back(STDERR_TAIL.saturating_sub(1)) {
        Some((idx, _)) => text[idx..].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(dir: &Path) -> BundleTask {
        BundleTask {
            target: BuildTarget::Main,
            entry: dir.join("src").join("main.js"),
            outfile: dir.join("dist").join("main.js"),
        }
    }

    fn bundler(dir: &Path, main_command: Vec<String>) -> ProcessBundler {
        let config = PlinthConfig {
            main_command,
            ..PlinthConfig::default()
        };
        ProcessBundler::from_config(&config, PackageManager::Npm, dir)
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let dir = Path::new("/project");
        let argv = render(
            &[
                "esbuild".to_string(),
                "{entry}".to_string(),
                "--outfile={outfile}".to_string(),
                "{watch}".to_string(),
            ],
            &task(dir),
            false,
        );
        assert_eq!(
            argv,
            vec![
                "esbuild",
                "/project/src/main.js",
                "--outfile=/project/dist/main.js",
            ]
        );
    }

    #[test]
    fn test_render_keeps_watch_flag_in_watch_mode() {
        let dir = Path::new("/project");
        let argv = render(
            &["esbuild".to_string(), "{watch}".to_string()],
            &task(dir),
            true,
        );
        assert_eq!(argv, vec!["esbuild", "--watch"]);
    }

    #[test]
    fn test_render_outdir() {
        let dir = Path::new("/project");
        let argv = render(&["--outdir={outdir}".to_string()], &task(dir), false);
        assert_eq!(argv, vec!["--outdir=/project/dist"]);
    }

    #[tokio::test]
    async fn test_passthrough_copies_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src").join("main.js"), "plugin code").unwrap();

        let bundler = bundler(dir.path(), Vec::new());
        bundler.build(&task(dir.path())).await.unwrap();

        let written =
            std::fs::read_to_string(dir.path().join("dist").join("main.js")).unwrap();
        assert_eq!(written, "plugin code");
    }

    #[tokio::test]
    async fn test_passthrough_copies_typescript_verbatim() {
        // Without a configured command there is no transpilation: the
        // entry lands in the artifact exactly as written.
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src").join("main.ts"),
            "const n: number = 1;",
        )
        .unwrap();

        let bundler = bundler(dir.path(), Vec::new());
        let task = BundleTask {
            target: BuildTarget::Main,
            entry: dir.path().join("src").join("main.ts"),
            outfile: dir.path().join("dist").join("main.js"),
        };
        bundler.build(&task).await.unwrap();

        let written =
            std::fs::read_to_string(dir.path().join("dist").join("main.js")).unwrap();
        assert_eq!(written, "const n: number = 1;");
    }

    #[test]
    fn test_needs_compilation_tracks_extension() {
        assert!(needs_compilation(Path::new("src/main.ts")));
        assert!(needs_compilation(Path::new("src/ui.tsx")));
        assert!(!needs_compilation(Path::new("src/main.js")));
        assert!(!needs_compilation(Path::new("src/ui.html")));
    }

    #[tokio::test]
    async fn test_passthrough_watch_is_detached() {
        use crate::dev::session::Closeable;

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src").join("main.js"), "plugin code").unwrap();

        let bundler = bundler(dir.path(), Vec::new());
        let watch = bundler.watch(&task(dir.path())).await.unwrap();
        assert_eq!(watch.label(), "main");
        watch.close().await;

        assert!(dir.path().join("dist").join("main.js").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configured_command_runs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("src").join("main.js"), "code").unwrap();

        let bundler = bundler(
            dir.path(),
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "printf built > {outfile}".to_string(),
            ],
        );
        bundler.build(&task(dir.path())).await.unwrap();

        let written =
            std::fs::read_to_string(dir.path().join("dist").join("main.js")).unwrap();
        assert_eq!(written, "built");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_reports_status_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = bundler(
            dir.path(),
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo boom >&2; exit 3".to_string(),
            ],
        );

        let err = bundler.build(&task(dir.path())).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exited with"));
        assert!(msg.contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_command_reports_install_hint() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = bundler(
            dir.path(),
            vec!["plinth-test-no-such-tool".to_string(), "{entry}".to_string()],
        );

        let err = bundler.build(&task(dir.path())).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("plinth-test-no-such-tool"));
        assert!(msg.contains("npm install"));
    }

    #[test]
    fn test_tail_truncates_long_output() {
        let long = "x".repeat(STDERR_TAIL * 2);
        assert_eq!(tail(long.as_bytes()).len(), STDERR_TAIL);
        assert_eq!(tail(b"short"), "short");
    }

    #[test]
    fn test_watches_externally_tracks_templates() {
        let dir = Path::new("/project");
        let with_command = bundler(dir, vec!["esbuild".to_string()]);
        assert!(with_command.watches_externally(BuildTarget::Main));
        assert!(!with_command.watches_externally(BuildTarget::Ui));

        let passthrough = bundler(dir, Vec::new());
        assert!(!passthrough.watches_externally(BuildTarget::Main));
    }
}
