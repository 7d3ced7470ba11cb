//! Build-target executors.
//!
//! The main script and the UI document share one contract: skip silently
//! when the manifest entry is absent or its source file is missing on
//! disk, build through the bundler facade, and in persistent modes park
//! the watch handle in the session slot for that target.
//!
//! The UI target additionally post-processes its artifact. Interactive
//! sessions wrap the built markup in the bridge document; one-shot builds
//! inject the runtime script at the top of the file. Both paths leave
//! `<output>/ui.html` self-contained.

use crate::bundler::{BuildTarget, BundleTask, Bundler};
use crate::config::RuntimeOptions;
use crate::dev::{bridge, Session};
use crate::error::{BuildError, CliError, Result};
use crate::manifest::BuiltManifest;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// What one executor run produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Artifact path for this target, whether or not anything was built.
    pub output_path: PathBuf,
    /// Time spent, for runs that completed a one-shot build.
    pub duration: Option<Duration>,
    /// False when the target was skipped.
    pub built: bool,
}

impl BuildOutcome {
    fn skipped(output_path: PathBuf) -> Self {
        Self {
            output_path,
            duration: None,
            built: false,
        }
    }

    fn watching(output_path: PathBuf) -> Self {
        Self {
            output_path,
            duration: None,
            built: true,
        }
    }

    fn finished(output_path: PathBuf, duration: Duration) -> Self {
        Self {
            output_path,
            duration: Some(duration),
            built: true,
        }
    }
}

/// Runs build targets against the session's bundler.
pub struct TargetRunner {
    session: Arc<Session>,
    bundler: Arc<dyn Bundler>,
    options: RuntimeOptions,
}

impl TargetRunner {
    pub fn new(session: Arc<Session>, bundler: Arc<dyn Bundler>, options: RuntimeOptions) -> Self {
        Self {
            session,
            bundler,
            options,
        }
    }

    /// Session options this runner was built with.
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Bundler used for builds outside the executor contract.
    pub fn bundler(&self) -> &Arc<dyn Bundler> {
        &self.bundler
    }

    /// Build the main-thread script.
    ///
    /// Persistent modes start (or restart) the bundler watch for this
    /// target; one-shot builds run once and record the duration.
    pub async fn run_main(&self, manifest: &BuiltManifest) -> Result<BuildOutcome> {
        let output_path = self.options.output_file(BuildTarget::Main.artifact());
        let Some(task) = self.task_for(BuildTarget::Main, manifest.raw.main.as_deref(), &output_path)
        else {
            return Ok(BuildOutcome::skipped(output_path));
        };

        if self.options.mode.watches() {
            self.session
                .main_watch
                .restart(|| async {
                    self.bundler
                        .watch(&task)
                        .await
                        .map_err(|e| wrap_failure(BuildTarget::Main, e))
                })
                .await?;
            return Ok(BuildOutcome::watching(output_path));
        }

        let started = Instant::now();
        self.bundler
            .build(&task)
            .await
            .map_err(|e| wrap_failure(BuildTarget::Main, e))?;
        Ok(BuildOutcome::finished(output_path, started.elapsed()))
    }

    /// Rebuild the main artifact once, without touching the watch slot.
    ///
    /// Used when the main entry changes and no external watcher covers
    /// the target.
    pub async fn refresh_main(&self, manifest: &BuiltManifest) -> Result<BuildOutcome> {
        let output_path = self.options.output_file(BuildTarget::Main.artifact());
        let Some(task) = self.task_for(BuildTarget::Main, manifest.raw.main.as_deref(), &output_path)
        else {
            return Ok(BuildOutcome::skipped(output_path));
        };

        let started = Instant::now();
        self.bundler
            .build(&task)
            .await
            .map_err(|e| wrap_failure(BuildTarget::Main, e))?;
        Ok(BuildOutcome::finished(output_path, started.elapsed()))
    }

    /// Build the UI document.
    ///
    /// Interactive sessions build (or copy) the entry and wrap the result
    /// in the bridge document. `build --watch` delegates to the bundler's
    /// watch mode. One-shot builds inject the runtime script into the
    /// built artifact.
    pub async fn run_ui(&self, manifest: &BuiltManifest) -> Result<BuildOutcome> {
        let output_path = self.options.output_file(BuildTarget::Ui.artifact());
        let Some(task) = self.task_for(BuildTarget::Ui, manifest.raw.ui.as_deref(), &output_path)
        else {
            return Ok(BuildOutcome::skipped(output_path));
        };

        if self.options.mode.watches() && !self.options.mode.serves_ui() {
            self.session
                .ui_watch
                .restart(|| async {
                    self.bundler
                        .watch(&task)
                        .await
                        .map_err(|e| wrap_failure(BuildTarget::Ui, e))
                })
                .await?;
            // A passthrough watch has already produced the artifact, so
            // the runtime script can go in now. An external watcher owns
            // the file and rewrites it on its own schedule.
            if !self.bundler.watches_externally(BuildTarget::Ui) {
                self.inject_artifact(&output_path, manifest).await?;
            }
            return Ok(BuildOutcome::watching(output_path));
        }

        self.refresh_ui(manifest).await
    }

    /// Rebuild the UI artifact once, without touching the watch slot.
    ///
    /// Interactive sessions wrap the built markup in the bridge document;
    /// one-shot builds inject the runtime script instead.
    pub async fn refresh_ui(&self, manifest: &BuiltManifest) -> Result<BuildOutcome> {
        let output_path = self.options.output_file(BuildTarget::Ui.artifact());
        let Some(task) = self.task_for(BuildTarget::Ui, manifest.raw.ui.as_deref(), &output_path)
        else {
            return Ok(BuildOutcome::skipped(output_path));
        };

        let started = Instant::now();
        self.bundler
            .build(&task)
            .await
            .map_err(|e| wrap_failure(BuildTarget::Ui, e))?;
        if self.options.mode.serves_ui() {
            self.wrap_artifact(&output_path, manifest).await?;
        } else {
            self.inject_artifact(&output_path, manifest).await?;
        }
        Ok(BuildOutcome::finished(output_path, started.elapsed()))
    }

    /// The runtime configuration exposed to the UI as `window.runtimeData`.
    fn runtime_data(&self, manifest: &BuiltManifest) -> Result<Value> {
        let mut data = Map::new();
        data.insert("command".to_string(), json!(self.options.mode.name()));
        data.insert("room".to_string(), json!(self.options.room));
        if let Some(addr) = self.options.server_addr {
            data.insert("port".to_string(), json!(addr.port()));
        }
        if let Some(addr) = self.options.relay_addr {
            data.insert("relayPort".to_string(), json!(addr.port()));
        }
        data.insert(
            "manifest".to_string(),
            serde_json::to_value(&manifest.processed)?,
        );
        Ok(Value::Object(data))
    }

    async fn wrap_artifact(&self, output_path: &Path, manifest: &BuiltManifest) -> Result<()> {
        let markup = tokio::fs::read_to_string(output_path).await?;
        let document = bridge::wrap_ui(&markup, &self.runtime_data(manifest)?)?;
        tokio::fs::write(output_path, document).await?;
        Ok(())
    }

    async fn inject_artifact(&self, output_path: &Path, manifest: &BuiltManifest) -> Result<()> {
        let built = tokio::fs::read_to_string(output_path).await?;
        let document = bridge::inject_runtime_data(&built, &self.runtime_data(manifest)?)?;
        tokio::fs::write(output_path, document).await?;
        Ok(())
    }

    fn task_for(
        &self,
        target: BuildTarget,
        entry: Option<&str>,
        output_path: &Path,
    ) -> Option<BundleTask> {
        let Some(entry) = entry else {
            debug!(
                target = target.label(),
                "no manifest entry for target, skipping"
            );
            return None;
        };
        let entry_path = self.options.resolve(entry);
        if !entry_path.exists() {
            debug!(
                target = target.label(),
                entry = %entry_path.display(),
                "entry source missing on disk, skipping"
            );
            return None;
        }
        Some(BundleTask {
            target,
            entry: entry_path,
            outfile: output_path.to_path_buf(),
        })
    }
}

/// Wrap a bundler failure with the target that was being built.
fn wrap_failure(target: BuildTarget, error: CliError) -> CliError {
    let cause = match error {
        CliError::Build(inner) => inner.to_string(),
        other => other.to_string(),
    };
    BuildError::TargetFailed {
        target: target.label().to_string(),
        cause,
    }
    .into()
}
