//! Rebuild orchestration.
//!
//! A single task owns the session's [`WatcherState`] and consumes the
//! merged watch-event channel, handling events strictly one at a time in
//! arrival order. Each event decides which build targets to (re)run:
//! descriptor changes rebuild the manifest and diff its entry values
//! against the previous ones, source-tree changes re-run the executor for
//! the entry they belong to. Errors inside one handler are logged and the
//! loop moves on, so a broken descriptor or a failing bundler never ends
//! the watch session.

use crate::bundler::BuildTarget;
use crate::config::RuntimeOptions;
use crate::dev::server::{start_ui_server, UiServerConfig};
use crate::dev::watcher::{self, SessionEvent};
use crate::dev::{Session, TargetRunner};
use crate::error::Result;
use crate::manifest::{build_manifest, BuiltManifest};
use crate::ui::format_duration;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// What the last descriptor read said about the build targets.
///
/// One instance per dev session, owned and exclusively mutated by the
/// orchestrator. `existing_files` only grows; removals are handled by
/// cleaning stale outputs, not by forgetting the path.
#[derive(Debug)]
pub struct WatcherState {
    /// `raw.main` from the last manifest build.
    pub previous_main: Option<String>,
    /// `raw.ui` from the last manifest build.
    pub previous_ui: Option<String>,
    /// Source files already seen, so watcher chatter about known files
    /// never counts as an add.
    pub existing_files: HashSet<PathBuf>,
}

impl WatcherState {
    /// Seed the state from the initial manifest build and the files
    /// already on disk.
    fn seeded(manifest: &BuiltManifest, options: &RuntimeOptions) -> Self {
        let mut existing_files = HashSet::new();
        let walk = WalkDir::new(&options.cwd)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !watcher::should_ignore(entry.path(), &options.cwd, &options.output)
            });
        for entry in walk.filter_map(|entry| entry.ok()) {
            if entry.file_type().is_file() {
                existing_files.insert(entry.path().to_path_buf());
            }
        }

        Self {
            previous_main: manifest.raw.main.clone(),
            previous_ui: manifest.raw.ui.clone(),
            existing_files,
        }
    }
}

/// How a manifest entry moved between two descriptor reads.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EntryChange {
    Unchanged,
    /// Entry now points at this path.
    Set(String),
    /// Entry was removed from the descriptor.
    Cleared,
}

impl EntryChange {
    fn classify(previous: Option<&str>, current: Option<&str>) -> Self {
        match (previous, current) {
            (old, new) if old == new => EntryChange::Unchanged,
            (_, Some(new)) => EntryChange::Set(new.to_string()),
            (Some(_), None) => EntryChange::Cleared,
            (None, None) => EntryChange::Unchanged,
        }
    }
}

/// Which target the orchestrator is currently rebuilding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Manifest,
    Main,
    Ui,
}

/// The session's rebuild state machine.
///
/// Constructed after the initial pipeline has run, so the manifest and
/// entry values seed the state instead of being re-read.
pub struct Orchestrator {
    session: Arc<Session>,
    runner: TargetRunner,
    /// Present when the command serves the UI; used to restart the
    /// development server when the UI entry changes.
    server_config: Option<UiServerConfig>,
    /// The manifest from the last successful build, reused by source
    /// handlers so they never re-read the descriptor.
    manifest: BuiltManifest,
    state: WatcherState,
    phase: Phase,
}

impl Orchestrator {
    /// Build the orchestrator for one session.
    pub fn new(
        session: Arc<Session>,
        runner: TargetRunner,
        server_config: Option<UiServerConfig>,
        manifest: BuiltManifest,
    ) -> Self {
        let state = WatcherState::seeded(&manifest, runner.options());
        debug!(
            known_files = state.existing_files.len(),
            main = ?state.previous_main,
            ui = ?state.previous_ui,
            "watch state seeded"
        );
        Self {
            session,
            runner,
            server_config,
            manifest,
            state,
            phase: Phase::Idle,
        }
    }

    /// Consume watch events until the channel closes.
    ///
    /// The busy flag is held for the whole of one event's handling so the
    /// development server buffers reload notifications until the handler
    /// is done. Handler errors are reported and swallowed.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        debug!("orchestrator running");
        while let Some(event) = events.recv().await {
            self.session.set_busy(true);
            let result = self.handle(&event).await;
            self.set_phase(Phase::Idle);
            self.session.set_busy(false);
            if let Err(error) = result {
                crate::ui::error(&format!("Rebuild failed: {error}"));
            }
        }
        debug!("watch channel closed, orchestrator done");
    }

    async fn handle(&mut self, event: &SessionEvent) -> Result<()> {
        match event {
            SessionEvent::Manifest(path) => self.handle_manifest(path).await,
            SessionEvent::SourceAdded(path) => self.handle_source_added(path).await,
            SessionEvent::SourceChanged(path) => self.handle_source_changed(path).await,
            SessionEvent::SourceRemoved(path) => self.handle_source_removed(path).await,
        }
    }

    /// A descriptor file changed: rebuild the manifest and re-run the
    /// targets whose entry values moved.
    ///
    /// The new entry values are persisted before the executors run, so a
    /// failed build is retried through the missing-output check on the
    /// next event instead of looking like another entry change.
    async fn handle_manifest(&mut self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "descriptor changed");
        self.set_phase(Phase::Manifest);
        let built = build_manifest(self.runner.options()).await?;

        let main_change = EntryChange::classify(
            self.state.previous_main.as_deref(),
            built.raw.main.as_deref(),
        );
        let ui_change =
            EntryChange::classify(self.state.previous_ui.as_deref(), built.raw.ui.as_deref());
        self.state.previous_main = built.raw.main.clone();
        self.state.previous_ui = built.raw.ui.clone();
        self.manifest = built;

        match main_change {
            EntryChange::Set(entry) => {
                debug!(entry = %entry, "main entry changed");
                self.set_phase(Phase::Main);
                let outcome = self.runner.run_main(&self.manifest).await?;
                self.report(BuildTarget::Main, outcome.duration);
            }
            EntryChange::Cleared => {
                debug!("main entry removed");
                self.session.main_watch.close().await;
                self.remove_artifact(BuildTarget::Main).await;
            }
            EntryChange::Unchanged => {
                if self.wants_heal(self.state.previous_main.as_deref(), BuildTarget::Main) {
                    debug!("main output missing, rebuilding");
                    self.set_phase(Phase::Main);
                    self.runner.run_main(&self.manifest).await?;
                }
            }
        }

        match ui_change {
            EntryChange::Set(entry) => {
                debug!(entry = %entry, "ui entry changed");
                self.set_phase(Phase::Ui);
                self.restart_server().await?;
                let outcome = self.runner.run_ui(&self.manifest).await?;
                self.report(BuildTarget::Ui, outcome.duration);
                self.session.notify_ui_change(outcome.output_path);
            }
            EntryChange::Cleared => {
                debug!("ui entry removed");
                self.session.ui_watch.close().await;
                self.remove_artifact(BuildTarget::Ui).await;
            }
            EntryChange::Unchanged => {
                if self.wants_heal(self.state.previous_ui.as_deref(), BuildTarget::Ui) {
                    debug!("ui output missing, rebuilding");
                    self.set_phase(Phase::Ui);
                    let outcome = self.runner.run_ui(&self.manifest).await?;
                    self.session.notify_ui_change(outcome.output_path);
                }
            }
        }

        Ok(())
    }

    /// A new file appeared: if it is the source of a skipped target, run
    /// that target now.
    async fn handle_source_added(&mut self, path: &Path) -> Result<()> {
        if !self.state.existing_files.insert(path.to_path_buf()) {
            debug!(path = %path.display(), "known file, ignoring add");
            return Ok(());
        }
        debug!(path = %path.display(), "source file added");

        if self.is_entry(self.state.previous_ui.as_deref(), path) {
            self.set_phase(Phase::Ui);
            self.restart_server().await?;
            let outcome = self.runner.run_ui(&self.manifest).await?;
            self.report(BuildTarget::Ui, outcome.duration);
            self.session.notify_ui_change(outcome.output_path);
        }
        if self.is_entry(self.state.previous_main.as_deref(), path) {
            self.set_phase(Phase::Main);
            let outcome = self.runner.run_main(&self.manifest).await?;
            self.report(BuildTarget::Main, outcome.duration);
        }

        self.clean_stale_outputs().await;
        Ok(())
    }

    /// An entry source changed: rebuild it unless an external watcher
    /// already owns that target.
    async fn handle_source_changed(&mut self, path: &Path) -> Result<()> {
        if self.is_entry(self.state.previous_ui.as_deref(), path) {
            let external = self.runner.bundler().watches_externally(BuildTarget::Ui);
            // Interactive sessions always one-shot the UI build, so the
            // rebuild is ours even when a ui command is configured.
            if self.runner.options().mode.serves_ui() || !external {
                self.set_phase(Phase::Ui);
                let outcome = self.runner.refresh_ui(&self.manifest).await?;
                self.report(BuildTarget::Ui, outcome.duration);
                self.session.notify_ui_change(outcome.output_path);
            }
            return Ok(());
        }

        if self.is_entry(self.state.previous_main.as_deref(), path) {
            if !self.runner.bundler().watches_externally(BuildTarget::Main) {
                self.set_phase(Phase::Main);
                let outcome = self.runner.refresh_main(&self.manifest).await?;
                self.report(BuildTarget::Main, outcome.duration);
            }
            return Ok(());
        }

        debug!(path = %path.display(), "change outside tracked entries");
        Ok(())
    }

    /// A file disappeared: drop outputs whose source is gone.
    async fn handle_source_removed(&mut self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "source file removed");
        self.clean_stale_outputs().await;
        Ok(())
    }

    /// Restart the development server, when this session runs one.
    async fn restart_server(&self) -> Result<()> {
        let Some(config) = &self.server_config else {
            return Ok(());
        };
        let config = config.clone();
        let session = Arc::clone(&self.session);
        self.session
            .server
            .restart(move || start_ui_server(config, session))
            .await
    }

    /// Whether an unchanged entry needs its output regenerated.
    fn wants_heal(&self, entry: Option<&str>, target: BuildTarget) -> bool {
        let Some(entry) = entry else {
            return false;
        };
        if !self.runner.options().resolve(entry).exists() {
            return false;
        }
        !self
            .runner
            .options()
            .output_file(target.artifact())
            .exists()
    }

    fn is_entry(&self, entry: Option<&str>, path: &Path) -> bool {
        entry.is_some_and(|entry| self.runner.options().matches_entry(path, entry))
    }

    /// Close watches and delete outputs for entries whose source file no
    /// longer exists on disk.
    async fn clean_stale_outputs(&self) {
        if let Some(entry) = self.state.previous_main.as_deref() {
            if !self.runner.options().resolve(entry).exists() {
                debug!(entry = %entry, "main source gone, cleaning output");
                self.session.main_watch.close().await;
                self.remove_artifact(BuildTarget::Main).await;
            }
        }
        if let Some(entry) = self.state.previous_ui.as_deref() {
            if !self.runner.options().resolve(entry).exists() {
                debug!(entry = %entry, "ui source gone, cleaning output");
                self.session.ui_watch.close().await;
                self.remove_artifact(BuildTarget::Ui).await;
            }
        }
    }

    /// Best-effort artifact removal. A missing file is not an error.
    async fn remove_artifact(&self, target: BuildTarget) {
        let path = self.runner.options().output_file(target.artifact());
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "removed artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "could not remove artifact: {e}"),
        }
    }

    fn report(&self, target: BuildTarget, duration: Option<std::time::Duration>) {
        if let Some(duration) = duration {
            crate::ui::info(&format!(
                "Rebuilt {} in {}",
                target.artifact(),
                format_duration(duration)
            ));
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "rebuild phase");
            self.phase = phase;
        }
    }
}
