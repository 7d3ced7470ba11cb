//! Shared session assembly.
//!
//! Every command drives the same fixed pipeline: build the manifest, run
//! the main executor, run the UI executor, then (for interactive
//! commands) bring up the relay and the development server and hand the
//! watch channel to the orchestrator. The pieces live here so `dev`,
//! `preview` and `build --watch` stay thin and cannot diverge in how a
//! session is wired.

use crate::bundler::{BuildTarget, Bundler, ProcessBundler};
use crate::cli::SessionArgs;
use crate::commands::utils;
use crate::config::{CommandMode, PlinthConfig, RuntimeOptions};
use crate::dev::watcher::DEFAULT_DEBOUNCE_MS;
use crate::dev::{
    start_ui_server, BuildOutcome, Orchestrator, Session, SessionWatcher, TargetRunner,
    UiServerConfig,
};
use crate::error::Result;
use crate::manifest::{build_manifest, BuiltManifest};
use crate::pm::PackageManager;
use crate::ui::{self, format_duration};
use plinth_relay::{RelayConfig, RelayServer};
use std::sync::Arc;
use tokio::signal;
use tracing::debug;

/// Everything a command needs after the initial pipeline has run.
pub(crate) struct SessionSetup {
    pub session: Arc<Session>,
    pub runner: TargetRunner,
    pub manifest: BuiltManifest,
    pub main: BuildOutcome,
    pub ui: BuildOutcome,
}

/// Assemble the session and run the initial pipeline once.
///
/// Order is fixed: manifest first (the executors read its raw entries),
/// then the main script, then the UI document.
pub(crate) async fn initial_build(
    config: &PlinthConfig,
    options: RuntimeOptions,
) -> Result<SessionSetup> {
    let session = Session::new();
    let manager = PackageManager::detect(&options.cwd);
    debug!(manager = manager.name(), "package manager detected");
    let bundler: Arc<dyn Bundler> =
        Arc::new(ProcessBundler::from_config(config, manager, &options.cwd));
    let runner = TargetRunner::new(Arc::clone(&session), bundler, options);

    let manifest = build_manifest(runner.options()).await?;
    ui::success(&format!(
        "Manifest written for {}",
        manifest.display_name()
    ));

    let main = runner.run_main(&manifest).await?;
    report(BuildTarget::Main, &main);
    let ui_outcome = runner.run_ui(&manifest).await?;
    report(BuildTarget::Ui, &ui_outcome);

    Ok(SessionSetup {
        session,
        runner,
        manifest,
        main,
        ui: ui_outcome,
    })
}

/// Run a full interactive session until Ctrl+C.
///
/// Pipeline order: manifest → main → UI → relay → development server.
/// Watchers and the orchestrator come up last, so the initial artifacts
/// are in place before any rebuild can fire.
pub(crate) async fn run_interactive(
    mode: CommandMode,
    args: &SessionArgs,
    open: bool,
) -> Result<()> {
    let (config, options) = utils::load_session(mode, args, open)?;
    ui::info(&format!(
        "Starting {} session in {}",
        mode.name(),
        options.cwd.display()
    ));

    let setup = initial_build(&config, options).await?;
    let SessionSetup {
        session,
        runner,
        manifest,
        ..
    } = setup;
    let options = runner.options().clone();

    // Message relay between the plugin sandbox, the preview and tooling.
    let relay = match options.relay_addr {
        Some(addr) => {
            let relay = RelayServer::new(RelayConfig {
                addr,
                ..RelayConfig::default()
            })
            .start()
            .await?;
            ui::info(&format!("Relay listening at {}", relay.url()));
            Some(relay)
        }
        None => None,
    };

    // Development server. The orchestrator reuses this config whenever a
    // UI change forces a restart.
    let server_config = UiServerConfig::merged(
        options
            .server_addr
            .map(|addr| addr.port())
            .unwrap_or(config.port),
        options.output.clone(),
        config.server.as_ref(),
    )?;
    {
        let server_config = server_config.clone();
        let server_session = Arc::clone(&session);
        session
            .server
            .restart(move || start_ui_server(server_config, server_session))
            .await?;
    }

    let (watcher, events) = SessionWatcher::new(
        options.cwd.clone(),
        options.output.clone(),
        DEFAULT_DEBOUNCE_MS,
    )?;
    ui::info(&format!(
        "Watching for changes in {}",
        watcher.root().display()
    ));

    let orchestrator = Orchestrator::new(
        Arc::clone(&session),
        runner,
        Some(server_config),
        manifest,
    );
    let mut rebuilds = tokio::spawn(orchestrator.run(events));

    if options.open {
        if let Some(url) = options.server_url() {
            utils::open_browser(&url);
        }
    }

    ui::info("Press Ctrl+C to stop");
    tokio::select! {
        _ = signal::ctrl_c() => {
            ui::info("Shutting down session...");
        }
        _ = &mut rebuilds => {
            ui::warning("Rebuild task stopped unexpectedly");
        }
    }

    // Dropping the watcher closes the event channel, which ends the
    // orchestrator task on its own.
    drop(watcher);
    session.shutdown().await;
    if let Some(relay) = relay {
        relay.close().await;
    }
    ui::success("Session stopped");
    Ok(())
}

/// One status line per initial executor run.
fn report(target: BuildTarget, outcome: &BuildOutcome) {
    if !outcome.built {
        ui::debug(&format!("Skipped {} (no entry)", target.artifact()));
        return;
    }
    match outcome.duration {
        Some(duration) => ui::success(&format!(
            "Built {} in {}",
            target.artifact(),
            format_duration(duration)
        )),
        None => ui::info(&format!("Watching {}", target.artifact())),
    }
}
