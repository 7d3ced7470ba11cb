//! Build command implementation.
//!
//! Runs the pipeline once (manifest → main script → UI document) and
//! prints a summary of the written artifacts. With `--watch`, the file
//! watchers and the rebuild orchestrator stay alive afterwards; bundler
//! watch processes own their targets, but no servers are started.

use crate::cli::BuildArgs;
use crate::commands::{pipeline, utils};
use crate::config::CommandMode;
use crate::dev::watcher::DEFAULT_DEBOUNCE_MS;
use crate::dev::{Orchestrator, SessionWatcher};
use crate::error::Result;
use crate::ui;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

/// Execute the build command.
///
/// # Errors
///
/// Returns errors for invalid configuration, a missing or malformed
/// descriptor, and bundler failures. Entries whose source file is
/// missing are skipped, not failed.
pub async fn execute(args: BuildArgs) -> Result<()> {
    let mode = CommandMode::Build { watch: args.watch };
    let (config, options) = utils::load_session(mode, &args.session, false)?;
    ui::info(&format!("Building plugin in {}", options.cwd.display()));

    let setup = pipeline::initial_build(&config, options).await?;
    let options = setup.runner.options().clone();

    let mut entries = Vec::new();
    push_entry(
        &mut entries,
        &options.output_file("manifest.json"),
        Duration::ZERO,
    )
    .await;
    if setup.main.built {
        push_entry(
            &mut entries,
            &setup.main.output_path,
            setup.main.duration.unwrap_or_default(),
        )
        .await;
    }
    if setup.ui.built {
        push_entry(
            &mut entries,
            &setup.ui.output_path,
            setup.ui.duration.unwrap_or_default(),
        )
        .await;
    }
    ui::print_build_summary(&entries);

    if !args.watch {
        setup.session.shutdown().await;
        return Ok(());
    }

    // Watch mode: keep rebuilding, no servers.
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
        Arc::clone(&setup.session),
        setup.runner,
        None,
        setup.manifest,
    );
    let mut rebuilds = tokio::spawn(orchestrator.run(events));

    ui::info("Press Ctrl+C to stop");
    tokio::select! {
        _ = signal::ctrl_c() => {
            ui::info("Shutting down watch build...");
        }
        _ = &mut rebuilds => {
            ui::warning("Rebuild task stopped unexpectedly");
        }
    }

    drop(watcher);
    setup.session.shutdown().await;
    ui::success("Watch build stopped");
    Ok(())
}

/// Record one artifact for the build summary. Files that were skipped
/// or cleaned leave no entry.
async fn push_entry(entries: &mut Vec<(String, u64, Duration)>, path: &Path, duration: Duration) {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return;
    };
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    entries.push((name, metadata.len(), duration));
}
