//! Bundler facade.
//!
//! Plinth does not bundle JavaScript itself. Each build target is handed
//! to an external bundler command through this facade, either as a one-shot
//! build or as a persistent watch process. Projects that need no bundling
//! at all fall back to a verbatim copy of the entry file.
//!
//! The facade also owns [`merge_config`], the deep-merge rule used wherever
//! built-in defaults are combined with user overrides.

mod process;

pub use process::ProcessBundler;

use crate::dev::session::Closeable;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tokio::process::Child;
use tracing::{debug, warn};

/// The two bundled artifacts of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    /// The main-thread script running inside the design tool.
    Main,
    /// The plugin UI document.
    Ui,
}

impl BuildTarget {
    /// Target label used in errors and logs.
    pub fn label(&self) -> &'static str {
        match self {
            BuildTarget::Main => "main",
            BuildTarget::Ui => "ui",
        }
    }

    /// Basename of the artifact this target produces.
    pub fn artifact(&self) -> &'static str {
        match self {
            BuildTarget::Main => "main.js",
            BuildTarget::Ui => "ui.html",
        }
    }
}

/// One bundler invocation.
#[derive(Debug, Clone)]
pub struct BundleTask {
    /// Which artifact is being built.
    pub target: BuildTarget,
    /// Absolute path of the source entry point.
    pub entry: PathBuf,
    /// Absolute path of the artifact the bundler must produce.
    pub outfile: PathBuf,
}

/// External bundler integration.
///
/// Implementations run whatever toolchain the project configured. The
/// session core only depends on this trait, which keeps the watch pipeline
/// testable without spawning real bundler processes.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Run one build to completion.
    async fn build(&self, task: &BundleTask) -> Result<()>;

    /// Start a persistent watch build.
    ///
    /// The returned handle owns the underlying process and must be closed
    /// when the session ends or the target restarts.
    async fn watch(&self, task: &BundleTask) -> Result<BundleWatch>;

    /// Whether `watch` starts a process that rebuilds on its own.
    ///
    /// When this is false the orchestrator re-runs one-shot builds for
    /// the target as its sources change.
    fn watches_externally(&self, target: BuildTarget) -> bool {
        let _ = target;
        false
    }
}

/// A live persistent build.
///
/// Wraps the watch process for one build target. Closing is cooperative:
/// the process is killed and reaped, and failures are logged rather than
/// propagated so a stuck bundler cannot wedge a restart.
#[derive(Debug)]
pub struct BundleWatch {
    label: &'static str,
    child: Option<Child>,
}

impl BundleWatch {
    /// Handle owning a spawned watch process.
    pub fn process(target: BuildTarget, child: Child) -> Self {
        Self {
            label: target.label(),
            child: Some(child),
        }
    }

    /// Handle with no underlying process, for targets that rebuild
    /// in-session instead of delegating to an external watcher.
    pub fn detached(target: BuildTarget) -> Self {
        Self {
            label: target.label(),
            child: None,
        }
    }

    /// Target label this watch was started for.
    pub fn label(&self) -> &'static str {
        self.label
    }
}

#[async_trait]
impl Closeable for BundleWatch {
    async fn close(mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(error) = child.start_kill() {
            debug!(target = self.label, %error, "watch process already gone");
        }
        match child.wait().await {
            Ok(status) => debug!(target = self.label, %status, "watch process stopped"),
            Err(error) => warn!(target = self.label, %error, "failed to reap watch process"),
        }
    }
}

/// Deep-merge `overrides` into `base`.
///
/// Objects merge key by key, recursively. Anything else in the overrides,
/// including arrays and explicit nulls, replaces the base value outright.
pub fn merge_config(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            let mut merged = base.clone();
            for (key, value) in overrides {
                match merged.entry(key.clone()) {
                    serde_json::map::Entry::Occupied(mut slot) => {
                        let next = merge_config(slot.get(), value);
                        slot.insert(next);
                    }
                    serde_json::map::Entry::Vacant(slot) => {
                        slot.insert(value.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        (_, other) => other.clone(),
    }
}
