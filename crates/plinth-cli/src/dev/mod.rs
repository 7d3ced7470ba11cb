//! Interactive session plumbing.
//!
//! Everything a `plinth dev`/`plinth preview` session keeps alive lives
//! here:
//! - Session state with close-before-replace handle slots
//! - File watchers feeding one merged event channel
//! - The rebuild orchestrator consuming that channel
//! - Build-target executors for the main script and the UI document
//! - The development server with reload-over-SSE

pub mod bridge;
pub mod executors;
pub mod orchestrator;
pub mod server;
pub mod session;
pub mod watcher;

// Re-exports
pub use executors::{BuildOutcome, TargetRunner};
pub use orchestrator::Orchestrator;
pub use server::{start_ui_server, UiServerConfig, UiServerHandle};
pub use session::{Closeable, HandleSlot, Session};
pub use watcher::{SessionEvent, SessionWatcher};

use serde::{Deserialize, Serialize};

/// Events pushed to connected browsers over the reload channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DevEvent {
    /// Full page reload after a rebuild
    Reload,

    /// Client connected
    ClientConnected { id: usize },
}
