//! Shared session state.
//!
//! One [`Session`] value is created per command invocation and passed to
//! every component; there are no module-level singletons. Long-lived
//! handles (the development server, per-target bundler watches) live in
//! [`HandleSlot`]s that enforce close-before-replace, so at most one live
//! handle exists per slot at any time.

use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::debug;

/// A handle that can be shut down.
///
/// Closing is infallible by design: implementations log failures and
/// return, so a stuck handle can never wedge a restart.
#[async_trait]
pub trait Closeable: Send {
    /// Shut the handle down, consuming it.
    async fn close(self);
}

/// A slot holding at most one live handle.
///
/// The slot lock is held across the close of the previous handle and the
/// creation of its replacement, so two restarts cannot interleave. When
/// creation fails the slot is left empty and a later attempt starts clean.
pub struct HandleSlot<T: Closeable> {
    name: &'static str,
    inner: Mutex<Option<T>>,
    starts: AtomicUsize,
    replaced: AtomicUsize,
}

impl<T: Closeable> HandleSlot<T> {
    /// Create an empty slot. `name` shows up in log lines.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(None),
            starts: AtomicUsize::new(0),
            replaced: AtomicUsize::new(0),
        }
    }

    /// Close the current handle, then install the one `start` produces.
    ///
    /// The previous handle is closed before `start` runs. If `start`
    /// fails the slot stays empty and the error is returned.
    pub async fn restart<F, Fut>(&self, start: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut slot = self.inner.lock().await;
        if let Some(previous) = slot.take() {
            self.replaced.fetch_add(1, Ordering::Relaxed);
            debug!(slot = self.name, "closing previous handle");
            previous.close().await;
        }
        let handle = start().await?;
        self.starts.fetch_add(1, Ordering::Relaxed);
        *slot = Some(handle);
        Ok(())
    }

    /// Close the current handle, if any. Idempotent.
    pub async fn close(&self) {
        let mut slot = self.inner.lock().await;
        if let Some(handle) = slot.take() {
            debug!(slot = self.name, "closing handle");
            handle.close().await;
        }
    }

    /// Whether a handle is currently installed.
    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// How many handles have been installed over the session.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::Relaxed)
    }

    /// How many restarts had to close a previous handle first.
    pub fn replace_count(&self) -> usize {
        self.replaced.load(Ordering::Relaxed)
    }
}

/// State shared by every component of one command invocation.
pub struct Session {
    busy: watch::Sender<bool>,
    ui_changes: broadcast::Sender<PathBuf>,
    /// Development server slot. The lifecycle path is its sole writer.
    pub server: HandleSlot<crate::dev::server::UiServerHandle>,
    /// Main-target bundler watch. The orchestrator is its sole writer.
    pub main_watch: HandleSlot<crate::bundler::BundleWatch>,
    /// UI-target bundler watch. The orchestrator is its sole writer.
    pub ui_watch: HandleSlot<crate::bundler::BundleWatch>,
}

impl Session {
    /// Create session state for one command invocation.
    pub fn new() -> Arc<Self> {
        let (busy, _) = watch::channel(false);
        let (ui_changes, _) = broadcast::channel(64);
        Arc::new(Self {
            busy,
            ui_changes,
            server: HandleSlot::new("dev server"),
            main_watch: HandleSlot::new("main watch"),
            ui_watch: HandleSlot::new("ui watch"),
        })
    }

    /// Mark a rebuild as in-progress or finished.
    ///
    /// The development server buffers reload notifications while the flag
    /// is set and flushes them when it clears.
    pub fn set_busy(&self, busy: bool) {
        self.busy.send_replace(busy);
    }

    /// Whether a rebuild handler is currently running.
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    /// Subscribe to busy-flag transitions.
    pub fn busy_flag(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    /// Announce that served UI content changed on disk.
    pub fn notify_ui_change(&self, path: PathBuf) {
        // No receivers just means no server is up; nothing to do.
        let _ = self.ui_changes.send(path);
    }

    /// Subscribe to UI change announcements.
    pub fn subscribe_ui_changes(&self) -> broadcast::Receiver<PathBuf> {
        self.ui_changes.subscribe()
    }

    /// Close every live handle. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.server.close().await;
        self.ui_watch.close().await;
        self.main_watch.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;

    struct TestHandle {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Closeable for TestHandle {
        async fn close(self) {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn handle(closed: &Arc<AtomicUsize>) -> TestHandle {
        TestHandle {
            closed: Arc::clone(closed),
        }
    }

    #[tokio::test]
    async fn test_restart_installs_a_handle() {
        let closed = Arc::new(AtomicUsize::new(0));
        let slot = HandleSlot::new("test");

        slot.restart(|| async { Ok(handle(&closed)) }).await.unwrap();

        assert!(slot.is_running().await);
        assert_eq!(slot.start_count(), 1);
        assert_eq!(slot.replace_count(), 0);
        assert_eq!(closed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_restart_closes_previous_handle_first() {
        let closed = Arc::new(AtomicUsize::new(0));
        let slot = HandleSlot::new("test");

        slot.restart(|| async { Ok(handle(&closed)) }).await.unwrap();
        slot.restart(|| async {
            // The previous handle is gone before the new one is made.
            assert_eq!(closed.load(Ordering::Relaxed), 1);
            Ok(handle(&closed))
        })
        .await
        .unwrap();

        assert_eq!(slot.start_count(), 2);
        assert_eq!(slot.replace_count(), 1);
        assert!(slot.is_running().await);
    }

    #[tokio::test]
    async fn test_failed_start_leaves_slot_empty() {
        let closed = Arc::new(AtomicUsize::new(0));
        let slot = HandleSlot::new("test");

        slot.restart(|| async { Ok(handle(&closed)) }).await.unwrap();
        let result = slot
            .restart(|| async { Err::<TestHandle, _>(CliError::Custom("refused".into())) })
            .await;

        assert!(result.is_err());
        // The old handle was still closed, and nothing replaced it.
        assert_eq!(closed.load(Ordering::Relaxed), 1);
        assert!(!slot.is_running().await);

        // A later attempt starts clean.
        slot.restart(|| async { Ok(handle(&closed)) }).await.unwrap();
        assert!(slot.is_running().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let closed = Arc::new(AtomicUsize::new(0));
        let slot = HandleSlot::new("test");

        slot.restart(|| async { Ok(handle(&closed)) }).await.unwrap();
        slot.close().await;
        slot.close().await;

        assert_eq!(closed.load(Ordering::Relaxed), 1);
        assert!(!slot.is_running().await);
    }

    #[tokio::test]
    async fn test_busy_flag_transitions() {
        let session = Session::new();
        let mut flag = session.busy_flag();

        assert!(!session.is_busy());
        session.set_busy(true);
        flag.changed().await.unwrap();
        assert!(*flag.borrow());

        session.set_busy(false);
        flag.changed().await.unwrap();
        assert!(!*flag.borrow());
    }

    #[tokio::test]
    async fn test_ui_change_without_subscribers_is_fine() {
        let session = Session::new();
        session.notify_ui_change(PathBuf::from("/project/src/ui.html"));

        let mut rx = session.subscribe_ui_changes();
        session.notify_ui_change(PathBuf::from("/project/src/ui.html"));
        assert!(rx.recv().await.is_ok());
    }
}
