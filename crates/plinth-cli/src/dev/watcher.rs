//! File system watchers for interactive sessions.
//!
//! Two watchers feed one merged channel: a descriptor watcher for
//! `manifest.json`/`package.json` at the project root, and a recursive
//! source watcher for everything else. Merging into a single channel gives
//! the orchestrator strict arrival-order handling across both, so a
//! descriptor rebuild can never interleave with a source-add handler.

use crate::error::{CliError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Debounce window for file system events.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Files that carry the plugin descriptor.
const DESCRIPTOR_FILES: &[&str] = &["manifest.json", "package.json"];

/// Directories never worth watching.
const IGNORED_DIRS: &[&str] = &["node_modules", "target"];

/// A change observed by one of the session watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// `manifest.json` or `package.json` changed in any way
    Manifest(PathBuf),
    /// A new file appeared under the project root
    SourceAdded(PathBuf),
    /// An existing source file changed
    SourceChanged(PathBuf),
    /// A source file disappeared
    SourceRemoved(PathBuf),
}

impl SessionEvent {
    /// Get the path affected by this event.
    pub fn path(&self) -> &Path {
        match self {
            SessionEvent::Manifest(p)
            | SessionEvent::SourceAdded(p)
            | SessionEvent::SourceChanged(p)
            | SessionEvent::SourceRemoved(p) => p,
        }
    }
}

/// The pair of watchers backing one session.
///
/// Dropping this stops both watchers and closes the event channel.
pub struct SessionWatcher {
    /// Non-recursive watcher on the project root for descriptor files
    _descriptor: RecommendedWatcher,
    /// Recursive watcher over the source tree
    _source: RecommendedWatcher,
    /// Root directory being watched
    root: PathBuf,
}

impl SessionWatcher {
    /// Start watching the project at `root`.
    ///
    /// `output` is the artifact directory, which is excluded so the
    /// session's own writes never feed back into the pipeline.
    ///
    /// # Returns
    ///
    /// Tuple of (SessionWatcher, receiver for merged events)
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing or a watcher cannot be
    /// registered.
    pub fn new(
        root: PathBuf,
        output: PathBuf,
        debounce_ms: u64,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        if !root.exists() {
            return Err(CliError::FileNotFound(root));
        }

        let (tx, rx) = mpsc::channel(100);
        let debounce = Duration::from_millis(debounce_ms);

        let descriptor = Self::descriptor_watcher(&root, tx.clone(), debounce)?;
        let source = Self::source_watcher(&root, &output, tx, debounce)?;

        Ok((
            Self {
                _descriptor: descriptor,
                _source: source,
                root,
            },
            rx,
        ))
    }

    /// Get the root directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn descriptor_watcher(
        root: &Path,
        tx: mpsc::Sender<SessionEvent>,
        debounce: Duration,
    ) -> Result<RecommendedWatcher> {
        let mut last_event: Option<(PathBuf, Instant)> = None;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                for path in &event.paths {
                    if !is_descriptor(path) {
                        continue;
                    }
                    if debounced(&mut last_event, path, debounce) {
                        continue;
                    }
                    let _ = tx.blocking_send(SessionEvent::Manifest(path.clone()));
                }
            }
        })
        .map_err(CliError::Watch)?;

        // Descriptor files live at the root, so one shallow watch suffices.
        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .map_err(CliError::Watch)?;
        Ok(watcher)
    }

    fn source_watcher(
        root: &Path,
        output: &Path,
        tx: mpsc::Sender<SessionEvent>,
        debounce: Duration,
    ) -> Result<RecommendedWatcher> {
        let mut last_event: Option<(PathBuf, Instant)> = None;
        let root_clone = root.to_path_buf();
        let output_clone = output.to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                for path in &event.paths {
                    if should_ignore(path, &root_clone, &output_clone) {
                        continue;
                    }
                    if debounced(&mut last_event, path, debounce) {
                        continue;
                    }

                    let change = match event.kind {
                        EventKind::Create(_) => SessionEvent::SourceAdded(path.clone()),
                        EventKind::Modify(_) => SessionEvent::SourceChanged(path.clone()),
                        EventKind::Remove(_) => SessionEvent::SourceRemoved(path.clone()),
                        _ => continue,
                    };
                    let _ = tx.blocking_send(change);
                }
            }
        })
        .map_err(CliError::Watch)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(CliError::Watch)?;
        Ok(watcher)
    }
}

/// Debounce: true when the same file already fired within the window.
fn debounced(
    last_event: &mut Option<(PathBuf, Instant)>,
    path: &Path,
    window: Duration,
) -> bool {
    let now = Instant::now();
    if let Some((last_path, last_time)) = last_event {
        if last_path == path && now.duration_since(*last_time) < window {
            return true;
        }
    }
    *last_event = Some((path.to_path_buf(), now));
    false
}

/// Whether `path` is one of the descriptor files.
fn is_descriptor(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| DESCRIPTOR_FILES.contains(&name))
}

/// Check if a source path should be ignored.
///
/// Ignores anything outside the root, the output directory, descriptor
/// files (the descriptor watcher owns those), well-known dependency
/// directories, and hidden files. Also used when seeding the set of
/// already-known source files at session start.
pub(crate) fn should_ignore(path: &Path, root: &Path, output: &Path) -> bool {
    if !path.starts_with(root) {
        return true;
    }
    if path.starts_with(output) {
        return true;
    }
    if is_descriptor(path) {
        return true;
    }

    let rel_path = match path.strip_prefix(root) {
        Ok(p) => p,
        Err(_) => return true,
    };

    for component in rel_path.components() {
        if let Some(name) = component.as_os_str().to_str() {
            if IGNORED_DIRS.contains(&name) {
                return true;
            }
            if name.starts_with('.') && name != "." && name != ".." {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_descriptor() {
        assert!(is_descriptor(Path::new("/project/manifest.json")));
        assert!(is_descriptor(Path::new("/project/package.json")));
        assert!(!is_descriptor(Path::new("/project/src/ui.html")));
        assert!(!is_descriptor(Path::new("/project/plinth.config.json")));
    }

    #[test]
    fn test_should_ignore_output_dir() {
        let root = Path::new("/project");
        let output = Path::new("/project/dist");
        assert!(should_ignore(
            Path::new("/project/dist/main.js"),
            root,
            output
        ));
        assert!(!should_ignore(
            Path::new("/project/src/main.ts"),
            root,
            output
        ));
    }

    #[test]
    fn test_should_ignore_node_modules() {
        let root = Path::new("/project");
        let output = Path::new("/project/dist");
        assert!(should_ignore(
            Path::new("/project/node_modules/pkg/index.js"),
            root,
            output
        ));
    }

    #[test]
    fn test_should_ignore_hidden_files() {
        let root = Path::new("/project");
        let output = Path::new("/project/dist");
        assert!(should_ignore(Path::new("/project/.git/config"), root, output));
        assert!(should_ignore(
            Path::new("/project/src/.cache/file.js"),
            root,
            output
        ));
    }

    #[test]
    fn test_should_ignore_descriptors_in_source_watcher() {
        let root = Path::new("/project");
        let output = Path::new("/project/dist");
        assert!(should_ignore(
            Path::new("/project/manifest.json"),
            root,
            output
        ));
    }

    #[test]
    fn test_should_ignore_outside_root() {
        let root = Path::new("/project");
        let output = Path::new("/project/dist");
        assert!(should_ignore(Path::new("/other/file.js"), root, output));
    }

    #[test]
    fn test_debounce_same_path_within_window() {
        let mut last = None;
        let path = Path::new("/project/src/main.ts");
        let window = Duration::from_millis(500);

        assert!(!debounced(&mut last, path, window));
        assert!(debounced(&mut last, path, window));
        // A different file is not debounced away.
        assert!(!debounced(&mut last, Path::new("/project/src/ui.html"), window));
    }

    #[test]
    fn test_session_event_path() {
        let path = PathBuf::from("/project/src/main.ts");
        assert_eq!(SessionEvent::Manifest(path.clone()).path(), path.as_path());
        assert_eq!(
            SessionEvent::SourceAdded(path.clone()).path(),
            path.as_path()
        );
        assert_eq!(
            SessionEvent::SourceRemoved(path.clone()).path(),
            path.as_path()
        );
    }
}
