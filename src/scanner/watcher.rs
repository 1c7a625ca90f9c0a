//! File system watcher for detecting music library changes.
//!
//! Uses the `notify` crate to watch library roots recursively. Creations,
//! renames and removals of files or directories become a [`RescanRequest`]
//! pushed into a single-slot channel owned by the library orchestrator.
//!
//! # Design
//!
//! - **Debounced events**: multiple rapid changes coalesce into one batch
//! - **Coarse**: the watcher never says *what* changed, only that a rescan is due
//! - **Drop when full**: if a request is already pending, new ones are dropped
//! - **Storage excluded**: changes under the catalog/cache directories are ignored
//!
//! # Usage
//!
//! ```rust,ignore
//! let (tx, rx) = crossbeam_channel::bounded(1);
//! let watcher = FileWatcher::new(vec!["/music".into()], vec![], tx)?;
//!
//! while rx.recv().is_ok() {
//!     library.start_load();
//! }
//! ```

use crossbeam_channel::{Sender, TrySendError};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A request for the orchestrator to run a new cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescanRequest;

/// Handle to a running file watcher.
///
/// Dropping this handle will stop the watcher.
pub struct FileWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    running: Arc<AtomicBool>,
}

impl FileWatcher {
    /// Create a new file watcher for the given roots.
    ///
    /// Events under any of `ignored` never produce a request.
    pub fn new(
        watch_paths: Vec<PathBuf>,
        ignored: Vec<PathBuf>,
        requests: Sender<RescanRequest>,
    ) -> Result<Self, WatchError> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let debouncer = new_debouncer(
            Duration::from_millis(500),
            None,
            move |result: DebounceEventResult| {
                if !running_clone.load(Ordering::Relaxed) {
                    return;
                }
                Self::handle_debounced_events(result, &ignored, &requests);
            },
        )
        .map_err(|e| WatchError::Init(e.to_string()))?;

        let mut watcher = Self { debouncer, running };

        for path in watch_paths {
            watcher.watch(&path)?;
        }

        Ok(watcher)
    }

    /// Add a directory to watch.
    pub fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        tracing::info!(target: "library::watcher", path = %path.display(), "Watching directory");
        self.debouncer
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| WatchError::Watch(e.to_string()))
    }

    fn handle_debounced_events(
        result: DebounceEventResult,
        ignored: &[PathBuf],
        requests: &Sender<RescanRequest>,
    ) {
        match result {
            Ok(events) => {
                let relevant = events.iter().find_map(|event| {
                    if !is_library_change(&event.kind) {
                        return None;
                    }
                    event.paths.iter().find(|p| !is_ignored(p, ignored))
                });

                if let Some(path) = relevant {
                    tracing::debug!(target: "library::watcher", path = %path.display(), "Library changed");
                    request_rescan(requests);
                }
            }
            Err(errors) => {
                for error in errors {
                    tracing::warn!(target: "library::watcher", error = %error, "Watch error");
                }
            }
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        tracing::debug!(target: "library::watcher", "File watcher stopped");
    }
}

/// Push a request into the slot; a full slot means one is already pending.
pub(crate) fn request_rescan(requests: &Sender<RescanRequest>) -> bool {
    match requests.try_send(RescanRequest) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::debug!(target: "library::watcher", "Rescan already pending, dropping request");
            false
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Creation, rename and removal count as library changes; content edits do not.
fn is_library_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}

fn is_ignored(path: &Path, ignored: &[PathBuf]) -> bool {
    ignored.iter().any(|dir| path.starts_with(dir))
}

/// Errors that can occur during file watching.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {0}")]
    Init(String),
    #[error("Failed to watch path: {0}")]
    Watch(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_library_change_kinds() {
        assert!(is_library_change(&EventKind::Create(CreateKind::File)));
        assert!(is_library_change(&EventKind::Create(CreateKind::Folder)));
        assert!(is_library_change(&EventKind::Remove(RemoveKind::File)));
        assert!(is_library_change(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))));
        assert!(!is_library_change(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
    }

    #[test]
    fn test_ignored_paths() {
        let ignored = vec![PathBuf::from("/music/.cache")];
        assert!(is_ignored(Path::new("/music/.cache/covers/ab.png"), &ignored));
        assert!(!is_ignored(Path::new("/music/album/01.flac"), &ignored));
    }

    #[test]
    fn test_single_slot_drops_when_full() {
        let (tx, rx) = bounded(1);
        assert!(request_rescan(&tx));
        assert!(!request_rescan(&tx));
        assert_eq!(rx.try_recv(), Ok(RescanRequest));
        assert!(rx.try_recv().is_err());
        assert!(request_rescan(&tx));
    }

    #[test]
    fn test_watcher_creation() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = bounded(1);
        let watcher = FileWatcher::new(vec![dir.path().to_path_buf()], vec![], tx).unwrap();
        drop(watcher); // Should not panic
    }

    #[test]
    fn test_watch_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = bounded(1);
        let result = FileWatcher::new(vec![dir.path().join("missing")], vec![], tx);
        assert!(matches!(result, Err(WatchError::Watch(_))));
    }

    #[test]
    fn test_watcher_detects_new_file() {
        let dir = tempdir().unwrap();
        let (tx, rx) = bounded(1);
        let watcher = FileWatcher::new(vec![dir.path().to_path_buf()], vec![], tx).unwrap();

        let file_path = dir.path().join("new_song.mp3");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"fake mp3 content").unwrap();
        file.sync_all().unwrap();

        let request = rx.recv_timeout(Duration::from_secs(2));

        drop(watcher);

        // Some filesystems deliver late or not at all within the timeout,
        // so only check the payload when a request did arrive.
        if let Ok(request) = request {
            assert_eq!(request, RescanRequest);
        }
    }
}
