//! Library orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Consumer (UI / CLI)                         │
//! │      calls start_load(), receives LibraryEvent snapshots        │
//! └──────────────▲──────────────────────────────┬───────────────────┘
//!                │ mpsc (ordered events)        │ start_load()
//! ┌──────────────┴──────────────────────────────▼───────────────────┐
//! │                     Cycle task (tokio)                          │
//! │  catalog load → scan → diff → extract → group → playlists       │
//! └──────────────▲──────────────────────────────────────────────────┘
//!                │ single-slot channel (drop when full)
//! ┌──────────────┴──────────────────────────────────────────────────┐
//! │                 File watcher (armed after first Complete)       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! At most one cycle runs at a time. A start request while a cycle is
//! running is dropped, never queued. Published snapshots are immutable
//! `Arc`s and are only sent when they differ from the last ones sent.

pub mod album;
pub mod diff;

pub use album::{group_by_year, group_into_albums};
pub use diff::{LibraryDiff, diff};

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::LibrarySettings;
use crate::cover::CoverCache;
use crate::db::CatalogStore;
use crate::error::{Error, Result};
use crate::model::{AlbumGroup, AlbumRecord, FileRecord, FileStamp, PlaylistRecord};
use crate::scanner::{self, FileWatcher};
use crate::{metadata, playlist};

/// Lifecycle state of the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LibraryState {
    /// No cycle has run yet
    #[default]
    Idle,
    /// Loading with an empty catalog
    FirstLoading,
    /// Loading with a catalog from an earlier run
    NonFirstLoading,
    /// Stored snapshot published, scanning the disk
    InitComplete,
    /// The last cycle finished
    Complete,
    /// No configured root could be read before any cycle completed; terminal
    NoLibraryAccess,
    /// The last cycle hit a persistence error; a new cycle may be started
    Failed,
}

impl LibraryState {
    /// Whether a new cycle may start from this state.
    pub fn accepts_start(self) -> bool {
        matches!(self, Self::Idle | Self::Complete | Self::Failed)
    }
}

/// Notification sent to the consumer.
#[derive(Debug, Clone)]
pub enum LibraryEvent {
    StateChanged(LibraryState),
    AlbumGroupsChanged(Arc<Vec<AlbumGroup>>),
    PlaylistsChanged(Arc<Vec<PlaylistRecord>>),
    /// A cycle failed; carries the error text
    CycleFailed(String),
}

/// How a cycle ended without an error.
enum CycleOutcome {
    Complete,
    NoAccess,
}

/// Last snapshots sent to the consumer.
#[derive(Default)]
struct Published {
    albums: Option<Arc<Vec<AlbumGroup>>>,
    playlists: Option<Arc<Vec<PlaylistRecord>>>,
}

struct Inner {
    settings: LibrarySettings,
    covers: Arc<CoverCache>,
    events: mpsc::UnboundedSender<LibraryEvent>,
    /// Single-flight guard
    busy: AtomicBool,
    /// Set once a cycle reaches `Complete`
    completed_once: AtomicBool,
    state: Mutex<LibraryState>,
    published: Mutex<Published>,
    watcher: Mutex<Option<FileWatcher>>,
    runtime: Handle,
}

/// Handle to the library orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct Library {
    inner: Arc<Inner>,
}

impl Library {
    /// Create an orchestrator and the receiver for its events.
    ///
    /// Must be called from within a tokio runtime; cycles are spawned on it.
    pub fn new(settings: LibrarySettings) -> Result<(Self, mpsc::UnboundedReceiver<LibraryEvent>)> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("library requires a tokio runtime: {e}")))?;
        let (events, receiver) = mpsc::unbounded_channel();
        let covers = Arc::new(CoverCache::new(
            settings.cover_dir.clone(),
            settings.cover_max_dimension,
        ));

        let inner = Inner {
            settings,
            covers,
            events,
            busy: AtomicBool::new(false),
            completed_once: AtomicBool::new(false),
            state: Mutex::new(LibraryState::Idle),
            published: Mutex::new(Published::default()),
            watcher: Mutex::new(None),
            runtime,
        };
        Ok((Self { inner: Arc::new(inner) }, receiver))
    }

    /// Start a cycle unless one is running or the library is inaccessible.
    ///
    /// Returns the cycle's task handle, or `None` if the request was dropped.
    pub fn start_load(&self) -> Option<JoinHandle<()>> {
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(target: "library", "Cycle already running, dropping start request");
            return None;
        }

        let state = self.state();
        if !state.accepts_start() {
            tracing::debug!(target: "library", ?state, "Start request rejected");
            self.inner.busy.store(false, Ordering::Release);
            return None;
        }

        let inner = Arc::clone(&self.inner);
        Some(self.inner.runtime.spawn(async move { inner.run().await }))
    }

    pub fn state(&self) -> LibraryState {
        *self.inner.state.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    pub fn is_watching(&self) -> bool {
        self.inner.watcher.lock().is_some()
    }

    pub fn settings(&self) -> &LibrarySettings {
        &self.inner.settings
    }

    pub fn covers(&self) -> &CoverCache {
        &self.inner.covers
    }

    /// Last album groups sent to the consumer.
    pub fn album_groups(&self) -> Option<Arc<Vec<AlbumGroup>>> {
        self.inner.published.lock().albums.clone()
    }

    /// Last playlists sent to the consumer.
    pub fn playlists(&self) -> Option<Arc<Vec<PlaylistRecord>>> {
        self.inner.published.lock().playlists.clone()
    }

    /// Albums featuring an artist, grouped by year, plus their tracks in album order.
    pub async fn artist_albums(&self, name: &str) -> Result<(Vec<AlbumGroup>, Vec<FileRecord>)> {
        artist_albums(&self.inner.settings.database_path, name).await
    }

    pub async fn album_for_track(&self, track: &Path) -> Result<Option<AlbumRecord>> {
        album_for_track(&self.inner.settings.database_path, track).await
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        let completed = match self.run_cycle().await {
            Ok(CycleOutcome::Complete) => {
                self.completed_once.store(true, Ordering::Release);
                self.set_state(LibraryState::Complete);
                true
            }
            // Roots went offline after a good cycle: keep the catalog and wait for the next trigger
            Ok(CycleOutcome::NoAccess) if self.completed_once.load(Ordering::Acquire) => {
                tracing::warn!(target: "library", "Library roots offline, keeping the stored catalog");
                self.set_state(LibraryState::Complete);
                true
            }
            Ok(CycleOutcome::NoAccess) => {
                tracing::warn!(target: "library", "No library root is accessible");
                self.set_state(LibraryState::NoLibraryAccess);
                false
            }
            Err(e) => {
                tracing::error!(target: "library", error = %e, "Library cycle failed");
                self.set_state(LibraryState::Failed);
                self.emit(LibraryEvent::CycleFailed(e.to_string()));
                false
            }
        };

        if completed {
            self.arm_watcher();
        }
        self.busy.store(false, Ordering::Release);
    }

    async fn run_cycle(&self) -> Result<CycleOutcome> {
        let settings = &self.settings;
        tracing::info!(target: "library", roots = settings.roots.len(), "Starting library cycle");

        let roots = settings.roots.clone();
        let any_accessible =
            tokio::task::spawn_blocking(move || roots.iter().any(|r| scanner::root_accessible(r))).await?;
        if !any_accessible {
            return Ok(CycleOutcome::NoAccess);
        }

        // Stored snapshot first, so consumers have something to show while scanning
        let store = CatalogStore::open(&settings.database_path).await?;
        let first_load = store.is_empty().await?;
        self.set_state(if first_load {
            LibraryState::FirstLoading
        } else {
            LibraryState::NonFirstLoading
        });

        let prior = store.load_all().await?;
        let stored_albums = store.load_albums().await?;
        let stored_playlists = store.load_all_playlists().await?;
        let stored_covers: Vec<PathBuf> = stored_albums
            .iter()
            .filter_map(|album| album.cover.as_ref())
            .map(|cover| cover.path.clone())
            .collect();
        self.set_state(LibraryState::InitComplete);
        self.publish_albums(group_by_year(stored_albums));
        self.publish_playlists(stored_playlists.clone());

        let roots = settings.roots.clone();
        let playlist_roots = settings.playlist_roots();
        let extension = settings.playlist_extension.clone();
        let (snapshot, playlist_files, covers_missing) = tokio::task::spawn_blocking(move || {
            (
                scanner::scan_roots(&roots),
                scanner::scan_playlist_files(&playlist_roots, &extension),
                stored_covers.iter().any(|path| !path.is_file()),
            )
        })
        .await?;

        if !snapshot.has_access() {
            store.close().await;
            return Ok(CycleOutcome::NoAccess);
        }
        for root in &snapshot.inaccessible_roots {
            tracing::warn!(target: "library", root = %root.display(), "Library root not accessible, skipping");
        }

        let prior_stamps: Vec<FileStamp> = prior.iter().map(FileRecord::stamp).collect();
        let changes = diff(&snapshot.files, &prior_stamps);
        tracing::info!(
            target: "library",
            added_or_updated = changes.added_or_updated.len(),
            removed = changes.removed.len(),
            unchanged = changes.unchanged,
            "Diffed library"
        );

        // A previous cycle may have stopped between the file writes and the regroup
        let mut dirty = store.albums_stale().await?;
        if dirty {
            tracing::info!(target: "library", "Album table is behind the file records, regrouping");
        }
        if covers_missing {
            tracing::info!(target: "library::cover", "Stored covers missing from the cache, regrouping");
            dirty = true;
        }
        if !changes.removed.is_empty() {
            store.remove(&changes.removed).await?;
            dirty = true;
        }
        if !changes.added_or_updated.is_empty() {
            let stamps = changes.added_or_updated;
            let records = tokio::task::spawn_blocking(move || metadata::extract_batch(&stamps)).await?;
            if !records.is_empty() {
                store.upsert(&records).await?;
                dirty = true;
            }
        }

        let mut current = prior;
        if dirty {
            let covers = Arc::clone(&self.covers);
            let files = store.load_all().await?;
            let albums = tokio::task::spawn_blocking(move || group_into_albums(files, &covers)).await?;
            store.replace_albums(&albums).await?;
            // Grouped tracks carry the artwork state just persisted
            current = albums.iter().flat_map(|a| a.tracks.iter().cloned()).collect();
            self.publish_albums(group_by_year(albums));
        }

        if playlist::has_update(&stored_playlists, &playlist_files.files) {
            let stamps = playlist_files.files;
            let catalog = current;
            let playlists =
                tokio::task::spawn_blocking(move || playlist::scan_playlists(&stamps, &catalog)).await?;
            store.replace_playlists(&playlists).await?;
            tracing::info!(target: "library::playlist", count = playlists.len(), "Parsed playlists");
            self.publish_playlists(playlists);
        } else if dirty {
            // Stored playlists skip tracks that are no longer in the catalog
            self.publish_playlists(store.load_all_playlists().await?);
        }

        store.close().await;
        Ok(CycleOutcome::Complete)
    }

    fn set_state(&self, state: LibraryState) {
        *self.state.lock() = state;
        tracing::debug!(target: "library", ?state, "State changed");
        self.emit(LibraryEvent::StateChanged(state));
    }

    fn publish_albums(&self, groups: Vec<AlbumGroup>) {
        let snapshot = {
            let mut published = self.published.lock();
            if published.albums.as_deref() == Some(&groups) {
                return;
            }
            let snapshot = Arc::new(groups);
            published.albums = Some(Arc::clone(&snapshot));
            snapshot
        };
        tracing::debug!(target: "library", groups = snapshot.len(), "Publishing album groups");
        self.emit(LibraryEvent::AlbumGroupsChanged(snapshot));
    }

    fn publish_playlists(&self, playlists: Vec<PlaylistRecord>) {
        let snapshot = {
            let mut published = self.published.lock();
            if published.playlists.as_deref() == Some(&playlists) {
                return;
            }
            let snapshot = Arc::new(playlists);
            published.playlists = Some(Arc::clone(&snapshot));
            snapshot
        };
        tracing::debug!(target: "library", playlists = snapshot.len(), "Publishing playlists");
        self.emit(LibraryEvent::PlaylistsChanged(snapshot));
    }

    fn emit(&self, event: LibraryEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!(target: "library", "Event receiver dropped");
        }
    }

    /// Watch the accessible roots; each change requests a new cycle.
    fn arm_watcher(self: &Arc<Self>) {
        if !self.settings.watch_for_changes {
            return;
        }
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return;
        }

        let roots: Vec<_> = self
            .settings
            .roots
            .iter()
            .filter(|root| scanner::root_accessible(root))
            .cloned()
            .collect();
        let (tx, rx) = bounded(1);
        let watcher = match FileWatcher::new(roots, self.settings.storage_dirs(), tx) {
            Ok(watcher) => watcher,
            Err(e) => {
                tracing::warn!(target: "library::watcher", error = %e, "Failed to start file watcher");
                return;
            }
        };

        let weak: Weak<Inner> = Arc::downgrade(self);
        let spawned = std::thread::Builder::new()
            .name("library-watch".into())
            .spawn(move || {
                // Ends when the watcher (and with it the sender) is dropped
                while rx.recv().is_ok() {
                    let Some(inner) = weak.upgrade() else { break };
                    Library { inner }.start_load();
                }
                tracing::debug!(target: "library::watcher", "Watch loop ended");
            });

        match spawned {
            Ok(_) => *slot = Some(watcher),
            Err(e) => tracing::error!(target: "library::watcher", error = %e, "Failed to spawn watch thread"),
        }
    }
}

// ============================================================================
// Read-only queries
// ============================================================================

/// Albums featuring an artist, grouped by year, plus their tracks in album order.
///
/// Opens its own read-only handle, so it can run while a cycle is writing.
pub async fn artist_albums(database_path: &Path, name: &str) -> Result<(Vec<AlbumGroup>, Vec<FileRecord>)> {
    if !database_path.exists() {
        return Ok((Vec::new(), Vec::new()));
    }
    let store = CatalogStore::open_read_only(database_path).await?;
    let albums = store.query_by_artist(name).await;
    store.close().await;

    let groups = group_by_year(albums?);
    let tracks = groups
        .iter()
        .flat_map(|group| group.albums.iter())
        .flat_map(|album| album.tracks.iter().cloned())
        .collect();
    Ok((groups, tracks))
}

/// The album containing a track, from a read-only handle.
pub async fn album_for_track(database_path: &Path, track: &Path) -> Result<Option<AlbumRecord>> {
    if !database_path.exists() {
        return Ok(None);
    }
    let store = CatalogStore::open_read_only(database_path).await?;
    let album = store.album_for_track(track).await;
    store.close().await;
    album
}

/// Every stored album, grouped by year.
pub async fn stored_album_groups(database_path: &Path) -> Result<Vec<AlbumGroup>> {
    if !database_path.exists() {
        return Ok(Vec::new());
    }
    let store = CatalogStore::open_read_only(database_path).await?;
    let albums = store.load_albums().await;
    store.close().await;
    Ok(group_by_year(albums?))
}

/// Every stored playlist.
pub async fn stored_playlists(database_path: &Path) -> Result<Vec<PlaylistRecord>> {
    if !database_path.exists() {
        return Ok(Vec::new());
    }
    let store = CatalogStore::open_read_only(database_path).await?;
    let playlists = store.load_all_playlists().await;
    store.close().await;
    playlists
}
