//! Library directory scanning.
//!
//! Walks the configured roots and returns a snapshot of (path, mtime) pairs
//! for supported files. Missing or unreadable roots are skipped and reported
//! back so the orchestrator can tell "empty library" from "no access".

mod watcher;

pub use watcher::{FileWatcher, RescanRequest, WatchError};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::model::FileStamp;

/// Supported audio extensions (lowercase, without the dot).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg"];

/// Result of scanning a set of roots.
#[derive(Debug, Clone, Default)]
pub struct ScanSnapshot {
    /// Matching files sorted by path, de-duplicated across overlapping roots
    pub files: Vec<FileStamp>,
    /// Number of roots that could be read
    pub accessible_roots: usize,
    /// Roots that were missing or unreadable
    pub inaccessible_roots: Vec<PathBuf>,
}

impl ScanSnapshot {
    pub fn has_access(&self) -> bool {
        self.accessible_roots > 0
    }
}

/// Check if a path is an audio file by extension (case-insensitive).
pub fn is_audio_file(path: &Path) -> bool {
    has_extension(path, AUDIO_EXTENSIONS)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_lowercase();
            allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

/// Whether a root directory exists and can be listed.
pub fn root_accessible(root: &Path) -> bool {
    fs::read_dir(root).is_ok()
}

/// Modification time of a file in nanoseconds since the Unix epoch.
pub fn modified_nanos(metadata: &fs::Metadata) -> Option<i64> {
    let modified = metadata.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_nanos()).ok()
}

/// Read the current stamp of a single file.
pub fn stamp_of(path: &Path) -> Option<FileStamp> {
    let metadata = fs::metadata(path).ok()?;
    Some(FileStamp::new(path, modified_nanos(&metadata)?))
}

/// Scan library roots recursively for audio files.
pub fn scan_roots(roots: &[PathBuf]) -> ScanSnapshot {
    scan_with(roots, AUDIO_EXTENSIONS)
}

/// Scan playlist folders for playlist files with the given extension.
///
/// Playlist folders are optional, so missing ones are only counted as
/// inaccessible in the returned snapshot and never logged as warnings.
pub fn scan_playlist_files(playlist_roots: &[PathBuf], extension: &str) -> ScanSnapshot {
    scan_with(playlist_roots, &[extension])
}

fn scan_with(roots: &[PathBuf], extensions: &[&str]) -> ScanSnapshot {
    let mut files = BTreeMap::new();
    let mut snapshot = ScanSnapshot::default();

    for root in roots {
        if !root_accessible(root) {
            tracing::debug!(target: "library::scanner", root = %root.display(), "Root not accessible, skipping");
            snapshot.inaccessible_roots.push(root.clone());
            continue;
        }
        snapshot.accessible_roots += 1;

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(target: "library::scanner", error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
                continue;
            }
            let Some(modified) = entry.metadata().ok().as_ref().and_then(modified_nanos) else {
                tracing::debug!(target: "library::scanner", path = %entry.path().display(), "No modification time, skipping");
                continue;
            };
            files.insert(entry.path().to_path_buf(), modified);
        }
    }

    snapshot.files = files
        .into_iter()
        .map(|(path, modified)| FileStamp::new(path, modified))
        .collect();

    tracing::debug!(
        target: "library::scanner",
        files = snapshot.files.len(),
        accessible = snapshot.accessible_roots,
        inaccessible = snapshot.inaccessible_roots.len(),
        "Scan finished"
    );
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_scan_audio_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        File::create(root.join("song.mp3")).unwrap();
        File::create(root.join("music.flac")).unwrap();
        File::create(root.join("notes.txt")).unwrap(); // Should be ignored
        File::create(root.join("image.png")).unwrap(); // Should be ignored
        File::create(root.join("UPPERCASE.M4A")).unwrap(); // Case-insensitive

        let subdir = root.join("subdir");
        std::fs::create_dir(&subdir).unwrap();
        File::create(subdir.join("track.wav")).unwrap();
        File::create(subdir.join("ignore.doc")).unwrap();

        let snapshot = scan_roots(&[root.to_path_buf()]);

        assert_eq!(snapshot.accessible_roots, 1);
        assert!(snapshot.inaccessible_roots.is_empty());
        assert_eq!(snapshot.files.len(), 4);

        let file_names: Vec<String> = snapshot
            .files
            .iter()
            .filter_map(|f| f.path.file_name().and_then(|n| n.to_str()).map(|s| s.to_string()))
            .collect();

        assert!(file_names.contains(&"song.mp3".to_string()));
        assert!(file_names.contains(&"music.flac".to_string()));
        assert!(file_names.contains(&"track.wav".to_string()));
        assert!(file_names.contains(&"UPPERCASE.M4A".to_string()));
        assert!(!file_names.contains(&"notes.txt".to_string()));
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("a.flac")).unwrap();
        let missing = dir.path().join("does-not-exist");

        let snapshot = scan_roots(&[missing.clone(), dir.path().to_path_buf()]);

        assert!(snapshot.has_access());
        assert_eq!(snapshot.inaccessible_roots, vec![missing]);
        assert_eq!(snapshot.files.len(), 1);
    }

    #[test]
    fn test_no_accessible_root() {
        let dir = tempdir().unwrap();
        let snapshot = scan_roots(&[dir.path().join("gone"), dir.path().join("also-gone")]);
        assert!(!snapshot.has_access());
        assert!(snapshot.files.is_empty());
        assert_eq!(snapshot.inaccessible_roots.len(), 2);
    }

    #[test]
    fn test_overlapping_roots_deduplicate() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        File::create(nested.join("a.mp3")).unwrap();

        let snapshot = scan_roots(&[dir.path().to_path_buf(), nested]);
        assert_eq!(snapshot.accessible_roots, 2);
        assert_eq!(snapshot.files.len(), 1);
    }

    #[test]
    fn test_scan_playlist_files_uses_own_extension() {
        let dir = tempdir().unwrap();
        let playlists = dir.path().join("Playlists");
        std::fs::create_dir(&playlists).unwrap();
        File::create(playlists.join("mix.zpl")).unwrap();
        File::create(playlists.join("song.mp3")).unwrap();

        let snapshot = scan_playlist_files(&[playlists], "zpl");
        assert_eq!(snapshot.files.len(), 1);
        assert!(snapshot.files[0].path.ends_with("mix.zpl"));
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("song.mp3")));
        assert!(is_audio_file(Path::new("song.FLAC")));
        assert!(is_audio_file(Path::new("song.wav")));
        assert!(!is_audio_file(Path::new("image.png")));
        assert!(!is_audio_file(Path::new("mix.zpl")));
        assert!(!is_audio_file(Path::new("no_extension")));
    }

    #[test]
    fn test_stamp_of_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"x").unwrap();

        let stamp = stamp_of(&path).unwrap();
        assert_eq!(stamp.path, path);
        assert!(stamp.modified > 0);
        assert!(stamp_of(&dir.path().join("missing.mp3")).is_none());
    }
}
