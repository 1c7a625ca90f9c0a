//! Snapshot comparison between the disk and the catalog.
//!
//! Two files are equal when both path and modification time match. A path
//! that is still present with a different time is an update, never a
//! removal followed by an addition.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::model::FileStamp;

/// What a scan found compared with the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryDiff {
    /// New files, or known files whose modification time changed
    pub added_or_updated: Vec<FileStamp>,
    /// Catalog paths no longer present on disk
    pub removed: Vec<PathBuf>,
    /// Files present in both with the same modification time
    pub unchanged: usize,
}

impl LibraryDiff {
    pub fn is_empty(&self) -> bool {
        self.added_or_updated.is_empty() && self.removed.is_empty()
    }
}

/// Compare the current disk snapshot against the prior catalog snapshot.
pub fn diff(current: &[FileStamp], prior: &[FileStamp]) -> LibraryDiff {
    let prior_index: HashMap<&Path, i64> = prior
        .iter()
        .map(|stamp| (stamp.path.as_path(), stamp.modified))
        .collect();

    let mut result = LibraryDiff::default();
    let mut seen: HashSet<&Path> = HashSet::with_capacity(current.len());

    for stamp in current {
        if !seen.insert(stamp.path.as_path()) {
            continue;
        }
        match prior_index.get(stamp.path.as_path()) {
            Some(&modified) if modified == stamp.modified => result.unchanged += 1,
            _ => result.added_or_updated.push(stamp.clone()),
        }
    }

    result.removed = prior_index
        .keys()
        .filter(|path| !seen.contains(*path))
        .map(|path| path.to_path_buf())
        .collect();
    result.removed.sort();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(path: &str, modified: i64) -> FileStamp {
        FileStamp::new(path, modified)
    }

    #[test]
    fn test_empty_catalog_adds_everything() {
        let current = vec![stamp("/m/a.mp3", 1), stamp("/m/b.mp3", 2)];
        let result = diff(&current, &[]);
        assert_eq!(result.added_or_updated, current);
        assert!(result.removed.is_empty());
        assert_eq!(result.unchanged, 0);
    }

    #[test]
    fn test_identical_snapshots_are_unchanged() {
        let snapshot = vec![stamp("/m/a.mp3", 1), stamp("/m/b.mp3", 2)];
        let result = diff(&snapshot, &snapshot);
        assert!(result.is_empty());
        assert_eq!(result.unchanged, 2);
    }

    #[test]
    fn test_changed_mtime_is_update_not_removal() {
        let prior = vec![stamp("/m/a.mp3", 1)];
        let current = vec![stamp("/m/a.mp3", 5)];
        let result = diff(&current, &prior);
        assert_eq!(result.added_or_updated, vec![stamp("/m/a.mp3", 5)]);
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_deleted_file_is_removed() {
        let prior = vec![stamp("/m/a.mp3", 1), stamp("/m/b.mp3", 1)];
        let current = vec![stamp("/m/a.mp3", 1)];
        let result = diff(&current, &prior);
        assert_eq!(result.removed, vec![PathBuf::from("/m/b.mp3")]);
        assert!(result.added_or_updated.is_empty());
        assert_eq!(result.unchanged, 1);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Snapshot over a small path space so overlaps are frequent.
    fn snapshot() -> impl Strategy<Value = Vec<FileStamp>> {
        prop::collection::btree_map(0u8..24, 0i64..4, 0..16).prop_map(|files: BTreeMap<u8, i64>| {
            files
                .into_iter()
                .map(|(n, modified)| FileStamp::new(format!("/music/{n}.flac"), modified))
                .collect()
        })
    }

    proptest! {
        /// Added-or-updated is exactly the current stamps missing from prior
        #[test]
        fn added_matches_set_difference(current in snapshot(), prior in snapshot()) {
            let result = diff(&current, &prior);
            let prior_set: HashSet<&FileStamp> = prior.iter().collect();
            let expected: Vec<FileStamp> = current
                .iter()
                .filter(|s| !prior_set.contains(s))
                .cloned()
                .collect();
            prop_assert_eq!(result.added_or_updated, expected);
        }

        /// Removed is exactly the prior paths absent from current
        #[test]
        fn removed_matches_missing_paths(current in snapshot(), prior in snapshot()) {
            let result = diff(&current, &prior);
            let current_paths: HashSet<&Path> = current.iter().map(|s| s.path.as_path()).collect();
            let mut expected: Vec<PathBuf> = prior
                .iter()
                .filter(|s| !current_paths.contains(s.path.as_path()))
                .map(|s| s.path.clone())
                .collect();
            expected.sort();
            prop_assert_eq!(result.removed, expected);
        }

        /// Every path lands in exactly one bucket
        #[test]
        fn buckets_partition_paths(current in snapshot(), prior in snapshot()) {
            let result = diff(&current, &prior);
            let all_paths: HashSet<&Path> = current
                .iter()
                .chain(prior.iter())
                .map(|s| s.path.as_path())
                .collect();
            prop_assert_eq!(
                result.added_or_updated.len() + result.removed.len() + result.unchanged,
                all_paths.len()
            );
            for stamp in &result.added_or_updated {
                prop_assert!(!result.removed.contains(&stamp.path));
            }
        }
    }
}
