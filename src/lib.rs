//! musicdex - local music library indexing and sync engine.
//!
//! Scans library roots for audio files, keeps a SQLite catalog in sync with
//! the disk, groups tracks into albums with cached cover art, parses
//! playlist files and watches the roots for changes. The [`library::Library`]
//! orchestrator drives one scan cycle at a time and publishes immutable
//! snapshots to its consumer.

pub mod config;
pub mod cover;
pub mod db;
pub mod error;
pub mod library;
pub mod metadata;
pub mod model;
pub mod playlist;
pub mod scanner;
#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{Error, Result};
pub use library::{Library, LibraryEvent, LibraryState};
