//! Test utilities and fixtures for musicdex tests.
//!
//! This module provides audio and artwork fixtures, record factories and
//! database helpers to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{TestTrack, write_tagged_track};
//!
//! let dir = tempfile::tempdir()?;
//! write_tagged_track(&dir.path().join("01.wav"), &TestTrack {
//!     title: "Intro",
//!     ..TestTrack::default()
//! });
//! ```

use image::{ImageBuffer, ImageFormat, Rgb as Pixel};
use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::tag::{Accessor, ItemKey, Tag, TagExt, TagType};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::db::CatalogStore;
use crate::model::FileRecord;

/// Tag values written into a fixture track.
#[derive(Debug, Clone)]
pub struct TestTrack<'a> {
    pub title: &'a str,
    pub artist: &'a str,
    pub album: &'a str,
    pub album_artist: Option<&'a str>,
    pub year: u32,
    pub track: u32,
    pub disc: u32,
    /// Encoded image bytes to embed as the front cover
    pub cover: Option<Vec<u8>>,
}

impl Default for TestTrack<'_> {
    fn default() -> Self {
        Self {
            title: "Test Track",
            artist: "Test Artist",
            album: "Test Album",
            album_artist: None,
            year: 2023,
            track: 1,
            disc: 1,
            cover: None,
        }
    }
}

/// Write a short silent mono PCM WAV file (0.1 s at 8 kHz).
pub fn write_wav(path: &Path) {
    const SAMPLE_RATE: u32 = 8000;
    const DATA_LEN: u32 = 1600;

    let mut bytes = Vec::with_capacity(44 + DATA_LEN as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + DATA_LEN).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes()); // byte rate
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&DATA_LEN.to_le_bytes());
    bytes.resize(44 + DATA_LEN as usize, 0);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    std::fs::write(path, bytes).expect("Failed to write WAV fixture");
}

/// Write a WAV file carrying an ID3v2 tag with the given values.
pub fn write_tagged_track(path: &Path, track: &TestTrack<'_>) {
    write_wav(path);

    let mut tag = Tag::new(TagType::Id3v2);
    tag.set_title(track.title.to_string());
    tag.set_artist(track.artist.to_string());
    tag.set_album(track.album.to_string());
    tag.set_year(track.year);
    tag.set_track(track.track);
    tag.set_disk(track.disc);
    if let Some(album_artist) = track.album_artist {
        tag.insert_text(ItemKey::AlbumArtist, album_artist.to_string());
    }
    if let Some(cover) = &track.cover {
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Png),
            None,
            cover.clone(),
        ));
    }

    tag.save_to_path(path, WriteOptions::default())
        .expect("Failed to tag WAV fixture");
}

/// Encode a solid-colour PNG of the given size.
pub fn png_cover(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = ImageBuffer::from_pixel(width, height, Pixel(rgb));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    bytes.into_inner()
}

/// Creates a temporary catalog store for testing.
///
/// Keep the `TempDir` alive for the duration of your test; the database is
/// deleted when it goes out of scope.
pub async fn temp_store() -> (CatalogStore, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let store = CatalogStore::open(&dir.path().join("test.db"))
        .await
        .expect("Failed to initialize test database");
    (store, dir)
}

/// Creates a tagged mock record with sensible defaults.
///
/// Customize with struct update syntax:
///
/// ```ignore
/// let record = FileRecord {
///     track: Some(3),
///     ..mock_record("/music/a/03.flac", 1)
/// };
/// ```
pub fn mock_record(path: impl Into<PathBuf>, modified: i64) -> FileRecord {
    FileRecord {
        title: Some("Test Track".to_string()),
        artists: vec!["Test Artist".to_string()],
        album: Some("Test Album".to_string()),
        year: Some(2023),
        track: Some(1),
        disc: Some(1),
        duration_ms: 180_000,
        ..FileRecord::new(path, modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_store_creates_working_database() {
        let (store, _dir) = temp_store().await;
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_write_tagged_track_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/01.wav");
        write_tagged_track(&path, &TestTrack::default());

        let meta = crate::metadata::read(&path).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Test Track"));
        assert_eq!(meta.year, Some(2023));
        assert!(meta.album_artists.is_empty());
    }

    #[test]
    fn test_png_cover_decodes() {
        let bytes = png_cover(3, 2, [1, 2, 3]);
        let image = image::load_from_memory(&bytes).unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
    }

    #[test]
    fn test_mock_record_defaults() {
        let record = mock_record("/music/song.flac", 7);
        assert_eq!(record.path, PathBuf::from("/music/song.flac"));
        assert_eq!(record.modified, 7);
        assert_eq!(record.album.as_deref(), Some("Test Album"));
        assert!(record.album_artists.is_empty());
    }
}
