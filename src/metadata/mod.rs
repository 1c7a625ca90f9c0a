//! Audio file tag reading.
//!
//! Uses the lofty crate for format-independent metadata access. Reads the
//! fields the catalog needs (title, performers, album, album artists, year,
//! track/disc numbers), the duration from the audio properties and whether
//! the file embeds a picture.
//!
//! A file that cannot be read is excluded from the batch with a warning;
//! one bad file never aborts extraction of the rest.

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use rayon::prelude::*;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{Artwork, FileRecord, FileStamp};

/// Tag fields of a single audio file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artists: Vec<String>,
    pub year: Option<u32>,
    pub track: Option<u32>,
    pub disc: Option<u32>,
    pub duration_ms: u64,
    pub has_picture: bool,
}

impl TrackMetadata {
    /// Combine the tags with the file's stamp into a catalog record.
    pub fn into_record(self, stamp: &FileStamp) -> FileRecord {
        FileRecord {
            path: stamp.path.clone(),
            modified: stamp.modified,
            title: self.title,
            artists: self.artists,
            album: self.album,
            album_artists: self.album_artists,
            year: self.year,
            track: self.track,
            disc: self.disc,
            duration_ms: self.duration_ms,
            artwork: if self.has_picture {
                Artwork::Embedded
            } else {
                Artwork::None
            },
        }
    }
}

pub fn read(path: &Path) -> Result<TrackMetadata> {
    let tagged_file = Probe::open(path)
        .map_err(|e| Error::metadata(path, format!("failed to open file: {e}")))?
        .read()
        .map_err(|e| Error::metadata(path, format!("failed to read tags: {e}")))?;

    let duration_ms = u64::try_from(tagged_file.properties().duration().as_millis()).unwrap_or(u64::MAX);

    // Get the primary tag, or fall back to the first available tag
    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        return Ok(TrackMetadata {
            duration_ms,
            ..TrackMetadata::default()
        });
    };

    let mut artists = split_values(tag.get_strings(&ItemKey::TrackArtist));
    if artists.is_empty()
        && let Some(artist) = tag.artist()
    {
        artists = split_values(std::iter::once(artist.as_ref()));
    }

    Ok(TrackMetadata {
        title: non_empty(tag.title().map(|s| s.to_string())),
        artists,
        album: non_empty(tag.album().map(|s| s.to_string())),
        album_artists: split_values(tag.get_strings(&ItemKey::AlbumArtist)),
        year: read_year(tag),
        track: tag.track(),
        disc: tag.disk(),
        duration_ms,
        has_picture: !tag.pictures().is_empty(),
    })
}

/// Read a file and build its catalog record.
pub fn read_record(stamp: &FileStamp) -> Result<FileRecord> {
    read(&stamp.path).map(|meta| meta.into_record(stamp))
}

/// Extract records for a batch of files in parallel.
///
/// Unreadable files are logged and left out of the result.
pub fn extract_batch(stamps: &[FileStamp]) -> Vec<FileRecord> {
    let records: Vec<FileRecord> = stamps
        .par_iter()
        .filter_map(|stamp| match read_record(stamp) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(target: "library::metadata", path = %stamp.path.display(), error = %e, "Skipping unreadable file");
                None
            }
        })
        .collect();

    if records.len() < stamps.len() {
        tracing::info!(
            target: "library::metadata",
            extracted = records.len(),
            skipped = stamps.len() - records.len(),
            "Extraction finished with skipped files"
        );
    }
    records
}

/// Year from the dedicated accessor, or the leading digits of a date field.
fn read_year(tag: &Tag) -> Option<u32> {
    tag.year().filter(|y| *y > 0).or_else(|| {
        [ItemKey::RecordingDate, ItemKey::Year, ItemKey::OriginalReleaseDate]
            .iter()
            .find_map(|key| tag.get_string(key).and_then(parse_year))
    })
}

fn parse_year(value: &str) -> Option<u32> {
    let digits: String = value.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return None;
    }
    digits[..4].parse().ok().filter(|y| *y > 0)
}

/// Split multi-valued fields. Tag formats disagree on the separator, so
/// NUL and ';' are both accepted. Order is preserved, duplicates removed.
fn split_values<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        for part in value.split(['\0', ';']) {
            let part = part.trim();
            if !part.is_empty() && !out.iter().any(|existing| existing == part) {
                out.push(part.to_string());
            }
        }
    }
    out
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
