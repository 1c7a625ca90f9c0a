//! Core data models for the music library.
//!
//! - [`FileRecord`] - one audio file as known to the catalog, keyed by path
//! - [`AlbumRecord`] - tracks sharing an [`AlbumSignature`]
//! - [`AlbumGroup`] - albums released in the same year (view data only)
//! - [`PlaylistRecord`] - a parsed playlist file with resolved tracks
//! - [`CoverArtifact`] - a content-addressed cover image in the cover cache
//!
//! Albums and groups are never patched in place: they are rebuilt from the
//! full set of file records whenever the catalog changes.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// An sRGB colour, displayed as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Neutral colour used for albums without artwork.
    pub const WHITE: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("invalid colour: {s}"));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| format!("invalid colour: {s}"))
        };
        Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// A cover image stored in the cover cache.
///
/// Identity is the hash of the raw embedded image bytes, so identical art
/// on different albums resolves to the same artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArtifact {
    /// SHA-256 of the original embedded blob (lowercase hex)
    pub hash: String,
    /// Location of the resized image inside the cover directory
    pub path: PathBuf,
    /// Representative colour of the resized image
    pub color: Rgb,
}

/// Embedded artwork state of a single file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Artwork {
    /// The file carries no picture (or its picture could not be decoded)
    #[default]
    None,
    /// The file carries a picture that has not been cached yet
    Embedded,
    /// The file's picture lives in the cover cache
    Cached(CoverArtifact),
}

impl Artwork {
    /// Whether the underlying file carries a picture at all.
    pub fn is_present(&self) -> bool {
        !matches!(self, Artwork::None)
    }

    pub fn artifact(&self) -> Option<&CoverArtifact> {
        match self {
            Artwork::Cached(artifact) => Some(artifact),
            _ => None,
        }
    }
}

/// Change-detection key of a file on disk: path plus modification time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileStamp {
    /// Absolute path
    pub path: PathBuf,
    /// Modification time in nanoseconds since the Unix epoch
    pub modified: i64,
}

impl FileStamp {
    pub fn new(path: impl Into<PathBuf>, modified: i64) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }
}

/// An audio file in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute file path (unique key)
    pub path: PathBuf,
    /// Modification time in nanoseconds since the Unix epoch
    pub modified: i64,
    pub title: Option<String>,
    /// Track performers, in tag order
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artists: Vec<String>,
    pub year: Option<u32>,
    pub track: Option<u32>,
    pub disc: Option<u32>,
    /// Duration from the file's audio properties, in milliseconds
    pub duration_ms: u64,
    pub artwork: Artwork,
}

impl FileRecord {
    /// Create an untagged record for a file.
    pub fn new(path: impl Into<PathBuf>, modified: i64) -> Self {
        Self {
            path: path.into(),
            modified,
            title: None,
            artists: Vec::new(),
            album: None,
            album_artists: Vec::new(),
            year: None,
            track: None,
            disc: None,
            duration_ms: 0,
            artwork: Artwork::None,
        }
    }

    pub fn stamp(&self) -> FileStamp {
        FileStamp::new(self.path.clone(), self.modified)
    }

    pub fn album_signature(&self) -> AlbumSignature {
        AlbumSignature::new(self.album.as_deref(), self.year, &self.album_artists)
    }

    /// Sort key inside an album. Missing numbers sort first.
    pub fn disc_track(&self) -> (u32, u32) {
        (self.disc.unwrap_or(0), self.track.unwrap_or(0))
    }

    /// Title for display, falling back to the file stem.
    pub fn display_title(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => title.clone(),
            _ => file_stem(&self.path),
        }
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Grouping key for albums: title, year and album-artist set.
///
/// Two tracks with equal signatures belong to the same album no matter
/// which directory they live in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlbumSignature {
    pub title: String,
    pub year: Option<u32>,
    /// Sorted, de-duplicated album artists
    pub album_artists: Vec<String>,
}

impl AlbumSignature {
    pub fn new(title: Option<&str>, year: Option<u32>, album_artists: &[String]) -> Self {
        let mut album_artists: Vec<String> = album_artists
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        album_artists.sort();
        album_artists.dedup();

        Self {
            title: title.map(str::trim).unwrap_or_default().to_string(),
            year,
            album_artists,
        }
    }

    /// Stable storage key: SHA-256 over a canonical encoding (lowercase hex).
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0x1f]);
        if let Some(year) = self.year {
            hasher.update(year.to_le_bytes());
        }
        hasher.update([0x1f]);
        for artist in &self.album_artists {
            hasher.update(artist.as_bytes());
            hasher.update([0x1e]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// An album: tracks sharing one [`AlbumSignature`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRecord {
    /// [`AlbumSignature::key`] of the album
    pub key: String,
    pub title: String,
    pub year: Option<u32>,
    /// Album artists of the first track, or its performers if it has none
    pub artists: Vec<String>,
    /// Every artist appearing on the album, used for artist lookup
    pub all_artists: Vec<String>,
    pub cover: Option<CoverArtifact>,
    /// Tracks ordered by (disc, track)
    pub tracks: Vec<FileRecord>,
}

impl AlbumRecord {
    /// Representative colour, white when the album has no cover.
    pub fn color(&self) -> Rgb {
        self.cover.as_ref().map(|c| c.color).unwrap_or(Rgb::WHITE)
    }

    pub fn duration_ms(&self) -> u64 {
        self.tracks.iter().map(|t| t.duration_ms).sum()
    }
}

/// Albums released in the same year, sorted by title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumGroup {
    pub year: Option<u32>,
    pub albums: Vec<AlbumRecord>,
}

/// A playlist file with its references resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRecord {
    /// Playlist file path (unique key)
    pub path: PathBuf,
    pub title: String,
    /// Modification time of the playlist file in nanoseconds since the Unix epoch
    pub modified: i64,
    /// Resolved tracks in document order; unresolved references are dropped
    pub tracks: Vec<FileRecord>,
}

impl PlaylistRecord {
    pub fn stamp(&self) -> FileStamp {
        FileStamp::new(self.path.clone(), self.modified)
    }
}
