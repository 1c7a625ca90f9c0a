//! Catalog store: persisted files, albums and playlists.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. Provides async
//! operations for:
//! - Loading the full file and playlist sets at the start of a cycle
//! - Atomic batch upsert/removal of file records
//! - Replacing the derived album and playlist tables wholesale
//! - Read-only lookups (albums by artist, album of a track)
//!
//! List-valued columns (artists, track paths) are stored as JSON text and
//! queried through SQLite's `json_each`.
//!
//! # Example
//!
//! ```ignore
//! use musicdex::db::CatalogStore;
//!
//! let store = CatalogStore::open(Path::new("library.db")).await?;
//! let files = store.load_all().await?;
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, ResultExt};
use crate::model::{AlbumRecord, Artwork, CoverArtifact, FileRecord, PlaylistRecord, Rgb};

/// Catalog database filename inside the storage directory.
pub const DB_FILE_NAME: &str = "library.db";

/// Handle to the catalog database.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    /// Open (creating if needed) a writable catalog and run migrations.
    ///
    /// Fails if the storage directory cannot be created or written.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(format!("creating catalog directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(format!("opening catalog {}", path.display()))?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(target: "library::db", path = %path.display(), "Catalog opened");
        Ok(Self { pool })
    }

    /// Open an independent read-only handle for interactive queries.
    ///
    /// Never creates or migrates the database.
    pub async fn open_read_only(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .with_context(format!("opening catalog {} read-only", path.display()))?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn is_empty(&self) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count == 0)
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    /// Load every file record, ordered by path.
    pub async fn load_all(&self) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(&format!("{SELECT_FILES} ORDER BY path"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    /// Insert or replace a batch of file records in one transaction.
    pub async fn upsert(&self, records: &[FileRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            let artwork = ArtworkColumns::from(&record.artwork);
            sqlx::query(
                "INSERT INTO files (path, modified, title, artists, album, album_artists, year, track, disc,
                                    duration_ms, has_artwork, artwork_hash, artwork_path, artwork_color)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(path) DO UPDATE SET
                    modified = excluded.modified,
                    title = excluded.title,
                    artists = excluded.artists,
                    album = excluded.album,
                    album_artists = excluded.album_artists,
                    year = excluded.year,
                    track = excluded.track,
                    disc = excluded.disc,
                    duration_ms = excluded.duration_ms,
                    has_artwork = excluded.has_artwork,
                    artwork_hash = excluded.artwork_hash,
                    artwork_path = excluded.artwork_path,
                    artwork_color = excluded.artwork_color",
            )
            .bind(path_text(&record.path))
            .bind(record.modified)
            .bind(&record.title)
            .bind(serde_json::to_string(&record.artists)?)
            .bind(&record.album)
            .bind(serde_json::to_string(&record.album_artists)?)
            .bind(record.year.map(i64::from))
            .bind(record.track.map(i64::from))
            .bind(record.disc.map(i64::from))
            .bind(i64::try_from(record.duration_ms).unwrap_or(i64::MAX))
            .bind(artwork.present)
            .bind(artwork.hash)
            .bind(artwork.path)
            .bind(artwork.color)
            .execute(&mut *tx)
            .await?;
        }
        set_albums_stale(&mut tx, true).await?;
        tx.commit().await?;

        tracing::debug!(target: "library::db", count = records.len(), "Upserted file records");
        Ok(())
    }

    /// Remove file records by path in one transaction.
    pub async fn remove(&self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for path in paths {
            sqlx::query("DELETE FROM files WHERE path = ?")
                .bind(path_text(path))
                .execute(&mut *tx)
                .await?;
        }
        set_albums_stale(&mut tx, true).await?;
        tx.commit().await?;

        tracing::debug!(target: "library::db", count = paths.len(), "Removed file records");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Albums
    // ------------------------------------------------------------------------

    /// Replace the album table with a freshly grouped set.
    ///
    /// Track artwork state is written back in the same transaction so a
    /// resolved cover is remembered by its source file.
    pub async fn replace_albums(&self, albums: &[AlbumRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM albums").execute(&mut *tx).await?;

        for album in albums {
            insert_album(&mut tx, album).await?;
            for track in &album.tracks {
                let artwork = ArtworkColumns::from(&track.artwork);
                sqlx::query(
                    "UPDATE files SET has_artwork = ?, artwork_hash = ?, artwork_path = ?, artwork_color = ?
                     WHERE path = ?",
                )
                .bind(artwork.present)
                .bind(artwork.hash)
                .bind(artwork.path)
                .bind(artwork.color)
                .bind(path_text(&track.path))
                .execute(&mut *tx)
                .await?;
            }
        }
        set_albums_stale(&mut tx, false).await?;
        tx.commit().await?;

        tracing::debug!(target: "library::db", count = albums.len(), "Replaced albums");
        Ok(())
    }

    /// Whether file records changed after the album table was last rebuilt.
    ///
    /// Stays set when a cycle stops between the file writes and the regroup.
    pub async fn albums_stale(&self) -> Result<bool> {
        let stale: Option<bool> = sqlx::query_scalar("SELECT albums_stale FROM catalog_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(stale.unwrap_or(false))
    }

    /// Load every stored album with its tracks, ordered by key.
    pub async fn load_albums(&self) -> Result<Vec<AlbumRecord>> {
        let rows: Vec<AlbumRow> = sqlx::query_as(&format!("{SELECT_ALBUMS} ORDER BY key"))
            .fetch_all(&self.pool)
            .await?;
        self.albums_from_rows(rows).await
    }

    /// Albums whose "all artists" set contains `name` (case-insensitive).
    pub async fn query_by_artist(&self, name: &str) -> Result<Vec<AlbumRecord>> {
        let rows: Vec<AlbumRow> = sqlx::query_as(&format!(
            "{SELECT_ALBUMS}
             WHERE EXISTS (
                SELECT 1 FROM json_each(albums.all_artists)
                WHERE lower(json_each.value) = lower(?)
             )
             ORDER BY key"
        ))
        .bind(name.trim())
        .fetch_all(&self.pool)
        .await?;
        self.albums_from_rows(rows).await
    }

    /// The album containing the given track, if any.
    pub async fn album_for_track(&self, path: &Path) -> Result<Option<AlbumRecord>> {
        let row: Option<AlbumRow> = sqlx::query_as(&format!(
            "{SELECT_ALBUMS}
             WHERE EXISTS (
                SELECT 1 FROM json_each(albums.track_paths)
                WHERE json_each.value = ?
             )
             LIMIT 1"
        ))
        .bind(path_text(path))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.albums_from_rows(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn albums_from_rows(&self, rows: Vec<AlbumRow>) -> Result<Vec<AlbumRecord>> {
        let mut albums = Vec::with_capacity(rows.len());
        for row in rows {
            let track_paths: Vec<String> = serde_json::from_str(&row.track_paths)?;
            let tracks = self.files_by_paths(&track_paths).await?;
            albums.push(row.into_record(tracks)?);
        }
        Ok(albums)
    }

    // ------------------------------------------------------------------------
    // Playlists
    // ------------------------------------------------------------------------

    /// Load every stored playlist with its resolved tracks, ordered by path.
    pub async fn load_all_playlists(&self) -> Result<Vec<PlaylistRecord>> {
        let rows: Vec<PlaylistRow> =
            sqlx::query_as("SELECT path, title, modified, track_paths FROM playlists ORDER BY path")
                .fetch_all(&self.pool)
                .await?;

        let mut playlists = Vec::with_capacity(rows.len());
        for row in rows {
            let track_paths: Vec<String> = serde_json::from_str(&row.track_paths)?;
            let tracks = self.files_by_paths(&track_paths).await?;
            playlists.push(PlaylistRecord {
                path: PathBuf::from(row.path),
                title: row.title,
                modified: row.modified,
                tracks,
            });
        }
        Ok(playlists)
    }

    /// Replace the playlist table with a freshly parsed set.
    pub async fn replace_playlists(&self, playlists: &[PlaylistRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM playlists").execute(&mut *tx).await?;

        for playlist in playlists {
            let track_paths: Vec<String> = playlist.tracks.iter().map(|t| path_text(&t.path)).collect();
            sqlx::query("INSERT INTO playlists (path, title, modified, track_paths) VALUES (?, ?, ?, ?)")
                .bind(path_text(&playlist.path))
                .bind(&playlist.title)
                .bind(playlist.modified)
                .bind(serde_json::to_string(&track_paths)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!(target: "library::db", count = playlists.len(), "Replaced playlists");
        Ok(())
    }

    /// Fetch file records for the given paths, keeping the given order.
    /// Paths with no record are skipped.
    async fn files_by_paths(&self, paths: &[String]) -> Result<Vec<FileRecord>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<FileRow> = sqlx::query_as(&format!(
            "{SELECT_FILES} WHERE path IN (SELECT value FROM json_each(?))"
        ))
        .bind(serde_json::to_string(paths)?)
        .fetch_all(&self.pool)
        .await?;

        let mut by_path: HashMap<String, FileRow> =
            rows.into_iter().map(|row| (row.path.clone(), row)).collect();

        paths
            .iter()
            .filter_map(|path| by_path.remove(path))
            .map(FileRecord::try_from)
            .collect()
    }
}

const SELECT_FILES: &str = "SELECT path, modified, title, artists, album, album_artists, year, track, disc,
        duration_ms, has_artwork, artwork_hash, artwork_path, artwork_color
 FROM files";

const SELECT_ALBUMS: &str = "SELECT key, title, year, artists, all_artists, cover_hash, cover_path, cover_color, track_paths
 FROM albums";

async fn insert_album(tx: &mut Transaction<'_, Sqlite>, album: &AlbumRecord) -> Result<()> {
    let track_paths: Vec<String> = album.tracks.iter().map(|t| path_text(&t.path)).collect();
    let cover = album.cover.as_ref();

    sqlx::query(
        "INSERT INTO albums (key, title, year, artists, all_artists, cover_hash, cover_path, cover_color, track_paths)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&album.key)
    .bind(&album.title)
    .bind(album.year.map(i64::from))
    .bind(serde_json::to_string(&album.artists)?)
    .bind(serde_json::to_string(&album.all_artists)?)
    .bind(cover.map(|c| c.hash.clone()))
    .bind(cover.map(|c| path_text(&c.path)))
    .bind(cover.map(|c| c.color.to_string()))
    .bind(serde_json::to_string(&track_paths)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn set_albums_stale(tx: &mut Transaction<'_, Sqlite>, stale: bool) -> Result<()> {
    sqlx::query("UPDATE catalog_state SET albums_stale = ? WHERE id = 1")
        .bind(stale)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Paths are stored as text; non-UTF-8 components are replaced lossily.
fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn to_u32(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn artifact_from_columns(
    hash: Option<String>,
    path: Option<String>,
    color: Option<String>,
) -> Option<CoverArtifact> {
    let color = color?.parse::<Rgb>().ok()?;
    Some(CoverArtifact {
        hash: hash?,
        path: PathBuf::from(path?),
        color,
    })
}

/// Artwork state flattened into its table columns.
struct ArtworkColumns {
    present: bool,
    hash: Option<String>,
    path: Option<String>,
    color: Option<String>,
}

impl From<&Artwork> for ArtworkColumns {
    fn from(artwork: &Artwork) -> Self {
        let artifact = artwork.artifact();
        Self {
            present: artwork.is_present(),
            hash: artifact.map(|a| a.hash.clone()),
            path: artifact.map(|a| path_text(&a.path)),
            color: artifact.map(|a| a.color.to_string()),
        }
    }
}

/// Row of the `files` table.
#[derive(Debug, sqlx::FromRow)]
struct FileRow {
    path: String,
    modified: i64,
    title: Option<String>,
    artists: String,
    album: Option<String>,
    album_artists: String,
    year: Option<i64>,
    track: Option<i64>,
    disc: Option<i64>,
    duration_ms: i64,
    has_artwork: bool,
    artwork_hash: Option<String>,
    artwork_path: Option<String>,
    artwork_color: Option<String>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = Error;

    fn try_from(row: FileRow) -> Result<Self> {
        let artwork = if row.has_artwork {
            artifact_from_columns(row.artwork_hash, row.artwork_path, row.artwork_color)
                .map(Artwork::Cached)
                .unwrap_or(Artwork::Embedded)
        } else {
            Artwork::None
        };

        Ok(FileRecord {
            path: PathBuf::from(row.path),
            modified: row.modified,
            title: row.title,
            artists: serde_json::from_str(&row.artists)?,
            album: row.album,
            album_artists: serde_json::from_str(&row.album_artists)?,
            year: to_u32(row.year),
            track: to_u32(row.track),
            disc: to_u32(row.disc),
            duration_ms: u64::try_from(row.duration_ms).unwrap_or(0),
            artwork,
        })
    }
}

/// Row of the `albums` table.
#[derive(Debug, sqlx::FromRow)]
struct AlbumRow {
    key: String,
    title: String,
    year: Option<i64>,
    artists: String,
    all_artists: String,
    cover_hash: Option<String>,
    cover_path: Option<String>,
    cover_color: Option<String>,
    track_paths: String,
}

impl AlbumRow {
    fn into_record(self, tracks: Vec<FileRecord>) -> Result<AlbumRecord> {
        Ok(AlbumRecord {
            key: self.key,
            title: self.title,
            year: to_u32(self.year),
            artists: serde_json::from_str(&self.artists)?,
            all_artists: serde_json::from_str(&self.all_artists)?,
            cover: artifact_from_columns(self.cover_hash, self.cover_path, self.cover_color),
            tracks,
        })
    }
}

/// Row of the `playlists` table.
#[derive(Debug, sqlx::FromRow)]
struct PlaylistRow {
    path: String,
    title: String,
    modified: i64,
    track_paths: String,
}
