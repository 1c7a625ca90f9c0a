//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\musicdex\config.toml
//! - macOS: ~/Library/Application Support/musicdex/config.toml
//! - Linux: ~/.config/musicdex/config.toml
//!
//! The file is human-readable and editable. [`LibrarySettings`] is the
//! resolved form handed to the library orchestrator at construction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::db::DB_FILE_NAME;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library settings
    pub library: LibraryConfig,

    /// Where the catalog and cover cache live
    pub storage: StorageConfig,

    /// Cover cache settings
    pub covers: CoverConfig,
}

/// Library management settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Library root directories, scanned recursively
    pub paths: Vec<PathBuf>,

    /// Whether to watch the roots for changes after the first load
    pub watch_for_changes: bool,

    /// Name of the playlist folder inside each library root
    pub playlist_dir_name: String,

    /// Playlist file extension (without the dot)
    pub playlist_extension: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            watch_for_changes: true,
            playlist_dir_name: "Playlists".to_string(),
            playlist_extension: "zpl".to_string(),
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the catalog database
    pub database_dir: PathBuf,

    /// Directory holding derived caches (covers)
    pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("musicdex"),
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("musicdex"),
        }
    }
}

/// Cover cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    /// Covers are resized to fit inside a square of this many pixels
    pub max_dimension: u32,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self { max_dimension: 400 }
    }
}

/// Resolved settings for one library orchestrator.
#[derive(Debug, Clone)]
pub struct LibrarySettings {
    /// Library roots, in configuration order
    pub roots: Vec<PathBuf>,
    pub playlist_dir_name: String,
    pub playlist_extension: String,
    /// Catalog database file
    pub database_path: PathBuf,
    /// Cover artifact directory
    pub cover_dir: PathBuf,
    pub cover_max_dimension: u32,
    pub watch_for_changes: bool,
}

impl LibrarySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            roots: config.library.paths.clone(),
            playlist_dir_name: config.library.playlist_dir_name.clone(),
            playlist_extension: config.library.playlist_extension.clone(),
            database_path: config.storage.database_dir.join(DB_FILE_NAME),
            cover_dir: config.storage.cache_dir.join("covers"),
            cover_max_dimension: config.covers.max_dimension,
            watch_for_changes: config.library.watch_for_changes,
        }
    }

    /// Playlist folders, one per library root.
    pub fn playlist_roots(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.join(&self.playlist_dir_name))
            .collect()
    }

    /// Directories the engine writes to; changes inside them are not library changes.
    pub fn storage_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.cover_dir.clone()];
        if let Some(parent) = self.database_path.parent() {
            dirs.push(parent.to_path_buf());
        }
        dirs
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("musicdex"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
