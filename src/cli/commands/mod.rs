//! CLI command definitions and dispatch.
//!
//! Each group of subcommands is implemented in its own submodule:
//! - `scan`: running library cycles and watching for changes
//! - `query`: read-only listings of the stored catalog and cover cache

mod query;
mod scan;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use musicdex::config::{self, LibrarySettings};

pub use query::{cmd_albums, cmd_artist, cmd_covers, cmd_playlists};
pub use scan::{cmd_scan, cmd_watch};

/// musicdex CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Library root directory (repeatable); overrides the configured roots
    #[arg(long = "root", global = true)]
    pub roots: Vec<PathBuf>,

    /// Directory holding the catalog database
    #[arg(long, global = true, env = "MUSICDEX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory holding the cover cache
    #[arg(long, global = true, env = "MUSICDEX_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Run one library cycle and print a summary
    Scan {
        /// Save the given --root directories to the config file
        #[arg(long)]
        save_roots: bool,
    },
    /// List stored albums grouped by year
    Albums,
    /// List albums and tracks featuring an artist
    Artist {
        /// Artist name (case-insensitive)
        name: String,
    },
    /// List stored playlists
    Playlists {
        /// Show the tracks of each playlist
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show or clear the cover cache
    Covers {
        /// Delete every cached cover
        #[arg(long)]
        clear: bool,
    },
    /// Run a cycle, then keep the library in sync until Ctrl+C
    Watch,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let (config, settings) = resolve_settings(cli);

    match &cli.command {
        Commands::Scan { save_roots } => {
            if *save_roots {
                if cli.roots.is_empty() {
                    anyhow::bail!("--save-roots needs at least one --root");
                }
                config::save(&config)?;
            }
            cmd_scan(&rt, settings)
        }
        Commands::Albums => cmd_albums(&rt, &settings),
        Commands::Artist { name } => cmd_artist(&rt, &settings, name),
        Commands::Playlists { verbose } => cmd_playlists(&rt, &settings, *verbose),
        Commands::Covers { clear } => cmd_covers(&settings, *clear),
        Commands::Watch => cmd_watch(&rt, settings),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Load the config file and apply command-line overrides.
fn resolve_settings(cli: &Cli) -> (config::Config, LibrarySettings) {
    let mut config = config::load();
    if !cli.roots.is_empty() {
        config.library.paths = cli.roots.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.storage.database_dir = dir.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        config.storage.cache_dir = dir.clone();
    }
    let settings = LibrarySettings::from_config(&config);
    (config, settings)
}

/// Fail early with a hint when no library root is configured.
pub(crate) fn require_roots(settings: &LibrarySettings) -> anyhow::Result<()> {
    if settings.roots.is_empty() {
        let hint = config::config_path()
            .map(|p| format!(" or set library.paths in {}", p.display()))
            .unwrap_or_default();
        anyhow::bail!("No library roots configured; pass --root <DIR>{hint}");
    }
    Ok(())
}

/// Format milliseconds as `m:ss`, or `h:mm:ss` past an hour.
pub(crate) fn format_duration(ms: u64) -> String {
    let total = ms / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Format a byte count with a binary unit.
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
