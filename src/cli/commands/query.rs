//! Read-only catalog listings.

use tokio::runtime::Runtime;

use musicdex::config::LibrarySettings;
use musicdex::cover::CoverCache;
use musicdex::library;
use musicdex::model::AlbumGroup;

use super::{format_bytes, format_duration};

/// List stored albums grouped by year
pub fn cmd_albums(rt: &Runtime, settings: &LibrarySettings) -> anyhow::Result<()> {
    let groups = rt.block_on(library::stored_album_groups(&settings.database_path))?;
    if groups.is_empty() {
        println!("No albums in the catalog. Run `musicdex scan` first.");
        return Ok(());
    }
    print_groups(&groups);
    Ok(())
}

/// List albums and tracks featuring an artist
pub fn cmd_artist(rt: &Runtime, settings: &LibrarySettings, name: &str) -> anyhow::Result<()> {
    let (groups, tracks) = rt.block_on(library::artist_albums(&settings.database_path, name))?;
    if groups.is_empty() {
        println!("No albums found for {name:?}");
        return Ok(());
    }

    print_groups(&groups);
    println!("\nTracks ({}):", tracks.len());
    for track in &tracks {
        println!(
            "  {}  {} - {}",
            format_duration(track.duration_ms),
            track.artists.join(", "),
            track.display_title()
        );
    }
    Ok(())
}

/// List stored playlists
pub fn cmd_playlists(rt: &Runtime, settings: &LibrarySettings, verbose: bool) -> anyhow::Result<()> {
    let playlists = rt.block_on(library::stored_playlists(&settings.database_path))?;
    if playlists.is_empty() {
        println!("No playlists in the catalog.");
        return Ok(());
    }

    for playlist in &playlists {
        println!("{} ({} tracks)", playlist.title, playlist.tracks.len());
        if verbose {
            for (i, track) in playlist.tracks.iter().enumerate() {
                println!("  {:>3}. {}", i + 1, track.display_title());
            }
        }
    }
    Ok(())
}

/// Show or clear the cover cache
pub fn cmd_covers(settings: &LibrarySettings, clear: bool) -> anyhow::Result<()> {
    let cache = CoverCache::new(settings.cover_dir.clone(), settings.cover_max_dimension);
    println!("Cover cache: {}", cache.cache_dir().display());
    println!("Size: {}", format_bytes(cache.size_bytes()));

    if clear {
        cache.clear()?;
        println!("Cleared. Covers are rebuilt on the next scan.");
    }
    Ok(())
}

fn print_groups(groups: &[AlbumGroup]) {
    for group in groups {
        println!("{}", group.year.map_or_else(|| "Unknown year".to_string(), |y| y.to_string()));
        for album in &group.albums {
            println!(
                "  {} - {} ({} tracks, {}) {}",
                album.artists.join(", "),
                album.title,
                album.tracks.len(),
                format_duration(album.duration_ms()),
                album.color()
            );
        }
    }
}
