//! Library cycle and watch commands.

use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use musicdex::config::LibrarySettings;
use musicdex::{Library, LibraryEvent, LibraryState};

use super::{format_bytes, require_roots};

/// Run one library cycle and print a summary
pub fn cmd_scan(rt: &Runtime, mut settings: LibrarySettings) -> anyhow::Result<()> {
    require_roots(&settings)?;
    settings.watch_for_changes = false;

    rt.block_on(async {
        let (library, events) = Library::new(settings)?;
        let printer = tokio::spawn(print_events(events));

        let cycle = library
            .start_load()
            .ok_or_else(|| anyhow::anyhow!("A library cycle is already running"))?;
        cycle.await?;

        let state = library.state();
        let albums = library.album_groups().unwrap_or_default();
        let playlists = library.playlists().unwrap_or_default();
        let cover_bytes = library.covers().size_bytes();

        // Dropping the last handle closes the event channel
        drop(library);
        printer.await?;

        match state {
            LibraryState::NoLibraryAccess => anyhow::bail!("None of the library roots is accessible"),
            LibraryState::Failed => anyhow::bail!("Library cycle failed"),
            _ => {}
        }

        let album_count: usize = albums.iter().map(|g| g.albums.len()).sum();
        let track_count: usize = albums
            .iter()
            .flat_map(|g| g.albums.iter())
            .map(|a| a.tracks.len())
            .sum();
        println!(
            "\nScan complete: {} tracks in {} albums ({} years), {} playlists, covers {}",
            track_count,
            album_count,
            albums.len(),
            playlists.len(),
            format_bytes(cover_bytes)
        );
        Ok(())
    })
}

/// Run a cycle, then keep watching the roots until Ctrl+C
pub fn cmd_watch(rt: &Runtime, mut settings: LibrarySettings) -> anyhow::Result<()> {
    require_roots(&settings)?;
    settings.watch_for_changes = true;

    rt.block_on(async {
        let (library, mut events) = Library::new(settings)?;
        for root in &library.settings().roots {
            println!("Watching for changes in: {}", root.display());
        }
        println!("Press Ctrl+C to stop.\n");

        library.start_load();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(LibraryEvent::StateChanged(LibraryState::NoLibraryAccess)) => {
                        anyhow::bail!("None of the library roots is accessible");
                    }
                    Some(event) => report(&event),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!(target: "library::watcher", "Interrupted, stopping");
                    break;
                }
            }
        }
        Ok(())
    })
}

async fn print_events(mut events: UnboundedReceiver<LibraryEvent>) {
    while let Some(event) = events.recv().await {
        report(&event);
    }
}

fn report(event: &LibraryEvent) {
    match event {
        LibraryEvent::StateChanged(state) => println!("[{state:?}]"),
        LibraryEvent::AlbumGroupsChanged(groups) => {
            let albums: usize = groups.iter().map(|g| g.albums.len()).sum();
            println!("  albums: {} in {} years", albums, groups.len());
        }
        LibraryEvent::PlaylistsChanged(playlists) => {
            println!("  playlists: {}", playlists.len());
        }
        LibraryEvent::CycleFailed(error) => eprintln!("  error: {error}"),
    }
}
