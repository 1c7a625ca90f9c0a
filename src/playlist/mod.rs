//! Playlist file parsing.
//!
//! Playlists are small XML documents:
//!
//! ```xml
//! <smil>
//!   <head><title>Road Trip</title></head>
//!   <body>
//!     <seq>
//!       <media src="D:\Music\Artist\01.flac"/>
//!       <media src="../Artist/02.mp3"/>
//!     </seq>
//!   </body>
//! </smil>
//! ```
//!
//! Only the first `head/title` and the first `body/seq` below the root are
//! read. Each child of the sequence carries a `src` attribute; relative
//! sources are resolved against the playlist's own directory. References
//! missing from the catalog are dropped, keeping the order of the rest.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{FileRecord, FileStamp, PlaylistRecord, file_stem};

/// Raw contents of a playlist file before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPlaylist {
    pub title: Option<String>,
    /// Referenced track paths in document order
    pub sources: Vec<PathBuf>,
}

/// Read and parse a playlist file.
pub fn read_playlist(path: &Path) -> Result<ParsedPlaylist> {
    let contents = std::fs::read_to_string(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    parse(&contents, base).map_err(|message| Error::playlist(path, message))
}

/// Where the parser currently is inside the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Other,
    Root,
    Head,
    Title,
    Body,
    Seq,
}

fn parse(xml: &str, base: &Path) -> std::result::Result<ParsedPlaylist, String> {
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut playlist = ParsedPlaylist::default();
    let mut stack: Vec<Section> = Vec::new();
    let mut seen_head = false;
    let mut seen_title = false;
    let mut seen_seq = false;
    let mut seen_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let section = enter(&e, stack.last().copied(), &mut seen_head, &mut seen_title, &mut seen_seq);
                if stack.is_empty() {
                    seen_root = true;
                }
                if stack.last() == Some(&Section::Seq) {
                    push_source(&e, base, &mut playlist.sources);
                }
                stack.push(section);
            }
            Ok(Event::Empty(e)) => {
                if stack.is_empty() {
                    seen_root = true;
                }
                if stack.last() == Some(&Section::Seq) {
                    push_source(&e, base, &mut playlist.sources);
                }
            }
            Ok(Event::Text(text)) => {
                if stack.last() == Some(&Section::Title) {
                    let value = text.unescape().map_err(|e| e.to_string())?;
                    let title = playlist.title.get_or_insert_with(String::new);
                    title.push_str(value.trim());
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at position {}: {e}",
                    reader.buffer_position()
                ));
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err("missing root element".to_string());
    }
    playlist.title = playlist.title.filter(|t| !t.is_empty());
    Ok(playlist)
}

/// Classify an opening element from its parent.
fn enter(
    element: &BytesStart<'_>,
    parent: Option<Section>,
    seen_head: &mut bool,
    seen_title: &mut bool,
    seen_seq: &mut bool,
) -> Section {
    let name = element.local_name();
    match (parent, name.as_ref()) {
        (None, _) => Section::Root,
        (Some(Section::Root), b"head") if !*seen_head => {
            *seen_head = true;
            Section::Head
        }
        (Some(Section::Root), b"body") => Section::Body,
        (Some(Section::Head), b"title") if !*seen_title => {
            *seen_title = true;
            Section::Title
        }
        (Some(Section::Body), b"seq") if !*seen_seq => {
            *seen_seq = true;
            Section::Seq
        }
        _ => Section::Other,
    }
}

fn push_source(element: &BytesStart<'_>, base: &Path, sources: &mut Vec<PathBuf>) {
    let src = element
        .attributes()
        .filter_map(|attr| attr.ok())
        .find(|attr| attr.key.local_name().as_ref() == b"src")
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.trim().to_string()));

    match src {
        Some(src) if !src.is_empty() => {
            let path = PathBuf::from(src);
            if path.is_absolute() {
                sources.push(path);
            } else {
                sources.push(base.join(path));
            }
        }
        _ => {
            tracing::debug!(target: "library::playlist", "Sequence entry without src, skipping");
        }
    }
}

/// Resolve a parsed playlist against the catalog.
pub fn resolve(
    parsed: ParsedPlaylist,
    stamp: &FileStamp,
    catalog: &HashMap<PathBuf, FileRecord>,
) -> PlaylistRecord {
    let referenced = parsed.sources.len();
    let tracks: Vec<FileRecord> = parsed
        .sources
        .iter()
        .filter_map(|source| catalog.get(source).or_else(|| catalog.get(&normalize(source))))
        .cloned()
        .collect();

    if tracks.len() < referenced {
        tracing::debug!(
            target: "library::playlist",
            path = %stamp.path.display(),
            referenced,
            resolved = tracks.len(),
            "Dropped unresolved playlist entries"
        );
    }

    PlaylistRecord {
        path: stamp.path.clone(),
        title: parsed.title.unwrap_or_else(|| file_stem(&stamp.path)),
        modified: stamp.modified,
        tracks,
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether the discovered playlist files differ from the stored set.
pub fn has_update(stored: &[PlaylistRecord], current: &[FileStamp]) -> bool {
    let stored: BTreeSet<FileStamp> = stored.iter().map(PlaylistRecord::stamp).collect();
    let current: BTreeSet<FileStamp> = current.iter().cloned().collect();
    stored != current
}

/// Parse and resolve every discovered playlist file.
///
/// A file that cannot be parsed becomes an empty playlist named after the
/// file, so it is still tracked for change detection.
pub fn scan_playlists(stamps: &[FileStamp], catalog: &[FileRecord]) -> Vec<PlaylistRecord> {
    let by_path: HashMap<PathBuf, FileRecord> = catalog
        .iter()
        .map(|record| (record.path.clone(), record.clone()))
        .collect();

    stamps
        .iter()
        .map(|stamp| {
            let parsed = read_playlist(&stamp.path).unwrap_or_else(|e| {
                tracing::warn!(target: "library::playlist", path = %stamp.path.display(), error = %e, "Unreadable playlist");
                ParsedPlaylist::default()
            });
            resolve(parsed, stamp, &by_path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_record;
    use tempfile::tempdir;

    const ROAD_TRIP: &str = r#"<?xml version="1.0"?>
<smil>
  <head>
    <meta name="Generator" content="Zune -- 4.8"/>
    <title>Road &amp; Trip</title>
  </head>
  <body>
    <seq>
      <media src="/music/a.flac"/>
      <media src="/music/b.flac"></media>
      <media src="/music/c.flac" albumTitle="X"/>
    </seq>
  </body>
</smil>"#;

    fn catalog(paths: &[&str]) -> HashMap<PathBuf, FileRecord> {
        paths
            .iter()
            .map(|p| (PathBuf::from(p), mock_record(*p, 1)))
            .collect()
    }

    #[test]
    fn test_parse_title_and_sources() {
        let parsed = parse(ROAD_TRIP, Path::new("/music/Playlists")).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Road & Trip"));
        assert_eq!(
            parsed.sources,
            vec![
                PathBuf::from("/music/a.flac"),
                PathBuf::from("/music/b.flac"),
                PathBuf::from("/music/c.flac"),
            ]
        );
    }

    #[test]
    fn test_missing_references_are_dropped_in_order() {
        let parsed = parse(ROAD_TRIP, Path::new("/music/Playlists")).unwrap();
        let stamp = FileStamp::new("/music/Playlists/trip.zpl", 5);

        let record = resolve(parsed, &stamp, &catalog(&["/music/c.flac", "/music/a.flac"]));

        let paths: Vec<_> = record.tracks.iter().map(|t| t.path.to_str().unwrap()).collect();
        assert_eq!(paths, vec!["/music/a.flac", "/music/c.flac"]);
        assert_eq!(record.title, "Road & Trip");
        assert_eq!(record.modified, 5);
    }

    #[test]
    fn test_relative_sources_resolve_against_playlist_dir() {
        let xml = r#"<smil><body><seq><media src="../Artist/01.mp3"/></seq></body></smil>"#;
        let parsed = parse(xml, Path::new("/music/Playlists")).unwrap();
        let stamp = FileStamp::new("/music/Playlists/rel.zpl", 1);

        let record = resolve(parsed, &stamp, &catalog(&["/music/Artist/01.mp3"]));
        assert_eq!(record.tracks.len(), 1);
        // No title element: fall back to the file name
        assert_eq!(record.title, "rel");
    }

    #[test]
    fn test_only_first_seq_and_nested_elements_ignored() {
        let xml = r#"<smil>
  <body>
    <seq><media src="/m/1.mp3"/><group><media src="/m/nested.mp3"/></group></seq>
    <seq><media src="/m/2.mp3"/></seq>
  </body>
</smil>"#;
        let parsed = parse(xml, Path::new("/")).unwrap();
        assert_eq!(parsed.sources, vec![PathBuf::from("/m/1.mp3")]);
    }

    #[test]
    fn test_bom_and_missing_src() {
        let xml = "\u{feff}<smil><body><seq><media/><media src=\"/m/x.mp3\"/></seq></body></smil>";
        let parsed = parse(xml, Path::new("/")).unwrap();
        assert_eq!(parsed.sources, vec![PathBuf::from("/m/x.mp3")]);
    }

    #[test]
    fn test_malformed_xml_is_error() {
        assert!(parse("<smil><body></smil>", Path::new("/")).is_err());
        assert!(parse("", Path::new("/")).is_err());
    }

    #[test]
    fn test_has_update() {
        let stored = vec![PlaylistRecord {
            path: PathBuf::from("/p/a.zpl"),
            title: "a".into(),
            modified: 1,
            tracks: vec![],
        }];

        assert!(!has_update(&stored, &[FileStamp::new("/p/a.zpl", 1)]));
        assert!(has_update(&stored, &[FileStamp::new("/p/a.zpl", 2)]));
        assert!(has_update(&stored, &[]));
        assert!(has_update(&[], &[FileStamp::new("/p/a.zpl", 1)]));
        assert!(!has_update(&[], &[]));
    }

    #[test]
    fn test_scan_playlists_keeps_unreadable_files() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.zpl");
        std::fs::write(&good, ROAD_TRIP).unwrap();
        let bad = dir.path().join("broken.zpl");
        std::fs::write(&bad, "<smil><body>").unwrap();

        let stamps = vec![FileStamp::new(&bad, 1), FileStamp::new(&good, 2)];
        let files = vec![mock_record("/music/b.flac", 1)];
        let playlists = scan_playlists(&stamps, &files);

        assert_eq!(playlists.len(), 2);
        assert_eq!(playlists[0].title, "broken");
        assert!(playlists[0].tracks.is_empty());
        assert_eq!(playlists[1].title, "Road & Trip");
        assert_eq!(playlists[1].tracks.len(), 1);
    }
}
