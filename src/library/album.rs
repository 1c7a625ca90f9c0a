//! Album grouping.
//!
//! Albums are always rebuilt from the complete set of file records: group by
//! signature, order tracks, resolve the cover from the first track and
//! collect artists. Year groups are a pure view over the result.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::cover::CoverCache;
use crate::error::Error;
use crate::model::{AlbumGroup, AlbumRecord, AlbumSignature, Artwork, CoverArtifact, FileRecord};

/// Group file records into albums.
///
/// The first track of each album is the cover source. Its artwork state is
/// updated in the returned record so the resolved artifact can be persisted.
/// Albums come back sorted by key.
pub fn group_into_albums(files: Vec<FileRecord>, covers: &CoverCache) -> Vec<AlbumRecord> {
    let mut by_signature: HashMap<AlbumSignature, Vec<FileRecord>> = HashMap::new();
    for file in files {
        by_signature.entry(file.album_signature()).or_default().push(file);
    }

    let mut albums: Vec<AlbumRecord> = by_signature
        .into_iter()
        .map(|(signature, tracks)| build_album(signature, tracks, covers))
        .collect();
    albums.sort_by(|a, b| a.key.cmp(&b.key));

    tracing::debug!(target: "library", albums = albums.len(), "Grouped albums");
    albums
}

fn build_album(signature: AlbumSignature, mut tracks: Vec<FileRecord>, covers: &CoverCache) -> AlbumRecord {
    tracks.sort_by(|a, b| {
        a.disc_track()
            .cmp(&b.disc_track())
            .then_with(|| a.path.cmp(&b.path))
    });

    let cover = tracks
        .first_mut()
        .and_then(|first| resolve_album_cover(first, covers));

    let artists = match tracks.first() {
        Some(first) if !first.album_artists.is_empty() => first.album_artists.clone(),
        _ => unique(tracks.iter().flat_map(|t| t.artists.iter())),
    };
    let all_artists = unique(
        artists
            .iter()
            .chain(tracks.iter().flat_map(|t| t.artists.iter())),
    );

    AlbumRecord {
        key: signature.key(),
        title: signature.title,
        year: signature.year,
        artists,
        all_artists,
        cover,
        tracks,
    }
}

/// Resolve a cover from the album's source track, updating its artwork state.
fn resolve_album_cover(source: &mut FileRecord, covers: &CoverCache) -> Option<CoverArtifact> {
    match &source.artwork {
        Artwork::None => return None,
        Artwork::Cached(artifact) if artifact.path.is_file() => return Some(artifact.clone()),
        Artwork::Embedded | Artwork::Cached(_) => {}
    }

    match covers.resolve(&source.path) {
        Ok(Some(artifact)) => {
            source.artwork = Artwork::Cached(artifact.clone());
            Some(artifact)
        }
        Ok(None) => {
            source.artwork = Artwork::None;
            None
        }
        Err(Error::Image(e)) => {
            tracing::warn!(target: "library::cover", path = %source.path.display(), error = %e, "Undecodable cover");
            source.artwork = Artwork::None;
            None
        }
        Err(e) => {
            tracing::warn!(target: "library::cover", path = %source.path.display(), error = %e, "Failed to cache cover");
            source.artwork = Artwork::Embedded;
            None
        }
    }
}

/// Order-preserving de-duplication.
fn unique<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

/// Group albums by year: years descending with unknown years last,
/// albums sorted by title within a year.
pub fn group_by_year(albums: Vec<AlbumRecord>) -> Vec<AlbumGroup> {
    let mut by_year: BTreeMap<Option<u32>, Vec<AlbumRecord>> = BTreeMap::new();
    for album in albums {
        by_year.entry(album.year).or_default().push(album);
    }

    let mut groups: Vec<AlbumGroup> = by_year
        .into_iter()
        .map(|(year, mut albums)| {
            albums.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.key.cmp(&b.key)));
            AlbumGroup { year, albums }
        })
        .collect();

    // BTreeMap yields None first, then ascending years
    groups.reverse();
    if let Some(pos) = groups.iter().position(|g| g.year.is_none()) {
        let unknown = groups.remove(pos);
        groups.push(unknown);
    }
    groups
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::test_utils::mock_record;
    use proptest::prelude::*;

    fn files() -> impl Strategy<Value = Vec<FileRecord>> {
        prop::collection::vec((0u8..4, 1990u32..1994, 1u32..6, 1u32..3), 0..20).prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (album, year, track, disc))| FileRecord {
                    album: Some(format!("Album {album}")),
                    year: Some(year),
                    track: Some(track),
                    disc: Some(disc),
                    ..mock_record(format!("/music/{i}.flac"), 1)
                })
                .collect()
        })
    }

    proptest! {
        /// Grouping does not depend on input order
        #[test]
        fn grouping_is_order_independent(files in files(), seed in any::<u64>()) {
            let dir = tempfile::tempdir().unwrap();
            let covers = CoverCache::new(dir.path(), 400);

            let mut shuffled = files.clone();
            // Deterministic rotation keyed by the seed
            if !shuffled.is_empty() {
                let k = (seed % shuffled.len() as u64) as usize;
                shuffled.rotate_left(k);
                shuffled.reverse();
            }

            let a = group_by_year(group_into_albums(files, &covers));
            let b = group_by_year(group_into_albums(shuffled, &covers));
            prop_assert_eq!(a, b);
        }

        /// Every track lands in exactly one album, ordered by (disc, track)
        #[test]
        fn every_track_in_one_album(files in files()) {
            let dir = tempfile::tempdir().unwrap();
            let covers = CoverCache::new(dir.path(), 400);
            let count = files.len();

            let albums = group_into_albums(files, &covers);
            let total: usize = albums.iter().map(|a| a.tracks.len()).sum();
            prop_assert_eq!(total, count);

            for album in &albums {
                for pair in album.tracks.windows(2) {
                    prop_assert!(pair[0].disc_track() <= pair[1].disc_track());
                }
                for track in &album.tracks {
                    prop_assert_eq!(track.album_signature().key(), album.key.clone());
                }
            }
        }
    }
}
