//! Extract cover art embedded in audio file tags.
//!
//! Uses lofty to read picture data from:
//! - ID3v2 tags (MP3, WAV)
//! - Vorbis comments (FLAC, OGG)
//! - MP4 atoms (M4A/AAC)

use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use std::path::Path;

/// Raw bytes of the first picture embedded in the file's tags.
///
/// Returns None if no picture is embedded, the picture is empty, or the
/// file can't be read.
pub fn first_embedded_picture(path: &Path) -> Option<Vec<u8>> {
    let tagged_file = match Probe::open(path).and_then(|probe| probe.read()) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(target: "library::cover", path = %path.display(), error = %e, "Cannot read tags for cover");
            return None;
        }
    };

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())?;

    tag.pictures()
        .first()
        .map(|picture| picture.data().to_vec())
        .filter(|data| !data.is_empty())
}
