//! Content-addressed cover art cache.
//!
//! Artifacts are named `<sha256-of-embedded-bytes>.png`. A new blob is
//! decoded, shrunk to fit the configured square, reduced to a representative
//! colour and written once. A blob whose artifact already exists is never
//! re-encoded: the stored PNG is decoded to recover the colour, which is
//! identical because PNG is lossless.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::embedded::first_embedded_picture;
use crate::error::Result;
use crate::model::{CoverArtifact, Rgb};

/// Cover art disk cache.
pub struct CoverCache {
    cache_dir: PathBuf,
    max_dimension: u32,
    /// Artifacts seen by this process, so repeated hits skip the disk
    known: Mutex<HashMap<String, CoverArtifact>>,
}

impl CoverCache {
    /// Create a new cache in the specified directory.
    ///
    /// The directory is created on the first write.
    pub fn new(cache_dir: impl Into<PathBuf>, max_dimension: u32) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_dimension: max_dimension.max(1),
            known: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Hash of a raw embedded picture (lowercase hex SHA-256).
    pub fn content_hash(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    /// Where the artifact for a hash lives.
    pub fn artifact_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{hash}.png"))
    }

    /// Check if an artifact is on disk.
    pub fn contains(&self, hash: &str) -> bool {
        self.artifact_path(hash).is_file()
    }

    /// Resolve the cover of an audio file: its first embedded picture.
    ///
    /// `Ok(None)` means the file has no usable picture.
    pub fn resolve(&self, audio_path: &Path) -> Result<Option<CoverArtifact>> {
        match first_embedded_picture(audio_path) {
            Some(data) => self.store(&data).map(Some),
            None => Ok(None),
        }
    }

    /// Store a raw picture blob, reusing an existing artifact with the same hash.
    pub fn store(&self, data: &[u8]) -> Result<CoverArtifact> {
        let hash = Self::content_hash(data);
        let path = self.artifact_path(&hash);

        if let Some(known) = self.known.lock().get(&hash)
            && path.is_file()
        {
            return Ok(known.clone());
        }

        let reused = if path.is_file() {
            reuse_artifact(&hash, &path)
        } else {
            None
        };
        let artifact = match reused {
            Some(artifact) => artifact,
            None => self.encode(data, &hash, path)?,
        };

        self.known.lock().insert(hash, artifact.clone());
        Ok(artifact)
    }

    fn encode(&self, data: &[u8], hash: &str, path: PathBuf) -> Result<CoverArtifact> {
        let decoded = image::load_from_memory(data)?;
        let resized = fit_within(decoded, self.max_dimension);
        let color = representative_color(&resized);

        fs::create_dir_all(&self.cache_dir)?;

        // Write atomically so a crash never leaves a truncated artifact under the final name
        let temp_path = path.with_extension("png.tmp");
        resized.save_with_format(&temp_path, ImageFormat::Png)?;
        fs::rename(&temp_path, &path)?;

        tracing::debug!(
            target: "library::cover",
            hash = %hash,
            width = resized.width(),
            height = resized.height(),
            color = %color,
            "Cached new cover"
        );
        Ok(CoverArtifact {
            hash: hash.to_string(),
            path,
            color,
        })
    }

    /// Clear all cached covers.
    pub fn clear(&self) -> std::io::Result<()> {
        self.known.lock().clear();
        if self.cache_dir.exists() {
            for entry in fs::read_dir(&self.cache_dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fs::remove_file(entry.path())?;
                }
            }
        }
        Ok(())
    }

    /// Get the total size of the cache in bytes.
    pub fn size_bytes(&self) -> u64 {
        if !self.cache_dir.exists() {
            return 0;
        }

        fs::read_dir(&self.cache_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// Recover an existing artifact. An unreadable one counts as missing.
fn reuse_artifact(hash: &str, path: &Path) -> Option<CoverArtifact> {
    match image::open(path) {
        Ok(stored) => {
            tracing::trace!(target: "library::cover", hash = %hash, "Reusing cached cover");
            Some(CoverArtifact {
                hash: hash.to_string(),
                path: path.to_path_buf(),
                color: representative_color(&stored),
            })
        }
        Err(e) => {
            tracing::warn!(
                target: "library::cover",
                path = %path.display(),
                error = %e,
                "Cached cover unreadable, re-encoding"
            );
            None
        }
    }
}

/// Shrink an image to fit inside a `max` x `max` square, keeping its aspect ratio.
fn fit_within(image: DynamicImage, max: u32) -> DynamicImage {
    if image.width() <= max && image.height() <= max {
        return image;
    }
    image.resize(max, max, FilterType::Lanczos3)
}

/// Mean colour over all pixels.
fn representative_color(image: &DynamicImage) -> Rgb {
    let rgb = image.to_rgb8();
    let count = u64::from(rgb.width()) * u64::from(rgb.height());
    if count == 0 {
        return Rgb::WHITE;
    }

    let (r, g, b) = rgb.pixels().fold((0u64, 0u64, 0u64), |(r, g, b), p| {
        (r + u64::from(p[0]), g + u64::from(p[1]), b + u64::from(p[2]))
    });
    // Each mean is at most 255, so the narrowing is lossless
    Rgb::new((r / count) as u8, (g / count) as u8, (b / count) as u8)
}
