//! Album cover extraction and caching.
//!
//! Covers come from the first picture embedded in an audio file's tags.
//! The [`CoverCache`] stores them content-addressed: the SHA-256 of the raw
//! embedded bytes names the artifact, so identical art shared by many albums
//! is decoded, resized and encoded once.
//!
//! # Design Principles
//!
//! - **Graceful degradation**: missing or undecodable art means "no cover"
//! - **Stable identity**: renaming or moving audio files never changes a cover
//! - **No re-encode**: an artifact already on disk is reused as is

mod cache;
mod embedded;

pub use cache::CoverCache;
pub use embedded::first_embedded_picture;
