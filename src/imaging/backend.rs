//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four operations the compressor
//! needs: identify, rotation, decode and encode.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust, no system
//! libraries. Tests swap in a recording mock so the compression algorithm can
//! be verified without real pixels.

use super::params::{Dimensions, Quality, Rotation};
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    /// The decode would exceed the backend's allocation cap.
    #[error("Image too large: {0}")]
    TooLarge(String),
}

/// Trait for image processing backends.
///
/// Implementations must be shareable across worker threads: the same backend
/// instance serves every compression request of a cache.
pub trait ImageBackend: Send + Sync {
    /// Read image bounds without decoding pixels.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// EXIF rotation of the file. Best-effort: unreadable metadata is no rotation.
    fn rotation(&self, path: &Path) -> Rotation;

    /// Decode the full image, subsampled by an integer factor (1 = full size).
    fn decode(&self, path: &Path, sample_size: u32) -> Result<DynamicImage, BackendError>;

    /// Encode an image as a baseline JPEG stream in memory.
    fn encode_jpeg(&self, image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError>;
}
