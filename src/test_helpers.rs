//! Shared test utilities: synthetic image fixtures and cache setup.
//!
//! Fixtures are generated in-test with the `image` encoder so the suite has no
//! binary files to keep in sync.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let source = tmp.path().join("photo.jpg");
//! create_noise_jpeg(&source, 640, 480);
//! let cache = mock_cache(tmp.path(), MockBackend::with_dimensions(640, 480));
//! ```

use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::path::Path;
use std::sync::Arc;

use crate::address::ContentAddresser;
use crate::cache::CompressionCache;
use crate::compressor::Compressor;
use crate::imaging::ImageBackend;

// =========================================================================
// Image fixtures
// =========================================================================

/// Create a small valid JPEG with a smooth gradient.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    write_jpeg(path, &img, 90);
}

/// Create a JPEG filled with pseudo-random noise.
///
/// Noise defeats JPEG compression, so these files are large at high quality
/// and shrink steadily as quality drops: good input for the quality search.
pub fn create_noise_jpeg(path: &Path, width: u32, height: u32) {
    let mut state: u32 = 0x9E37_79B9 ^ width.wrapping_mul(31).wrapping_add(height);
    let img = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        image::Rgb([next(), next(), next()])
    });
    write_jpeg(path, &img, 100);
}

/// Create a gradient JPEG carrying an EXIF orientation tag.
pub fn write_jpeg_with_orientation(path: &Path, width: u32, height: u32, orientation: u16) {
    create_test_jpeg(path, width, height);
    let plain = std::fs::read(path).unwrap();
    std::fs::write(path, insert_orientation(&plain, orientation)).unwrap();
}

fn write_jpeg(path: &Path, img: &RgbImage, quality: u8) {
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .unwrap();
}

/// Splice a minimal EXIF APP1 segment (IFD0 with only Orientation) after SOI.
fn insert_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    let mut tiff = Vec::new();
    // Big-endian TIFF header, IFD0 at offset 8
    tiff.extend_from_slice(b"MM\x00\x2A\x00\x00\x00\x08");
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Write `len` filler bytes. The mock backend never looks at file content,
/// only at the file size the cache compares against budgets.
pub fn create_dummy_source(path: &Path, len: usize) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, vec![0xABu8; len]).unwrap();
}

// =========================================================================
// Cache setup
// =========================================================================

/// Build a cache rooted at `root` around the given backend.
pub fn mock_cache<B: ImageBackend>(root: &Path, backend: B) -> Arc<CompressionCache<B>> {
    let addresser = ContentAddresser::new(root);
    Arc::new(CompressionCache::new(Compressor::new(backend, addresser)))
}

/// Number of files currently in the `.compress` directory under `root`.
pub fn cache_file_count(root: &Path) -> usize {
    std::fs::read_dir(root.join(".compress"))
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0)
}
