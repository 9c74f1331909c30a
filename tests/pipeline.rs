//! End-to-end compression through the real `image`/`kamadak-exif` backend.
//!
//! Fixtures are synthesized per test. The full-size camera scenario is slow
//! in debug builds and is ignored by default:
//!
//! Run with: cargo test --test pipeline -- --include-ignored

use image::{ExtendedColorType, ImageEncoder, RgbImage};
use picker_compress::cache::{CompressionCache, Resolution};
use picker_compress::cache_dir::{CacheDirectory, FixedCacheRoot};
use picker_compress::compressor::{Branch, CompressError, Compressor};
use picker_compress::executor::TaskExecutor;
use picker_compress::imaging::{Quality, RustBackend, SizeBudget};
use picker_compress::request::{CompressionRequest, ImageMedia};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// =========================================================================
// Fixtures
// =========================================================================

fn write_jpeg(path: &Path, img: &RgbImage, quality: u8) {
    let file = std::fs::File::create(path).unwrap();
    image::codecs::jpeg::JpegEncoder::new_with_quality(std::io::BufWriter::new(file), quality)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .unwrap();
}

fn gradient_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 96])
    });
    write_jpeg(path, &img, 90);
}

fn noise_jpeg(path: &Path, width: u32, height: u32) {
    let mut state: u32 = 0x2545_F491;
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

/// Gradient JPEG with an EXIF APP1 segment holding only the orientation tag.
fn oriented_jpeg(path: &Path, width: u32, height: u32, orientation: u16) {
    gradient_jpeg(path, width, height);
    let plain = std::fs::read(path).unwrap();

    let mut tiff = b"MM\x00\x2A\x00\x00\x00\x08".to_vec();
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    let mut app1 = b"Exif\0\0".to_vec();
    app1.extend_from_slice(&tiff);

    let mut out = plain[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((app1.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&app1);
    out.extend_from_slice(&plain[2..]);
    std::fs::write(path, out).unwrap();
}

fn real_cache(root: &Path) -> Arc<CompressionCache<RustBackend>> {
    limited_cache(root, RustBackend::new())
}

fn limited_cache(root: &Path, backend: RustBackend) -> Arc<CompressionCache<RustBackend>> {
    let dir = CacheDirectory::resolve(&FixedCacheRoot(root.to_path_buf())).unwrap();
    Arc::new(CompressionCache::new(Compressor::new(backend, dir.addresser())))
}

fn decoded_dims(path: &Path) -> (u32, u32) {
    let img = image::open(path).unwrap();
    (img.width(), img.height())
}

// =========================================================================
// Compression
// =========================================================================

#[test]
fn compressed_output_is_a_jpeg() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("photo.jpg");
    gradient_jpeg(&source, 800, 600);
    let cache = real_cache(&tmp.path().join("cache"));

    let Resolution::Compressed(report) = cache.ensure_compressed(&source, 1).unwrap() else {
        panic!("expected a compression");
    };
    assert_eq!(report.branch, Branch::Normal);
    assert!(report.output.starts_with(tmp.path().join("cache/boxing/.compress")));

    let bytes = std::fs::read(&report.output).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);
    assert_eq!(bytes.len() as u64, report.bytes);
    assert_eq!(decoded_dims(&report.output), (800, 600));
}

#[test]
fn compression_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("photo.jpg");
    noise_jpeg(&source, 320, 240);

    let first = real_cache(&tmp.path().join("a"))
        .ensure_compressed(&source, 1)
        .unwrap();
    let second = real_cache(&tmp.path().join("b"))
        .ensure_compressed(&source, 1)
        .unwrap();

    assert_eq!(
        first.path().file_name(),
        second.path().file_name(),
        "same source path must map to the same key"
    );
    assert_eq!(
        std::fs::read(first.path()).unwrap(),
        std::fs::read(second.path()).unwrap()
    );
}

#[test]
fn exif_rotation_swaps_output_axes() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("portrait.jpg");
    oriented_jpeg(&source, 40, 20, 6);
    let cache = real_cache(tmp.path());

    let resolution = cache.ensure_compressed(&source, 1).unwrap();
    assert_eq!(decoded_dims(resolution.path()), (20, 40));
}

#[test]
fn budget_or_floor_is_reached() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("noise.jpg");
    noise_jpeg(&source, 400, 300);
    let cache = real_cache(tmp.path());
    let budget = 60_000;

    let Resolution::Compressed(report) = cache.ensure_compressed(&source, budget).unwrap() else {
        panic!("noise at quality 100 is never under budget");
    };
    assert!(report.bytes < budget || report.final_quality == Quality(20));
    assert!(report.final_quality >= Quality(20));
}

#[test]
fn panorama_uses_panoramic_budget() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("pano.jpg");
    gradient_jpeg(&source, 1500, 400);
    let cache = real_cache(tmp.path());

    let Resolution::Compressed(report) = cache.ensure_compressed(&source, 1).unwrap() else {
        panic!("expected a compression");
    };
    assert_eq!(report.branch, Branch::Panoramic);
    assert_eq!(report.search, SizeBudget::PANORAMIC);
    assert_eq!(decoded_dims(&report.output), (1500, 400));
}

#[test]
fn second_request_is_a_hit() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("photo.jpg");
    gradient_jpeg(&source, 200, 200);
    let cache = real_cache(tmp.path());

    let first = cache.ensure_compressed(&source, 1).unwrap();
    let second = cache.ensure_compressed(&source, 1).unwrap();
    assert!(matches!(second, Resolution::Hit(_)));
    assert_eq!(first.path(), second.path());
}

#[test]
fn small_source_is_used_as_is() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("tiny.jpg");
    gradient_jpeg(&source, 32, 32);
    let cache = real_cache(tmp.path());

    let resolution = cache.ensure_compressed(&source, 1024 * 1024).unwrap();
    assert!(matches!(&resolution, Resolution::Passthrough(p) if p == &source));
}

// =========================================================================
// Decode memory
// =========================================================================

/// Backend capped at 4 MiB: a 2048x1536 RGB raster (9 MiB) never fits, the
/// 1024x768 display target (2.25 MiB) does.
fn four_mib_backend() -> RustBackend {
    RustBackend::new().with_max_alloc(4 * 1024 * 1024)
}

#[test]
fn large_jpeg_is_decoded_prescaled() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("large.jpg");
    gradient_jpeg(&source, 2048, 1536);
    let cache = limited_cache(tmp.path(), four_mib_backend());

    let Resolution::Compressed(report) = cache.ensure_compressed(&source, 1).unwrap() else {
        panic!("expected a compression");
    };
    assert_eq!(report.sample_size, 2);
    assert_eq!(decoded_dims(&report.output), (1024, 768));
}

#[test]
fn large_png_over_decode_limit_is_invalid() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("large.png");
    RgbImage::from_fn(2048, 1536, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 0]))
        .save(&source)
        .unwrap();
    let cache = limited_cache(tmp.path(), four_mib_backend());

    let result = cache.ensure_compressed(&source, 1);
    assert!(matches!(result, Err(CompressError::InvalidInput { .. })));
    let output = cache.compressor().addresser().address_for(&source);
    assert!(!output.exists());
}

// =========================================================================
// Invalid input
// =========================================================================

#[test]
fn garbage_is_rejected_without_output() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("fake.jpg");
    std::fs::write(&source, b"this is a text file wearing a .jpg extension").unwrap();
    let cache = real_cache(tmp.path());

    let result = cache.ensure_compressed(&source, 1024 * 1024);
    assert!(matches!(result, Err(CompressError::InvalidInput { .. })));
    assert!(!tmp.path().join("boxing/.compress").exists());
}

#[test]
fn missing_source_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let cache = real_cache(tmp.path());
    let result = cache.ensure_compressed(&tmp.path().join("nope.jpg"), 1);
    assert!(matches!(result, Err(CompressError::InvalidInput { .. })));
}

// =========================================================================
// Façade
// =========================================================================

#[test]
fn request_updates_media_record() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("picked.jpg");
    gradient_jpeg(&source, 640, 480);
    let size = std::fs::metadata(&source).unwrap().len();
    let executor = Arc::new(TaskExecutor::new(2).unwrap());
    let request = CompressionRequest::new(real_cache(tmp.path()), executor, 1);

    let mut media = ImageMedia::new("42", &source, size);
    assert!(request.compress(&mut media));

    let compressed = media.compress_path.clone().unwrap();
    assert_ne!(compressed, source);
    assert_eq!(media.display_path(), compressed);
    assert_eq!(decoded_dims(&compressed), (640, 480));
}

// =========================================================================
// Full-size camera scenario
// =========================================================================

#[test]
#[ignore]
fn camera_photo_fits_normal_budget() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("IMG_4000x3000.jpg");
    noise_jpeg(&source, 4000, 3000);
    let cache = real_cache(tmp.path());

    let Resolution::Compressed(report) = cache
        .ensure_compressed(&source, SizeBudget::NORMAL.max_bytes)
        .unwrap()
    else {
        panic!("expected a compression");
    };
    assert_eq!(report.sample_size, 2);
    assert_eq!(decoded_dims(&report.output), (2000, 1500));
    assert!(
        report.bytes <= SizeBudget::NORMAL.max_bytes || report.final_quality == Quality(20)
    );
}

/// 16320x12240: the full RGB raster (~571 MiB) is over the default decode
/// cap, the DCT-scaled one is not.
#[test]
#[ignore]
fn two_hundred_megapixel_jpeg_compresses() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("IMG_16320x12240.jpg");
    gradient_jpeg(&source, 16320, 12240);
    let cache = real_cache(tmp.path());

    let Resolution::Compressed(report) = cache
        .ensure_compressed(&source, SizeBudget::NORMAL.max_bytes)
        .unwrap()
    else {
        panic!("expected a compression");
    };
    assert_eq!(report.sample_size, 12);
    assert_eq!(decoded_dims(&report.output), (1360, 1020));
}
