//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Subsampled JPEG decode | `jpeg-decoder` (`Decoder::scale`, 1/2 to 1/8 in the DCT domain) |
//! | Decode (PNG, TIFF, WebP, full-size JPEG) | `image` crate (pure Rust decoders) |
//! | Subsample | `image::imageops::resize` with `Triangle` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | EXIF orientation | `kamadak-exif` (`exif::Reader`) |
//!
//! ## Decode memory
//!
//! Every decode is capped at [`DEFAULT_MAX_ALLOC`] bytes (see
//! [`RustBackend::with_max_alloc`]). Subsampled JPEG decodes only allocate the
//! scaled raster, so very large camera files stay within the cap. Other
//! formats are decoded at full size first; a source whose full raster exceeds
//! the cap fails with [`BackendError::TooLarge`].
//!
//! Progressive JPEGs buffer their coefficients at full resolution regardless
//! of the output scale.

use super::backend::{BackendError, ImageBackend};
use super::calculations::subsampled;
use super::params::{Dimensions, Quality, Rotation};
use image::codecs::jpeg::JpegEncoder;
use image::error::ImageError;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, Limits, RgbImage};
use jpeg_decoder::PixelFormat;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Whether `path` has one of the [supported extensions](supported_input_extensions).
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            let e = e.to_ascii_lowercase();
            supported_input_extensions().contains(&e.as_str())
        })
}

/// Decode allocation cap, the same 512 MiB the `image` crate applies by default.
pub const DEFAULT_MAX_ALLOC: u64 = 512 * 1024 * 1024;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    max_alloc: u64,
}

impl RustBackend {
    pub fn new() -> Self {
        Self {
            max_alloc: DEFAULT_MAX_ALLOC,
        }
    }

    /// Cap the memory a single decode may allocate.
    pub fn with_max_alloc(mut self, bytes: u64) -> Self {
        self.max_alloc = bytes;
        self
    }

    pub fn max_alloc(&self) -> u64 {
        self.max_alloc
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_alloc);
        limits
    }

    /// Full-size decode through the `image` crate under the allocation cap.
    fn decode_full(&self, path: &Path) -> Result<DynamicImage, BackendError> {
        let mut reader = open_reader(path)?;
        reader.limits(self.limits());
        reader.decode().map_err(|e| match e {
            ImageError::Limits(_) => BackendError::TooLarge(format!(
                "{} does not fit the {} byte decode limit",
                path.display(),
                self.max_alloc
            )),
            e => BackendError::Decode(format!("Failed to decode {}: {}", path.display(), e)),
        })
    }

    /// Decode a JPEG pre-scaled towards `1 / sample_size` of its bounds.
    ///
    /// `jpeg-decoder` picks the smallest DCT scale (1, 1/2, 1/4 or 1/8) that
    /// still covers the target, so only the scaled raster is allocated.
    /// Returns `None` for pixel formats it cannot hand over as RGB or luma
    /// (CMYK, 16-bit lossless); the caller falls back to [`Self::decode_full`].
    fn decode_jpeg_scaled(
        &self,
        path: &Path,
        sample_size: u32,
    ) -> Result<Option<DynamicImage>, BackendError> {
        let jpeg_error = |e: jpeg_decoder::Error| {
            BackendError::Decode(format!("Failed to decode {}: {}", path.display(), e))
        };
        let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(File::open(path)?));
        decoder.set_max_decoding_buffer_size(usize::try_from(self.max_alloc).unwrap_or(usize::MAX));
        decoder.read_info().map_err(jpeg_error)?;
        let Some(info) = decoder.info() else {
            return Ok(None);
        };
        if !matches!(info.pixel_format, PixelFormat::RGB24 | PixelFormat::L8) {
            return Ok(None);
        }

        let source = Dimensions::new(u32::from(info.width), u32::from(info.height));
        let target = subsampled(source, sample_size);
        let edge = |v: u32| u16::try_from(v).unwrap_or(u16::MAX);
        let (width, height) = decoder
            .scale(edge(target.width), edge(target.height))
            .map_err(jpeg_error)?;
        let (width, height) = (u32::from(width), u32::from(height));

        let raster = u64::from(width) * u64::from(height) * info.pixel_format.pixel_bytes() as u64;
        if raster > self.max_alloc {
            return Err(BackendError::TooLarge(format!(
                "{} needs {} bytes at {}x{}, over the {} byte decode limit",
                path.display(),
                raster,
                width,
                height,
                self.max_alloc
            )));
        }

        let pixels = decoder.decode().map_err(jpeg_error)?;
        let image = match info.pixel_format {
            PixelFormat::L8 => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
            _ => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        }
        .ok_or_else(|| {
            BackendError::Decode(format!(
                "Decoded buffer of {} does not match {}x{}",
                path.display(),
                width,
                height
            ))
        })?;
        log::debug!(
            "{}: DCT-scaled decode {}x{} -> {}x{}, target {}x{}",
            path.display(),
            source.width,
            source.height,
            width,
            height,
            target.width,
            target.height
        );

        if (image.width(), image.height()) == (target.width, target.height) {
            Ok(Some(image))
        } else {
            Ok(Some(image.resize_exact(target.width, target.height, FilterType::Triangle)))
        }
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Open an image with content-sniffed format detection.
///
/// Sniffing instead of trusting the extension lets cache files (always
/// `.jpg`) and extension-less picker paths decode the same way.
fn open_reader(path: &Path) -> Result<ImageReader<BufReader<File>>, BackendError> {
    let reader = ImageReader::open(path)?;
    Ok(reader.with_guessed_format()?)
}

fn read_orientation(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0)
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = open_reader(path)?.into_dimensions().map_err(|e| {
            BackendError::Decode(format!("Failed to read dimensions of {}: {}", path.display(), e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn rotation(&self, path: &Path) -> Rotation {
        read_orientation(path)
            .map(Rotation::from_exif_orientation)
            .unwrap_or_default()
    }

    fn decode(&self, path: &Path, sample_size: u32) -> Result<DynamicImage, BackendError> {
        if sample_size > 1 && open_reader(path)?.format() == Some(ImageFormat::Jpeg) {
            if let Some(img) = self.decode_jpeg_scaled(path, sample_size)? {
                return Ok(img);
            }
        }
        let img = self.decode_full(path)?;
        if sample_size <= 1 {
            return Ok(img);
        }
        let target = subsampled(Dimensions::new(img.width(), img.height()), sample_size);
        // The full-size buffer is dropped as soon as the subsampled copy exists
        Ok(img.resize_exact(target.width, target.height, FilterType::Triangle))
    }

    fn encode_jpeg(&self, image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.value() as u8);
        // JPEG has no alpha channel; flatten anything that is not plain RGB/luma
        let result = match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => {
                image.write_with_encoder(encoder)
            }
            other => DynamicImage::ImageRgb8(other.to_rgb8()).write_with_encoder(encoder),
        };
        result.map_err(|e| BackendError::Encode(format!("JPEG encode failed: {}", e)))?;
        Ok(buffer)
    }
}
