//! Resize, rotate and quality-search a source image into a bounded JPEG.
//!
//! # Algorithm
//!
//! 1. Probe the image bounds (no pixel decode) and read the EXIF rotation.
//! 2. Resolve the output path through the [`ContentAddresser`] and make sure
//!    the `.compress` directory exists.
//! 3. Pick a branch:
//!    - **Panoramic** (aspect ratio of 3:1 or more): decode at full size, or
//!      at half size for sources at least 3024 wide and 4032 tall, and
//!      search against the 1 MiB budget with a quality floor of 50.
//!    - **Normal**: compute a display size from the tiered table in
//!      [`compress_display`], decode subsampled towards it, and search against
//!      the caller's budget (300 KiB by default) with a quality floor of 20.
//! 4. Rotate, save at quality 100.
//! 5. While the saved file is over budget and the quality is above the floor,
//!    re-encode ten points lower. Only the accepted buffer replaces the file.
//!
//! Every write goes through a temporary file in the output directory that is
//! renamed over the destination, so readers never observe a partial file.
//!
//! Decoded rasters and encode buffers are moved into the next step or dropped
//! explicitly as soon as they are consumed, on every path out of
//! [`Compressor::compress`], which keeps peak memory at roughly one raster
//! plus one encoded buffer.

use crate::address::ContentAddresser;
use crate::imaging::calculations::{
    compress_display, estimate_sample_size, is_panoramic, panoramic_sample_size, subsampled,
};
use crate::imaging::{BackendError, Dimensions, ImageBackend, Quality, Rotation, SizeBudget};
use image::DynamicImage;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Why a compression failed.
///
/// `Clone` so that every request coalesced onto the same computation can
/// receive the same error.
#[derive(Error, Debug, Clone)]
pub enum CompressError {
    #[error("invalid input {}: {reason}", path.display())]
    InvalidInput { path: PathBuf, reason: String },
    #[error("codec failure on {}: {message}", path.display())]
    Codec { path: PathBuf, message: String },
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: Arc<io::Error>,
    },
    #[error("the cache directory is unavailable")]
    CacheDirUnavailable,
}

impl CompressError {
    fn invalid(path: &Path, reason: impl Into<String>) -> Self {
        CompressError::InvalidInput {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| CompressError::Io {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }

    fn backend(path: &Path) -> impl FnOnce(BackendError) -> Self + '_ {
        move |err| match err {
            BackendError::Io(source) => CompressError::Io {
                path: path.to_path_buf(),
                source: Arc::new(source),
            },
            BackendError::TooLarge(reason) => CompressError::invalid(path, reason),
            other => CompressError::Codec {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        }
    }
}

/// Which path through the algorithm an image took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Normal,
    Panoramic,
}

/// Everything a compression decided and produced.
#[derive(Debug, Clone, Serialize)]
pub struct CompressReport {
    pub output: PathBuf,
    pub branch: Branch,
    /// Raw source bounds, before rotation.
    pub source: Dimensions,
    /// Size the decode aimed for, before rotation.
    pub target: Dimensions,
    pub sample_size: u32,
    pub rotation: Rotation,
    /// Dimensions of the written JPEG.
    pub output_dims: Dimensions,
    /// Budget handed to the quality search.
    pub search: SizeBudget,
    pub final_quality: Quality,
    pub bytes: u64,
}

/// The compression algorithm, bound to one backend and one output directory.
pub struct Compressor<B> {
    backend: B,
    addresser: ContentAddresser,
    normal: SizeBudget,
    panoramic: SizeBudget,
}

impl<B: ImageBackend> Compressor<B> {
    pub fn new(backend: B, addresser: ContentAddresser) -> Self {
        Self {
            backend,
            addresser,
            normal: SizeBudget::NORMAL,
            panoramic: SizeBudget::PANORAMIC,
        }
    }

    /// Override the default budgets (normal floor and default size, panoramic budget).
    pub fn with_budgets(mut self, normal: SizeBudget, panoramic: SizeBudget) -> Self {
        self.normal = normal;
        self.panoramic = panoramic;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn addresser(&self) -> &ContentAddresser {
        &self.addresser
    }

    pub fn normal_budget(&self) -> SizeBudget {
        self.normal
    }

    /// Compress against the default normal budget.
    pub fn compress(&self, source: &Path) -> Result<CompressReport, CompressError> {
        self.compress_with_budget(source, self.normal.max_bytes)
    }

    /// Compress `source` into its addressed output file.
    ///
    /// `max_bytes` bounds normal-aspect images only; panoramic images always
    /// use the panoramic budget. The result may end up somewhat larger than
    /// the budget when the quality floor is reached first.
    pub fn compress_with_budget(
        &self,
        source: &Path,
        max_bytes: u64,
    ) -> Result<CompressReport, CompressError> {
        let source_dims = self.validate(source)?;
        self.compress_identified(source, source_dims, max_bytes)
    }

    /// [`compress_with_budget`](Self::compress_with_budget) for a source the
    /// caller has already validated and identified.
    pub fn compress_identified(
        &self,
        source: &Path,
        source_dims: Dimensions,
        max_bytes: u64,
    ) -> Result<CompressReport, CompressError> {
        let rotation = self.backend.rotation(source);
        let output = self.prepare_output(source)?;

        let (branch, target, sample_size, search) =
            if is_panoramic(source_dims.width, source_dims.height) {
                let sample = panoramic_sample_size(source_dims.width, source_dims.height);
                (
                    Branch::Panoramic,
                    subsampled(source_dims, sample),
                    sample,
                    self.panoramic,
                )
            } else {
                let target = compress_display(source_dims.width, source_dims.height);
                (
                    Branch::Normal,
                    target,
                    estimate_sample_size(source_dims, target),
                    self.normal.with_max_bytes(max_bytes),
                )
            };
        log::debug!(
            "{}: {:?} branch, {}x{} -> {}x{} (sample {}), rotate {}",
            source.display(),
            branch,
            source_dims.width,
            source_dims.height,
            target.width,
            target.height,
            sample_size,
            rotation.degrees()
        );

        let decoded = self
            .backend
            .decode(source, sample_size)
            .map_err(CompressError::backend(source))?;
        let rotated = rotate(decoded, rotation);
        let output_dims = Dimensions::new(rotated.width(), rotated.height());

        let full = self
            .backend
            .encode_jpeg(&rotated, Quality::MAX)
            .map_err(CompressError::backend(&output))?;
        drop(rotated);
        write_atomic(self.addresser.compress_dir(), &output, &full)?;
        let full_len = full.len() as u64;
        drop(full);

        let (final_quality, bytes) = self.search_quality(&output, full_len, search)?;
        log::info!(
            "compress suc: {} ({} bytes, quality {})",
            output.display(),
            bytes,
            final_quality.value()
        );

        Ok(CompressReport {
            output,
            branch,
            source: source_dims,
            target,
            sample_size,
            rotation,
            output_dims,
            search,
            final_quality,
            bytes,
        })
    }

    /// Lower the quality of `output` until it fits `budget` or hits the floor.
    ///
    /// `current_len` is the size of the file as written at quality 100.
    /// Returns the accepted quality and byte size.
    fn search_quality(
        &self,
        output: &Path,
        current_len: u64,
        budget: SizeBudget,
    ) -> Result<(Quality, u64), CompressError> {
        if current_len <= budget.max_bytes {
            return Ok((Quality::MAX, current_len));
        }
        log::debug!(
            "source file size: {}, budget {}, path: {}",
            current_len,
            budget.max_bytes,
            output.display()
        );

        let image = self
            .backend
            .decode(output, 1)
            .map_err(CompressError::backend(output))?;
        let mut quality = Quality::MAX;
        let accepted = loop {
            quality = quality.step_down(budget.quality_floor);
            let encoded = self
                .backend
                .encode_jpeg(&image, quality)
                .map_err(CompressError::backend(output))?;
            log::debug!(
                "compressed size at quality {}: {}",
                quality.value(),
                encoded.len()
            );
            if quality <= budget.quality_floor || (encoded.len() as u64) < budget.max_bytes {
                break encoded;
            }
        };
        drop(image);

        write_atomic(self.addresser.compress_dir(), output, &accepted)?;
        Ok((quality, accepted.len() as u64))
    }

    /// Reject anything that is not a non-empty regular file with readable bounds.
    fn validate(&self, source: &Path) -> Result<Dimensions, CompressError> {
        let meta = match std::fs::metadata(source) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CompressError::invalid(source, "file not found"));
            }
            Err(e) => return Err(CompressError::io(source)(e)),
        };
        if !meta.is_file() || meta.len() == 0 {
            return Err(CompressError::invalid(
                source,
                "not a regular non-empty file",
            ));
        }

        let dims = self
            .backend
            .identify(source)
            .map_err(|e| CompressError::invalid(source, format!("not a decodable image: {e}")))?;
        if dims.is_empty() {
            return Err(CompressError::invalid(
                source,
                format!("image has zero size ({}x{})", dims.width, dims.height),
            ));
        }
        Ok(dims)
    }

    fn prepare_output(&self, source: &Path) -> Result<PathBuf, CompressError> {
        let dir = self.addresser.compress_dir();
        std::fs::create_dir_all(dir).map_err(CompressError::io(dir))?;
        let output = self.addresser.address_for(source);
        log::debug!("compress out file: {}", output.display());
        Ok(output)
    }
}

fn rotate(image: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::None => image,
        Rotation::Deg90 => image.rotate90(),
        Rotation::Deg180 => image.rotate180(),
        Rotation::Deg270 => image.rotate270(),
    }
}

/// Replace `path` with `bytes` in one step: temp file in `dir`, then rename.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), CompressError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(CompressError::io(dir))?;
    tmp.write_all(bytes).map_err(CompressError::io(tmp.path()))?;
    tmp.flush().map_err(CompressError::io(path))?;
    tmp.persist(path)
        .map_err(|e| CompressError::io(path)(e.error))?;
    Ok(())
}
