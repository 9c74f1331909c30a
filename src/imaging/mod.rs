//! Image processing, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **EXIF orientation** | `kamadak-exif` |
//! | **Decode + subsample** | `jpeg-decoder` DCT scaling or capped `image` decode, then Triangle resize |
//! | **Encode → JPEG** | `image::codecs::jpeg::JpegEncoder` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Quality, rotation, budgets, dimensions
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
pub mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use params::{Dimensions, Quality, Rotation, SizeBudget};
pub use rust_backend::RustBackend;
