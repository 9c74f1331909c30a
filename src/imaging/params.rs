//! Parameter types for image operations.
//!
//! These types describe *what* the compressor should do, not *how* the pixels
//! get pushed around. They sit between the [`compressor`](crate::compressor)
//! (which decides sizes, budgets and qualities) and the
//! [`backend`](super::backend) (which decodes and encodes).
//!
//! ## Types
//!
//! - [`Quality`]: JPEG encoding quality (1–100). Clamped on construction.
//! - [`Rotation`]: Clockwise rotation recorded in the EXIF orientation tag.
//! - [`SizeBudget`]: Target byte ceiling plus the quality floor the search stops at.
//! - [`Dimensions`]: Pixel width/height pair.

use serde::Serialize;

/// Quality setting for lossy JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Quality(pub u32);

impl Quality {
    /// Quality used for the first, full-fidelity save.
    pub const MAX: Quality = Quality(100);

    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Next quality in the search: ten lower, but never below `floor`.
    pub fn step_down(self, floor: Quality) -> Quality {
        Quality::new(self.0.saturating_sub(10)).max(floor)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::MAX
    }
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn is_landscape(self) -> bool {
        self.width > self.height
    }
}

/// Clockwise rotation needed to display an image upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Rotation {
    #[default]
    None,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Map an EXIF orientation tag value to a rotation.
    ///
    /// Only the pure rotations are honoured (3, 6, 8); mirrored orientations
    /// and unknown values fall back to no rotation.
    pub fn from_exif_orientation(value: u32) -> Self {
        match value {
            3 => Rotation::Deg180,
            6 => Rotation::Deg90,
            8 => Rotation::Deg270,
            _ => Rotation::None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Whether applying this rotation swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Byte ceiling for an encoded output and the lowest quality the search may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeBudget {
    pub max_bytes: u64,
    pub quality_floor: Quality,
}

impl SizeBudget {
    /// Budget for near-square and ordinary aspect ratios.
    pub const NORMAL: SizeBudget = SizeBudget {
        max_bytes: 300 * 1024,
        quality_floor: Quality(20),
    };

    /// Budget for images with an aspect ratio of 3:1 or wider.
    pub const PANORAMIC: SizeBudget = SizeBudget {
        max_bytes: 1024 * 1024,
        quality_floor: Quality(50),
    };

    pub fn new(max_bytes: u64, quality_floor: u32) -> Self {
        Self {
            max_bytes,
            quality_floor: Quality::new(quality_floor),
        }
    }

    pub fn with_max_bytes(self, max_bytes: u64) -> Self {
        Self { max_bytes, ..self }
    }
}
