//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::Dimensions;

/// Aspect ratio (long edge over short edge, integer division) at which an
/// image takes the panoramic branch.
const PANORAMIC_RATIO: u32 = 3;

/// Portrait sensor class (width, height) at which panoramic decodes are halved.
const LARGE_SENSOR: (u32, u32) = (3024, 4032);

/// Returns `true` for images whose long edge is at least three times the short edge.
///
/// Integer division, so a 2.9:1 strip is still treated as a normal image.
pub fn is_panoramic(width: u32, height: u32) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    width / height >= PANORAMIC_RATIO || height / width >= PANORAMIC_RATIO
}

/// Compute the downscaled display size for a normal-aspect image.
///
/// Both edges are first rounded up to even numbers. The divisor is picked from
/// a tiered table keyed by the long edge, so perceptual quality stays roughly
/// constant across very different source resolutions:
///
/// | short/long ratio | long edge | divisor |
/// |---|---|---|
/// | `[0.5625, 1]` | `< 1664` | 1 |
/// | | `1664..4990` | 2 |
/// | | `4990..10240` | 4 |
/// | | `>= 10240` | `max(1, long / 1280)` |
/// | `(0.5, 0.5625)` | `< 1280` | 1 |
/// | | `>= 1280` | `max(1, long / 1280)` |
/// | `<= 0.5` | any | `ceil(long / (1280 / ratio))` |
///
/// The result keeps the source orientation: a landscape source yields a
/// landscape target.
///
/// # Examples
/// ```
/// # use picker_compress::imaging::calculations::compress_display;
/// # use picker_compress::imaging::Dimensions;
/// assert_eq!(compress_display(4000, 3000), Dimensions::new(2000, 1500));
/// assert_eq!(compress_display(1000, 1000), Dimensions::new(1000, 1000));
/// ```
pub fn compress_display(width: u32, height: u32) -> Dimensions {
    let even_w = round_up_even(width);
    let even_h = round_up_even(height);
    let short = even_w.min(even_h);
    let long = even_w.max(even_h);
    let ratio = short as f64 / long as f64;

    let divisor = if (0.5625..=1.0).contains(&ratio) {
        match long {
            0..1664 => 1,
            1664..4990 => 2,
            4990..10240 => 4,
            _ => (long / 1280).max(1),
        }
    } else if ratio > 0.5 {
        if long < 1280 { 1 } else { (long / 1280).max(1) }
    } else {
        (long as f64 / (1280.0 / ratio)).ceil().max(1.0) as u32
    };

    let (short, long) = (short / divisor, long / divisor);
    if even_w > even_h {
        Dimensions::new(long, short)
    } else {
        Dimensions::new(short, long)
    }
}

/// Estimate the decoder sample size needed to bring `source` down to `target`.
///
/// Starts with the largest power of two that keeps both halved edges above
/// the target, then refines it to the exact ratio: the larger of
/// `ceil(h / th)` and `ceil(w / tw)` when either exceeds one.
pub fn estimate_sample_size(source: Dimensions, target: Dimensions) -> u32 {
    if target.is_empty() {
        return 1;
    }
    let mut sample = 1;
    if source.height > target.height || source.width > target.width {
        let half_h = source.height / 2;
        let half_w = source.width / 2;
        while half_h / sample > target.height && half_w / sample > target.width {
            sample *= 2;
        }
    }

    let height_ratio = source.height.div_ceil(target.height);
    let width_ratio = source.width.div_ceil(target.width);
    if height_ratio > 1 || width_ratio > 1 {
        sample = height_ratio.max(width_ratio);
    }
    sample.max(1)
}

/// Sample size for the panoramic branch: 2 when the raw bounds are at least
/// 3024 wide and 4032 tall, else 1.
///
/// The check is orientation-sensitive: a landscape 12000×3024 strip is
/// decoded at full size.
pub fn panoramic_sample_size(width: u32, height: u32) -> u32 {
    if width >= LARGE_SENSOR.0 && height >= LARGE_SENSOR.1 {
        2
    } else {
        1
    }
}

/// Dimensions after decoding with an integer sample size.
pub fn subsampled(source: Dimensions, sample: u32) -> Dimensions {
    let sample = sample.max(1);
    Dimensions::new(
        (source.width / sample).max(1),
        (source.height / sample).max(1),
    )
}

/// Saturates at `u32::MAX`, which a forged header can declare.
fn round_up_even(value: u32) -> u32 {
    value.saturating_add(value & 1)
}
