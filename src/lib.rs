//! # picker-compress
//!
//! The image compression layer of a media picker. A picked photo is turned
//! into a bounded-size JPEG suitable for preview and upload, once, and the
//! result is reused for every later request for the same file.
//!
//! # Pipeline
//!
//! ```text
//! CompressionRequest  ──submit──▶  TaskExecutor (worker)
//!                                       │
//!                                       ▼
//!                              CompressionCache::ensure_compressed
//!                                hit? ── passthrough? ── in flight?
//!                                       │
//!                                       ▼
//!                              Compressor (decode, rotate, quality search)
//!                                       │
//!                                       ▼
//!                         <cache>/boxing/.compress/compress-<key>.jpg
//!                                       │
//!                  MainContext::run_on_main ◀── result
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`cache_dir`] | Resolves and creates the `boxing` cache root |
//! | [`address`] | Path → cache key → output file name |
//! | [`imaging`] | Backend seam, size math, quality/budget types |
//! | [`compressor`] | Branch selection, subsampled decode, rotation, quality search |
//! | [`cache`] | Hit / passthrough / compress decision and request coalescing |
//! | [`executor`] | Bounded worker pool and the main-context dispatcher |
//! | [`request`] | Façade the picker calls, and the media record it updates |
//! | [`config`] | `picker-compress.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Path-Addressed Outputs
//!
//! Output names derive from the source *path*, not its bytes. Looking up a
//! cached result costs one `stat`, with no need to read the source. A source
//! replaced in place keeps serving the old output until the cache is cleared.
//!
//! ## Bounded Memory
//!
//! At most one decoded raster per request is alive at a time. Large sources
//! are decoded subsampled, and every intermediate buffer is released as soon
//! as the next step has consumed it.
//!
//! ## Failures Fall Back to the Original
//!
//! Nothing in the request path is fatal except a missing cache directory.
//! A failed compression is logged and the picker keeps using the source file.

pub mod address;
pub mod cache;
pub mod cache_dir;
pub mod compressor;
pub mod config;
pub mod executor;
pub mod imaging;
pub mod output;
pub mod request;

#[cfg(test)]
pub(crate) mod test_helpers;
