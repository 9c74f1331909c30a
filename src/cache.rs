//! Compression cache with request coalescing.
//!
//! Compressing a multi-megapixel photo takes hundreds of milliseconds and a
//! raster's worth of memory. The picker asks for the same image repeatedly
//! (preview, re-selection, upload), so [`CompressionCache`] makes sure each
//! source is compressed at most once per output lifetime.
//!
//! # Resolution order
//!
//! For a request `(source, max_bytes)`:
//!
//! 1. Another request for the same key is already running: wait for it and
//!    share its result.
//! 2. The addressed output file exists and is valid: return it (hit).
//! 3. The source is invalid (missing, empty, unreadable, not an image): fail.
//! 4. The source is already smaller than `max_bytes`: return the source path
//!    unchanged (passthrough).
//! 5. Otherwise run the [`Compressor`] and return its output.
//!
//! Steps 1 and 2 are decided under one lock, so a hit never observes an
//! output the in-flight compression is still rewriting.
//!
//! ## Coalescing
//!
//! In-flight computations are tracked in a map from [`CacheKey`] to a shared
//! `OnceLock`. Every concurrent caller blocks on the same cell and receives a
//! clone of the same `Result`. Coalesced callers share the result computed
//! with the first caller's budget. Failures are not remembered: the entry is
//! removed when the computation ends, so the next request retries.

use crate::address::CacheKey;
use crate::compressor::{CompressError, CompressReport, Compressor};
use crate::imaging::ImageBackend;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

type Shared = Arc<OnceLock<Result<Resolution, CompressError>>>;

/// How a request was satisfied.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A previously written output was reused.
    Hit(PathBuf),
    /// The source already fit the budget and is returned as-is.
    Passthrough(PathBuf),
    /// A new output was written.
    Compressed(CompressReport),
}

impl Resolution {
    /// The file the caller should use.
    pub fn path(&self) -> &Path {
        match self {
            Resolution::Hit(path) | Resolution::Passthrough(path) => path,
            Resolution::Compressed(report) => &report.output,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Resolution::Hit(path) | Resolution::Passthrough(path) => path,
            Resolution::Compressed(report) => report.output,
        }
    }
}

/// `true` when `path` exists, is a regular file, is non-empty and can be opened.
pub fn is_file_valid(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.len() > 0 && std::fs::File::open(path).is_ok(),
        Err(_) => false,
    }
}

/// Counters for cache effectiveness reporting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub passthrough: u32,
    pub encoded: u32,
    /// Requests that waited on another request's computation.
    pub coalesced: u32,
    pub failures: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.passthrough + self.encoded
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 || self.passthrough > 0 {
            write!(
                f,
                "{} cached, {} passed through, {} encoded ({} total)",
                self.hits,
                self.passthrough,
                self.encoded,
                self.total()
            )?;
        } else {
            write!(f, "{} encoded", self.encoded)?;
        }
        if self.failures > 0 {
            write!(f, ", {} failed", self.failures)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU32,
    passthrough: AtomicU32,
    encoded: AtomicU32,
    coalesced: AtomicU32,
    failures: AtomicU32,
}

fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Removes the in-flight entry when the leading request finishes, even by panic.
struct InFlightGuard<'a> {
    map: &'a Mutex<HashMap<CacheKey, Shared>>,
    key: CacheKey,
    cell: Shared,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if map
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.cell))
        {
            map.remove(&self.key);
        }
    }
}

/// Thread-safe front of a [`Compressor`]: lookup, passthrough, coalescing.
pub struct CompressionCache<B> {
    compressor: Compressor<B>,
    in_flight: Mutex<HashMap<CacheKey, Shared>>,
    counters: Counters,
}

impl<B: ImageBackend> CompressionCache<B> {
    pub fn new(compressor: Compressor<B>) -> Self {
        Self {
            compressor,
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn compressor(&self) -> &Compressor<B> {
        &self.compressor
    }

    /// Resolve `source` to a file no larger than `max_bytes` where possible.
    ///
    /// Blocks for the duration of a compression; call it from a worker, not
    /// from the thread that owns the UI.
    pub fn ensure_compressed(
        &self,
        source: &Path,
        max_bytes: u64,
    ) -> Result<Resolution, CompressError> {
        if max_bytes == 0 {
            return Err(CompressError::InvalidInput {
                path: source.to_path_buf(),
                reason: "size budget must be positive".to_string(),
            });
        }

        let addresser = self.compressor.addresser();
        let key = addresser.key_for(source);
        let output = addresser.path_for_key(&key);

        let (cell, leader) = {
            let mut in_flight = self.lock_in_flight();
            if let Some(cell) = in_flight.get(&key) {
                (Arc::clone(cell), false)
            } else if is_file_valid(&output) {
                bump(&self.counters.hits);
                log::debug!("cache hit: {}", output.display());
                return Ok(Resolution::Hit(output));
            } else {
                let cell: Shared = Arc::new(OnceLock::new());
                in_flight.insert(key.clone(), Arc::clone(&cell));
                (cell, true)
            }
        };
        let _guard = leader.then(|| InFlightGuard {
            map: &self.in_flight,
            key,
            cell: Arc::clone(&cell),
        });

        let mut computed = false;
        let result = cell.get_or_init(|| {
            computed = true;
            let result = self.resolve_uncached(source, max_bytes);
            if let Err(e) = &result {
                bump(&self.counters.failures);
                log::debug!("compression of {} failed: {}", source.display(), e);
            }
            result
        });
        if !computed {
            bump(&self.counters.coalesced);
        }
        result.clone()
    }

    fn resolve_uncached(&self, source: &Path, max_bytes: u64) -> Result<Resolution, CompressError> {
        let invalid = |reason: String| CompressError::InvalidInput {
            path: source.to_path_buf(),
            reason,
        };
        if !is_file_valid(source) {
            return Err(invalid("not a readable non-empty file".to_string()));
        }
        let dims = self
            .compressor
            .backend()
            .identify(source)
            .map_err(|e| invalid(format!("not a decodable image: {e}")))?;
        if dims.is_empty() {
            return Err(invalid("image has zero size".to_string()));
        }

        let len = std::fs::metadata(source)
            .map_err(|e| CompressError::Io {
                path: source.to_path_buf(),
                source: Arc::new(e),
            })?
            .len();
        if len < max_bytes {
            bump(&self.counters.passthrough);
            log::debug!(
                "{} is {} bytes, under {}; using it as-is",
                source.display(),
                len,
                max_bytes
            );
            return Ok(Resolution::Passthrough(source.to_path_buf()));
        }

        let report = self
            .compressor
            .compress_identified(source, dims, max_bytes)?;
        bump(&self.counters.encoded);
        Ok(Resolution::Compressed(report))
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let load = |c: &AtomicU32| c.load(Ordering::Relaxed);
        CacheStats {
            hits: load(&self.counters.hits),
            passthrough: load(&self.counters.passthrough),
            encoded: load(&self.counters.encoded),
            coalesced: load(&self.counters.coalesced),
            failures: load(&self.counters.failures),
        }
    }

    /// Number of computations currently running.
    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().len()
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<CacheKey, Shared>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
