//! Path-addressed naming for compressed outputs.
//!
//! Every source path maps to exactly one output file:
//!
//! ```text
//! <cache root>/.compress/compress-<key>.jpg
//! ```
//!
//! ## Cache keys
//!
//! The key is the first 16 bytes of the SHA-256 digest of the source path's
//! bytes, rendered as 32 lowercase hex characters. It is stable across
//! processes and runs.
//!
//! The key is derived from the **path**, not the file contents. A file that
//! is replaced in place keeps its key and will hit the previous output. That
//! keeps lookups free of I/O (no hashing megabytes of pixels per request), and
//! callers that rewrite files in place must pick a new path.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the output directory inside the cache root.
pub const COMPRESS_DIR: &str = ".compress";

const FILE_PREFIX: &str = "compress-";
const FILE_EXTENSION: &str = "jpg";
const KEY_BYTES: usize = 16;

/// Deterministic identifier of a source path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a source path.
    pub fn for_path(path: &Path) -> Self {
        let digest = Sha256::digest(path.as_os_str().as_encoded_bytes());
        Self(hex::encode(&digest[..KEY_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps source paths to output paths inside one cache root.
#[derive(Debug, Clone)]
pub struct ContentAddresser {
    compress_dir: PathBuf,
}

impl ContentAddresser {
    /// Address outputs under `<cache_root>/.compress`.
    pub fn new(cache_root: &Path) -> Self {
        Self {
            compress_dir: cache_root.join(COMPRESS_DIR),
        }
    }

    /// Directory that holds every output file.
    pub fn compress_dir(&self) -> &Path {
        &self.compress_dir
    }

    pub fn key_for(&self, source: &Path) -> CacheKey {
        CacheKey::for_path(source)
    }

    pub fn path_for_key(&self, key: &CacheKey) -> PathBuf {
        self.compress_dir
            .join(format!("{FILE_PREFIX}{key}.{FILE_EXTENSION}"))
    }

    /// Output path for a source. Pure: no filesystem access.
    pub fn address_for(&self, source: &Path) -> PathBuf {
        self.path_for_key(&self.key_for(source))
    }
}
