//! Resolution of the on-disk cache root.
//!
//! A [`CacheRootProvider`] hands out the platform (or configured) cache
//! directory; [`CacheDirectory::resolve`] appends the `boxing` sub-directory,
//! creates it, and treats a missing root as a fatal configuration error.

use crate::address::{COMPRESS_DIR, ContentAddresser};
use crate::compressor::CompressError;
use std::path::{Path, PathBuf};

/// Sub-directory of the provider's root owned by this crate.
const CACHE_SUBDIR: &str = "boxing";

/// Source of the directory cache files live under.
pub trait CacheRootProvider {
    /// `None` when the underlying storage is unavailable.
    fn cache_root(&self) -> Option<PathBuf>;
}

/// The per-user platform cache directory (`$XDG_CACHE_HOME`, `~/Library/Caches`, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCacheRoot;

impl CacheRootProvider for SystemCacheRoot {
    fn cache_root(&self) -> Option<PathBuf> {
        dirs::cache_dir()
    }
}

/// A fixed directory, typically from configuration or the command line.
#[derive(Debug, Clone)]
pub struct FixedCacheRoot(pub PathBuf);

impl CacheRootProvider for FixedCacheRoot {
    fn cache_root(&self) -> Option<PathBuf> {
        if self.0.as_os_str().is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}

/// Process-local directory dedicated to compressed output.
#[derive(Debug, Clone)]
pub struct CacheDirectory {
    root: PathBuf,
}

impl CacheDirectory {
    /// Resolve and create `<provider root>/boxing`.
    pub fn resolve(provider: &dyn CacheRootProvider) -> Result<Self, CompressError> {
        let base = provider
            .cache_root()
            .ok_or(CompressError::CacheDirUnavailable)?;
        let root = base.join(CACHE_SUBDIR);
        std::fs::create_dir_all(&root).map_err(|source| CompressError::Io {
            path: root.clone(),
            source: source.into(),
        })?;
        log::debug!("cache dir is: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where compressed outputs are written. Not created until first use.
    pub fn compress_dir(&self) -> PathBuf {
        self.root.join(COMPRESS_DIR)
    }

    pub fn addresser(&self) -> ContentAddresser {
        ContentAddresser::new(&self.root)
    }
}
