//! The entry point the picker calls: compress a selected media item.
//!
//! [`CompressionRequest`] runs [`CompressionCache::ensure_compressed`] on the
//! [`TaskExecutor`] and either blocks for the result ([`compress`]) or hands
//! it to a callback on the [`MainContext`] ([`compress_in_background`]).
//!
//! Failures never propagate to the caller as errors: they are logged and the
//! media item keeps pointing at its original file.
//!
//! [`compress`]: CompressionRequest::compress
//! [`compress_in_background`]: CompressionRequest::compress_in_background

use crate::cache::{CompressionCache, Resolution, is_file_valid};
use crate::compressor::CompressError;
use crate::executor::{ExecutorError, MainContext, TaskExecutor};
use crate::imaging::ImageBackend;
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Default budget for [`CompressionRequest`]: 1 MiB.
pub const DEFAULT_REQUEST_BUDGET: u64 = 1024 * 1024;

/// A media entity whose compressed path can be recorded.
pub trait MediaRecord {
    fn source_path(&self) -> &Path;
    fn set_compressed_path(&mut self, path: Option<PathBuf>);
}

/// A picked image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageMedia {
    pub id: String,
    pub path: PathBuf,
    /// Source size in bytes as reported by the media store.
    pub size: u64,
    pub compress_path: Option<PathBuf>,
}

impl ImageMedia {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            size,
            compress_path: None,
        }
    }

    /// The file to show or upload: the compressed copy if it is still valid.
    pub fn display_path(&self) -> &Path {
        match &self.compress_path {
            Some(path) if is_file_valid(path) => path,
            _ => &self.path,
        }
    }
}

impl MediaRecord for ImageMedia {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn set_compressed_path(&mut self, path: Option<PathBuf>) {
        self.compress_path = path;
    }
}

/// Result delivered to a background request's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionOutcome {
    Success(PathBuf),
    Failure,
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Compress(#[from] CompressError),
}

/// Schedules compressions and reports their results to media records.
pub struct CompressionRequest<B> {
    cache: Arc<CompressionCache<B>>,
    executor: Arc<TaskExecutor>,
    main: Arc<MainContext>,
    default_budget: u64,
}

impl<B: ImageBackend + 'static> CompressionRequest<B> {
    /// Background results are delivered to the thread calling `new`; use
    /// [`with_main_context`](Self::with_main_context) to share an existing one.
    pub fn new(
        cache: Arc<CompressionCache<B>>,
        executor: Arc<TaskExecutor>,
        default_budget: u64,
    ) -> Self {
        Self {
            cache,
            executor,
            main: Arc::new(MainContext::new()),
            default_budget,
        }
    }

    pub fn with_main_context(mut self, main: Arc<MainContext>) -> Self {
        self.main = main;
        self
    }

    pub fn main_context(&self) -> &Arc<MainContext> {
        &self.main
    }

    pub fn cache(&self) -> &Arc<CompressionCache<B>> {
        &self.cache
    }

    /// Compress with the default budget. May block for a long time.
    pub fn compress<M: MediaRecord + ?Sized>(&self, record: &mut M) -> bool {
        self.compress_with_budget(record, self.default_budget)
    }

    /// Compress `record` against `max_bytes`, blocking until done.
    ///
    /// On success the record's compressed path is set and `true` returned.
    /// On failure the compressed path is cleared. A zero budget is rejected
    /// up front and leaves the record untouched.
    pub fn compress_with_budget<M: MediaRecord + ?Sized>(
        &self,
        record: &mut M,
        max_bytes: u64,
    ) -> bool {
        if max_bytes == 0 {
            return false;
        }
        match self.resolve(record.source_path(), max_bytes) {
            Ok(resolution) => {
                record.set_compressed_path(Some(resolution.into_path()));
                true
            }
            Err(e) => {
                log::warn!("compress failed for {}: {}", record.source_path().display(), e);
                record.set_compressed_path(None);
                false
            }
        }
    }

    /// Run one request on a worker and wait for its full result.
    pub fn resolve(&self, source: &Path, max_bytes: u64) -> Result<Resolution, RequestError> {
        let cache = Arc::clone(&self.cache);
        let source = source.to_path_buf();
        let handle = self
            .executor
            .submit(move || cache.ensure_compressed(&source, max_bytes))?;
        Ok(handle.wait()??)
    }

    /// Compress on a worker and call `on_done` on the main context.
    ///
    /// Once scheduled, `on_done` is called exactly once, with
    /// [`CompressionOutcome::Failure`] if the compression errored or panicked.
    /// Fails only when the work cannot be scheduled, in which case `on_done`
    /// is never called.
    pub fn compress_in_background<F>(
        &self,
        source: impl Into<PathBuf>,
        max_bytes: u64,
        on_done: F,
    ) -> Result<(), ExecutorError>
    where
        F: FnOnce(CompressionOutcome) + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let main = Arc::clone(&self.main);
        let source = source.into();
        self.executor.submit(move || {
            let result = catch_unwind(AssertUnwindSafe(|| {
                cache.ensure_compressed(&source, max_bytes)
            }));
            let outcome = match result {
                Ok(Ok(resolution)) => CompressionOutcome::Success(resolution.into_path()),
                Ok(Err(e)) => {
                    log::warn!("compress failed for {}: {}", source.display(), e);
                    CompressionOutcome::Failure
                }
                Err(_) => {
                    log::warn!("compress panicked for {}", source.display());
                    CompressionOutcome::Failure
                }
            };
            main.run_on_main(move || on_done(outcome));
        })?;
        Ok(())
    }
}
