//! Background workers and the main-context dispatcher.
//!
//! [`TaskExecutor`] owns a bounded rayon pool. Work submitted to it returns a
//! [`TaskHandle`] that can be waited on for the result; panics inside the work
//! are caught on the worker and surface as [`ExecutorError::Panicked`].
//!
//! [`MainContext`] is the counterpart for results: it is bound to the thread
//! that created it (the UI thread in the picker, the CLI's main loop here).
//! [`MainContext::run_on_main`] runs a job inline when already on that thread
//! and queues it otherwise; the owner drains the queue with
//! [`MainContext::run_pending`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("executor has been shut down")]
    ShutDown,
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was dropped before producing a result")]
    Disconnected,
    #[error("failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Bounded worker pool for compression work.
pub struct TaskExecutor {
    pool: Mutex<Option<rayon::ThreadPool>>,
    workers: usize,
}

impl TaskExecutor {
    /// Build a pool of `workers` threads named `compress-worker-N`.
    pub fn new(workers: usize) -> Result<Self, ExecutorError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("compress-worker-{i}"))
            .build()?;
        log::debug!("started {} compression workers", workers);
        Ok(Self {
            pool: Mutex::new(Some(pool)),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` on a worker thread.
    pub fn submit<T, F>(&self, work: F) -> Result<TaskHandle<T>, ExecutorError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        let pool = pool.as_ref().ok_or(ExecutorError::ShutDown)?;
        pool.spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(work)).map_err(panic_message);
            // The handle may have been dropped; nobody is waiting then
            let _ = tx.send(result);
        });
        Ok(TaskHandle { rx })
    }

    /// Stop accepting work. Jobs already submitted still run to completion.
    pub fn shutdown(&self) {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if pool.is_some() {
            log::debug!("compression workers shutting down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Result of a submitted task.
pub struct TaskHandle<T> {
    rx: Receiver<Result<T, String>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes.
    pub fn wait(self) -> Result<T, ExecutorError> {
        match self.rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(ExecutorError::Panicked(message)),
            Err(_) => Err(ExecutorError::Disconnected),
        }
    }

    /// `None` while the task is still running. The result can be taken once.
    pub fn try_wait(&self) -> Option<Result<T, ExecutorError>> {
        match self.rx.try_recv() {
            Ok(Ok(value)) => Some(Ok(value)),
            Ok(Err(message)) => Some(Err(ExecutorError::Panicked(message))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ExecutorError::Disconnected)),
        }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Dispatcher for work that must run on one particular thread.
pub struct MainContext {
    owner: ThreadId,
    sender: Sender<Job>,
    receiver: Mutex<Receiver<Job>>,
}

impl MainContext {
    /// Bind a new context to the calling thread.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            owner: thread::current().id(),
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Run `job` now if called on the owning thread, otherwise queue it.
    pub fn run_on_main<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_main_thread() {
            job();
        } else {
            // The receiver lives as long as `self`, so this cannot fail
            let _ = self.sender.send(Box::new(job));
        }
    }

    /// Run every queued job. Returns how many ran; always 0 off the owning thread.
    pub fn run_pending(&self) -> usize {
        if !self.is_main_thread() {
            log::warn!("run_pending called off the main thread; ignoring");
            return 0;
        }
        let mut ran = 0;
        while let Some(job) = self.next_job() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for a job, then run everything queued.
    pub fn run_pending_timeout(&self, timeout: Duration) -> usize {
        if !self.is_main_thread() {
            log::warn!("run_pending_timeout called off the main thread; ignoring");
            return 0;
        }
        let first = {
            let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
            match receiver.recv_timeout(timeout) {
                Ok(job) => job,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return 0,
            }
        };
        first();
        1 + self.run_pending()
    }

    // One job at a time so a job may itself call run_pending.
    fn next_job(&self) -> Option<Job> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}
