use std::num::NonZeroUsize;
use std::thread::available_parallelism;

use compio::dispatcher::{Dispatcher, DispatcherBuilder};
use futures_channel::oneshot::{Canceled, Receiver};
use snafu::{ResultExt, Snafu};
use tracing::debug;

/// Default number of worker threads when unable to determine system parallelism
const DEFAULT_WORKER_THREADS: NonZeroUsize = NonZeroUsize::MIN;

/// Bounded pool of worker threads for background enrichment.
///
/// Owned by whoever composes the application and lent to the components that
/// schedule work on it.
pub struct WorkerPool {
    dispatcher: Dispatcher,
    workers: NonZeroUsize,
}

impl WorkerPool {
    /// Creates a pool with `workers` threads, or one per available core.
    pub fn new(workers: Option<NonZeroUsize>) -> Result<Self, WorkerPoolError> {
        let workers = workers.unwrap_or_else(Self::determine_worker_count);
        debug!("Using {} worker threads for background identification", workers);

        let dispatcher = DispatcherBuilder::new()
            .worker_threads(workers)
            .build()
            .context(DispatcherSnafu)?;

        Ok(Self {
            dispatcher,
            workers,
        })
    }

    /// Determines the optimal number of worker threads
    pub fn determine_worker_count() -> NonZeroUsize {
        available_parallelism().unwrap_or(DEFAULT_WORKER_THREADS)
    }

    pub fn workers(&self) -> NonZeroUsize {
        self.workers
    }

    /// Runs `job` on a worker thread. The returned handle resolves once it
    /// has finished.
    pub fn submit<F, R>(&self, label: impl Into<String>, job: F) -> Result<TaskHandle<R>, WorkerPoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let label = label.into();
        let receiver = self
            .dispatcher
            .dispatch(move || async move { job() })
            .map_err(|e| WorkerPoolError::DispatchError {
                label: label.clone(),
                error: e.to_string(),
            })?;
        debug!("Dispatched '{}'", label);

        Ok(TaskHandle { label, receiver })
    }
}

/// Completion handle for a job submitted to a [`WorkerPool`].
pub struct TaskHandle<R> {
    label: String,
    receiver: Receiver<R>,
}

impl<R> TaskHandle<R> {
    /// Waits for the job. Fails only if the worker dropped it without
    /// finishing, e.g. because the job panicked.
    pub async fn wait(self) -> Result<R, WorkerPoolError> {
        self.receiver.await.context(CanceledSnafu { label: self.label })
    }
}

#[derive(Debug, Snafu)]
pub enum WorkerPoolError {
    #[snafu(display("Failed to create worker dispatcher"))]
    DispatcherError { source: std::io::Error },
    #[snafu(display("Failed to dispatch '{}': {}", label, error))]
    DispatchError { label: String, error: String },
    #[snafu(display("'{}' got cancelled", label))]
    CanceledError { label: String, source: Canceled },
}
