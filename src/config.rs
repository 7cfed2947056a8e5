use std::time::Duration;

use crate::error::{SliceError, SliceResult};

/// Default bound on the graceful phase of worker-runtime shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Default prefix for worker thread names; a counter is appended per thread.
const DEFAULT_THREAD_NAME: &str = "slice-resolver";

/// Upper bound on configured worker threads.
///
/// Resolution is I/O-bound; more workers than this only add scheduling
/// overhead.
const WORKER_THREADS_MAX: usize = 64;

/// Options for constructing a [`StreamSliceManager`] and its worker runtime.
///
/// [`StreamSliceManager`]: crate::StreamSliceManager
#[derive(Debug, Clone)]
pub struct SliceManagerConfig {
    /// Number of worker threads for blocking resolution (None = automatic).
    pub worker_threads: Option<usize>,
    /// Prefix for worker thread names.
    pub thread_name: String,
    /// Maximum time to wait for graceful runtime shutdown before forcing.
    pub shutdown_timeout: Duration,
}

impl Default for SliceManagerConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

impl SliceManagerConfig {
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate and clamp the configuration.
    ///
    /// Worker counts are clamped to `1..=64`; an empty thread name is
    /// rejected rather than silently producing anonymous workers.
    pub fn normalized(&self) -> SliceResult<Self> {
        if self.thread_name.is_empty() {
            return Err(SliceError::invalid_config("thread name must not be empty"));
        }
        Ok(Self {
            worker_threads: self
                .worker_threads
                .map(|threads| threads.clamp(1, WORKER_THREADS_MAX)),
            thread_name: self.thread_name.clone(),
            shutdown_timeout: self.shutdown_timeout,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::default()
            .with_worker_threads(2)
            .with_shutdown_timeout(Duration::from_secs(1))
    }
}
