use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::SliceManagerConfig;
use crate::error::{SliceError, SliceResult};

/// Worker runtime that executes blocking slice resolution off
/// latency-sensitive threads, with coordinated two-phase shutdown.
///
/// Resolution calls block on network I/O against the storage backend, so
/// they run on this runtime's named worker threads rather than on request
/// handlers. Shutdown is two-phase: stop accepting work and wait up to the
/// configured timeout for in-flight tasks, then force-terminate whatever
/// remains. `Drop` runs the same sequence, so forced termination happens on
/// every exit path.
pub struct SliceRuntime {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl SliceRuntime {
    /// Build a runtime from the manager configuration: worker count, thread
    /// name prefix (a per-thread counter is appended), shutdown timeout.
    pub fn create(config: &SliceManagerConfig) -> SliceResult<Self> {
        let config = config.normalized()?;
        let mut builder = Builder::new_multi_thread();
        builder.enable_all();
        if let Some(threads) = config.worker_threads {
            builder.worker_threads(threads.max(1));
        }
        let prefix = config.thread_name.clone();
        let thread_epoch = Arc::new(AtomicU64::new(0));
        builder.thread_name_fn(move || {
            let n = thread_epoch.fetch_add(1, Ordering::AcqRel);
            format!("{prefix}-{n}")
        });
        let runtime = builder
            .build()
            .map_err(|err| SliceError::internal(format!("failed to build worker runtime: {err}")))?;
        Ok(Self::from_runtime(runtime, config.shutdown_timeout))
    }

    /// Wrap an existing runtime, taking over its shutdown.
    pub fn from_runtime(runtime: Runtime, shutdown_timeout: Duration) -> Self {
        let handle = runtime.handle().clone();
        Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Run a blocking closure on a worker thread and return its join handle.
    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(f)
    }

    /// Fire-and-forget variant for background work: an uncaught task
    /// failure (panic or cancellation) is logged, never rethrown.
    pub fn execute<F>(&self, task_name: &'static str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.handle.spawn_blocking(f);
        self.handle.spawn(async move {
            if let Err(err) = task.await {
                error!(task = task_name, %err, "uncaught failure in worker task");
            }
        });
    }

    pub fn shutdown(&self) {
        self.shutdown_inner();
    }

    /// Cancel the shutdown token, then terminate the runtime. When called
    /// from within an async context the runtime cannot be torn down in
    /// place, so it is shut down in the background instead of waiting.
    fn shutdown_inner(&self) {
        if !self.shutdown_token.is_cancelled() {
            self.shutdown_token.cancel();
        }
        let mut guard = self.runtime.lock();
        if let Some(runtime) = guard.take() {
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(self.shutdown_timeout);
            }
        }
    }
}

impl Drop for SliceRuntime {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn spawn_blocking_runs_on_named_worker() {
        let config = SliceManagerConfig::for_tests().with_thread_name("slice-test");
        let runtime = SliceRuntime::create(&config).expect("create runtime");
        let name = runtime
            .handle()
            .block_on(runtime.spawn_blocking(|| {
                std::thread::current().name().map(str::to_string)
            }))
            .expect("join");
        assert!(name.expect("thread name").starts_with("slice-test-"));
    }

    #[test]
    fn shutdown_is_idempotent_and_cancels_token() {
        let runtime =
            SliceRuntime::create(&SliceManagerConfig::for_tests()).expect("create runtime");
        let token = runtime.shutdown_token();
        assert!(!token.is_cancelled());
        runtime.shutdown();
        runtime.shutdown();
        assert!(token.is_cancelled());
    }

    #[test]
    fn execute_swallows_panics() {
        static RAN: AtomicBool = AtomicBool::new(false);
        let runtime =
            SliceRuntime::create(&SliceManagerConfig::for_tests()).expect("create runtime");
        runtime.execute("panicking-task", || panic!("boom"));
        runtime.execute("follow-up", || {
            RAN.store(true, Ordering::Release);
        });
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !RAN.load(Ordering::Acquire) {
            assert!(std::time::Instant::now() < deadline, "follow-up never ran");
            std::thread::sleep(Duration::from_millis(5));
        }
        runtime.shutdown();
    }
}
