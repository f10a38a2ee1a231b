use std::panic::{self, AssertUnwindSafe};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::error;

use crate::consts::TASKS_PER_THREAD;
use crate::error::{DeconError, Result};

/// Fixed-size worker pool shared by block copy/paste and the Fourier steps.
///
/// Every call is synchronous: the caller blocks until all tasks submitted
/// by that call have finished.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Build a pool with `threads` workers, or one per available processing
    /// unit when `None`.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let threads = threads.filter(|&t| t > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mvdecon-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Number of equal-work partitions a data-movement call is split into.
    pub fn num_tasks(&self) -> usize {
        self.threads() * TASKS_PER_THREAD
    }

    /// Run `op` inside the pool. A panic in any task aborts the call and is
    /// reported as [`DeconError::Interrupted`]; writes already made by other
    /// tasks are kept.
    pub fn run<R, F>(&self, what: &str, op: F) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| self.pool.install(op))) {
            Ok(r) => Ok(r),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(operation = what, %reason, "Worker interrupted");
                Err(DeconError::Interrupted(format!("{what}: {reason}")))
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Length of each of `parts` chunks covering `len` items (at least 1).
pub(crate) fn chunk_len(len: usize, parts: usize) -> usize {
    len.div_ceil(parts.max(1)).max(1)
}
