// Worker pool for listener callbacks and outbound forwarding calls

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, warn};

/// Default number of callbacks allowed to run at once.
pub const DEFAULT_WORKERS: usize = 4;

/// Runs submitted jobs on the tokio runtime, at most `workers` at a time,
/// and tracks how many are still in flight so shutdown can drain them.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    workers: Arc<Semaphore>,
    in_flight: AtomicUsize,
    idle: Notify,
    stopped: AtomicBool,
}

/// Decrements the in-flight count when a job finishes, panics included.
struct InFlightGuard {
    inner: Arc<PoolInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                workers: Arc::new(Semaphore::new(workers.max(1))),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a job. Returns false if the pool has been stopped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.stopped.load(Ordering::SeqCst) {
            warn!("Worker pool stopped, dropping job");
            return false;
        }

        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
        };
        let workers = Arc::clone(&self.inner.workers);

        tokio::spawn(async move {
            let _guard = guard;
            // Closed only by stop(), after draining
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            job.await;
        });

        true
    }

    /// Number of jobs submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no job is in flight. Jobs submitted by running jobs are
    /// waited for as well. No timeout.
    pub async fn block_till_done(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }

            notified.await;
        }
    }

    /// Refuse further jobs and release the workers.
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            self.inner.workers.close();
            debug!("Worker pool stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}
