//! Single-worker event delivery
//!
//! Listener callbacks never run on a poll loop. They are queued on an
//! [`EventDispatcher`] and executed one at a time, in the order they were
//! queued. Each callback runs on the blocking pool, so a listener that
//! blocks never holds up a runtime worker.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Ordered executor for listener callbacks
///
/// Cloning is cheap; all clones feed the same worker.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventDispatcher {
    /// Start a dispatcher on the current tokio runtime
    pub fn spawn(name: impl Into<String>) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker_name = name.clone();
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // awaited one at a time to keep delivery order
                if let Err(e) = tokio::task::spawn_blocking(job).await {
                    if e.is_panic() {
                        error!(dispatcher = %worker_name, "Listener panicked while handling an event");
                    }
                }
            }
            debug!(dispatcher = %worker_name, "Event dispatcher stopped");
        });

        Self {
            inner: Arc::new(DispatcherInner {
                name,
                sender: Mutex::new(Some(tx)),
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    /// Name of the dispatcher (for diagnostics)
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue a job; returns `false` if the dispatcher was shut down
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.inner.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => {
                trace!(dispatcher = %self.inner.name, "Dropping event after shutdown");
                false
            }
        }
    }

    /// Stop accepting jobs; already queued jobs are still delivered
    pub fn shutdown(&self) {
        if self.inner.sender.lock().take().is_some() {
            debug!(dispatcher = %self.inner.name, "Event dispatcher shutting down");
        }
    }

    /// Returns `true` until [`shutdown`](Self::shutdown) is called
    pub fn is_running(&self) -> bool {
        self.inner.sender.lock().is_some()
    }

    /// Shut down and wait until every queued job has run
    pub async fn drain(&self) {
        self.shutdown();
        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl Drop for DispatcherInner {
    fn drop(&mut self) {
        // Let the worker finish the backlog, then exit on channel close
        self.sender.get_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let dispatcher = EventDispatcher::spawn("test/Events");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = seen.clone();
            assert!(dispatcher.execute(move || seen.lock().push(i)));
        }
        dispatcher.drain().await;

        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_worker() {
        let dispatcher = EventDispatcher::spawn("test/Events");
        let seen = Arc::new(Mutex::new(Vec::new()));

        dispatcher.execute(|| panic!("listener bug"));
        let after = seen.clone();
        dispatcher.execute(move || after.lock().push("delivered"));
        dispatcher.drain().await;

        assert_eq!(*seen.lock(), vec!["delivered"]);
    }

    #[tokio::test]
    async fn test_blocking_job_does_not_block_runtime() {
        let dispatcher = EventDispatcher::spawn("test/Events");
        dispatcher.execute(|| std::thread::sleep(Duration::from_millis(500)));

        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(400));

        dispatcher.drain().await;
    }

    #[tokio::test]
    async fn test_execute_after_shutdown_is_rejected() {
        let dispatcher = EventDispatcher::spawn("test/Events");
        dispatcher.shutdown();

        assert!(!dispatcher.is_running());
        assert!(!dispatcher.execute(|| {}));
    }
}
