//! Bounded background work
//!
//! Writes that must not delay a response (saving generated jokes, audio
//! bookkeeping, metadata counters) run here. Failures are logged and
//! counted, never retried.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::error::AppError;
use crate::metrics::{BACKGROUND_TASKS_IN_FLIGHT, BACKGROUND_TASKS_TOTAL};

/// Fire-and-forget task runner with a concurrency cap
pub struct BackgroundTasks {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl BackgroundTasks {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run `task` in the background. The caller does not wait for it.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let permits = self.permits.clone();

        self.tracker.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            BACKGROUND_TASKS_IN_FLIGHT.inc();
            let result = task.await;
            BACKGROUND_TASKS_IN_FLIGHT.dec();

            match result {
                Ok(()) => {
                    BACKGROUND_TASKS_TOTAL
                        .with_label_values(&[name, "success"])
                        .inc();
                    tracing::debug!(task = name, "Background task finished");
                }
                Err(error) => {
                    BACKGROUND_TASKS_TOTAL
                        .with_label_values(&[name, "error"])
                        .inc();
                    tracing::warn!(task = name, %error, "Background task failed");
                }
            }
        });
    }

    /// Number of tasks still running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far has finished
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop waiting for new work and drain what is running
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Background tasks drained");
    }
}
