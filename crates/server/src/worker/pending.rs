//! Tracking for detached background work.
//!
//! Responses go back to the caller before cache writes, revalidation fetches
//! and eviction passes finish. Those tasks are registered here so shutdown
//! can wait for them instead of tearing the process down mid-write.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;

/// Handle to the set of in-flight background tasks. Clones share the set.
#[derive(Clone, Default)]
pub struct PendingWork {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl PendingWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` and keep the process alive until it completes.
    pub fn wait_until<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        // reap whatever already finished so the set does not grow unbounded
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "background task failed");
            }
        }
        tasks.spawn(task);
    }

    /// Number of tasks not yet reaped.
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every registered task, including ones spawned while draining.
    pub async fn drain(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
            if batch.is_empty() {
                break;
            }
            while let Some(result) = batch.join_next().await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "background task failed");
                }
            }
        }
    }
}
