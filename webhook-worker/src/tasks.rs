//! Detached work that must finish before the process exits.
//!
//! Dispatches started by the queue consumer or by `POST /events` run in their
//! own tasks. They are tracked here so shutdown can wait for every in-flight
//! delivery to reach a terminal row (and its message to be acked) instead of
//! killing it mid-request.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        // Reap finished tasks so the set only holds work in flight
        while let Some(result) = tasks.try_join_next() {
            log_join(result);
        }
        tasks.spawn(task);
    }

    /// Number of tracked tasks, including finished ones not yet reaped.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every task spawned so far.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.lock());
        if tasks.is_empty() {
            return;
        }

        info!(pending = tasks.len(), "background_tasks_draining");
        while let Some(result) = tasks.join_next().await {
            log_join(result);
        }
        info!("background_tasks_drained");
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "background_task_failed");
    }
}
