//! Bounded set of concurrently running event handlers.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

pub(crate) struct WorkerPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Runs `handler` once a slot is free. Waits while the pool is full.
    pub async fn spawn<F>(&mut self, handler: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reap();
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return;
        };
        self.tasks.spawn(async move {
            let _permit = permit;
            handler.await;
        });
    }

    /// Waits for every running handler.
    pub async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            log_join(result);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            log_join(result);
        }
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Event handler panicked");
    }
}
