//! Worker pool supervision and graceful shutdown.

use std::{sync::Arc, time::Duration};

use quill_core::Clock;
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::{QueueError, Result},
    queue::Queue,
    registry::TaskRegistry,
    worker::{TaskWorker, WorkerConfig, WorkerStats},
};

/// Supervises a set of task worker tasks.
pub struct WorkerPool {
    queue: Arc<dyn Queue>,
    registry: Arc<TaskRegistry>,
    config: WorkerConfig,
    stats: Arc<RwLock<WorkerStats>>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<Result<()>>>,
    clock: Arc<dyn Clock>,
}

impl WorkerPool {
    /// Creates a new pool; call [`spawn_workers`](Self::spawn_workers) to
    /// start processing.
    pub fn new(
        queue: Arc<dyn Queue>,
        registry: Arc<TaskRegistry>,
        config: WorkerConfig,
        stats: Arc<RwLock<WorkerStats>>,
        cancellation_token: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            registry,
            config,
            stats,
            cancellation_token,
            worker_handles: Vec::new(),
            clock,
        }
    }

    /// Spawns all configured workers. Returns once they are running.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature reserves room for startup
    /// validation.
    pub async fn spawn_workers(&mut self) -> Result<()> {
        {
            let mut stats = self.stats.write().await;
            stats.active_workers = self.config.worker_count;
        }

        for worker_id in 0..self.config.worker_count {
            let worker = TaskWorker::new(
                worker_id,
                self.queue.clone(),
                self.registry.clone(),
                self.config.clone(),
                self.stats.clone(),
                self.cancellation_token.clone(),
                self.clock.clone(),
            );

            self.worker_handles.push(tokio::spawn(async move { worker.run().await }));
        }

        info!(spawned_workers = self.worker_handles.len(), "task workers spawned");
        Ok(())
    }

    /// Signals cancellation and waits for all workers to drain, up to
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ShutdownTimeout` if workers do not finish in
    /// time.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_secs = timeout.as_secs(),
            "initiating graceful worker shutdown"
        );

        self.cancellation_token.cancel();

        let drain = async {
            for (worker_id, handle) in
                std::mem::take(&mut self.worker_handles).into_iter().enumerate()
            {
                match handle.await {
                    Ok(Ok(())) => {},
                    Ok(Err(error)) => {
                        warn!(worker_id, error = %error, "worker finished with error");
                    },
                    Err(join_error) => {
                        warn!(worker_id, error = %join_error, "worker task panicked");
                    },
                }
            }
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => {
                let mut stats = self.stats.write().await;
                stats.active_workers = 0;
                info!("all workers stopped");
                Ok(())
            },
            Err(_) => Err(QueueError::ShutdownTimeout { timeout_secs: timeout.as_secs() }),
        }
    }
}
