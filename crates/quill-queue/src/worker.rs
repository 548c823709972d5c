//! Task execution engine and worker loop.
//!
//! Workers claim batches of due jobs and settle each one: success completes
//! the job, transient failure reschedules it per the job's own retry policy,
//! and exhaustion (or a terminal error) fails it and runs the task's
//! `on_failed` hook exactly once. The engine supervises a pool of workers
//! and offers a synchronous batch entry point for tests.

use std::{sync::Arc, time::Duration};

use quill_core::Clock;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    job::Job,
    queue::Queue,
    registry::TaskRegistry,
    worker_pool::WorkerPool,
};

/// Configuration for the task engine.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,

    /// Maximum jobs to claim per worker batch.
    pub batch_size: usize,

    /// How often workers poll when the queue is empty.
    pub poll_interval: Duration,

    /// Back-off after a batch-level error before polling again.
    pub error_interval: Duration,

    /// Maximum time to wait for workers during graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            batch_size: 10,
            poll_interval: Duration::from_secs(1),
            error_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters for engine monitoring.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Number of running workers.
    pub active_workers: usize,
    /// Jobs executed since startup (any outcome).
    pub jobs_processed: u64,
    /// Jobs that completed successfully.
    pub jobs_succeeded: u64,
    /// Jobs rescheduled for another attempt.
    pub jobs_retried: u64,
    /// Jobs that failed permanently.
    pub jobs_failed: u64,
    /// Jobs currently executing.
    pub in_flight: u64,
}

/// Supervises task workers over a shared queue and registry.
pub struct TaskEngine {
    queue: Arc<dyn Queue>,
    registry: Arc<TaskRegistry>,
    config: WorkerConfig,
    stats: Arc<RwLock<WorkerStats>>,
    cancellation_token: CancellationToken,
    worker_pool: Option<WorkerPool>,
    clock: Arc<dyn Clock>,
}

impl TaskEngine {
    /// Creates a new engine.
    pub fn new(
        queue: Arc<dyn Queue>,
        registry: Arc<TaskRegistry>,
        config: WorkerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            registry,
            config,
            stats: Arc::new(RwLock::new(WorkerStats::default())),
            cancellation_token: CancellationToken::new(),
            worker_pool: None,
            clock,
        }
    }

    /// Spawns the configured worker pool and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns error if worker spawning fails.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            worker_count = self.config.worker_count,
            batch_size = self.config.batch_size,
            tasks = ?self.registry.task_names(),
            "starting task engine"
        );

        let mut pool = WorkerPool::new(
            self.queue.clone(),
            self.registry.clone(),
            self.config.clone(),
            self.stats.clone(),
            self.cancellation_token.clone(),
            self.clock.clone(),
        );
        pool.spawn_workers().await?;
        self.worker_pool = Some(pool);

        Ok(())
    }

    /// Gracefully shuts down: signals workers, waits for in-flight jobs.
    ///
    /// # Errors
    ///
    /// Returns error if shutdown exceeds the configured timeout.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down task engine");

        if let Some(pool) = self.worker_pool.take() {
            pool.shutdown_graceful(self.config.shutdown_timeout).await?;
        }
        Ok(())
    }

    /// Current engine statistics.
    pub async fn stats(&self) -> WorkerStats {
        self.stats.read().await.clone()
    }

    /// Claims and processes exactly one batch of due jobs synchronously.
    ///
    /// Test and tooling entry point; does not start persistent workers.
    /// Returns the number of jobs processed.
    ///
    /// # Errors
    ///
    /// Returns error if claiming fails.
    pub async fn process_batch(&self) -> Result<usize> {
        let worker = TaskWorker::new(
            0,
            self.queue.clone(),
            self.registry.clone(),
            self.config.clone(),
            self.stats.clone(),
            self.cancellation_token.clone(),
            self.clock.clone(),
        );
        worker.process_batch().await
    }
}

/// Individual worker that claims and settles jobs.
pub struct TaskWorker {
    id: usize,
    queue: Arc<dyn Queue>,
    registry: Arc<TaskRegistry>,
    config: WorkerConfig,
    stats: Arc<RwLock<WorkerStats>>,
    cancellation_token: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl TaskWorker {
    /// Creates a new worker.
    pub fn new(
        id: usize,
        queue: Arc<dyn Queue>,
        registry: Arc<TaskRegistry>,
        config: WorkerConfig,
        stats: Arc<RwLock<WorkerStats>>,
        cancellation_token: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { id, queue, registry, config, stats, cancellation_token, clock }
    }

    /// Main worker loop: claims and processes jobs until cancelled.
    ///
    /// # Errors
    ///
    /// Batch-level errors are logged and backed off, not propagated; the
    /// loop only ends on cancellation.
    pub async fn run(&self) -> Result<()> {
        info!(worker_id = self.id, "task worker starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.process_batch().await {
                Ok(0) => {
                    tokio::select! {
                        () = self.clock.sleep(self.config.poll_interval) => {},
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
                Ok(_) => {},
                Err(error) => {
                    error!(worker_id = self.id, error = %error, "batch processing failed");
                    tokio::select! {
                        () = self.clock.sleep(self.config.error_interval) => {},
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
            }
        }

        info!(worker_id = self.id, "task worker stopped");
        Ok(())
    }

    /// Claims and settles one batch of due jobs. Returns the batch size.
    ///
    /// # Errors
    ///
    /// Returns error if the claim query fails. Individual job failures are
    /// settled through the queue, not propagated.
    pub async fn process_batch(&self) -> Result<usize> {
        let jobs = self.queue.claim_due(self.config.batch_size, self.clock.now_utc()).await?;
        let batch_size = jobs.len();

        if batch_size > 0 {
            debug!(worker_id = self.id, batch_size, "processing job batch");
        }

        for job in jobs {
            if self.cancellation_token.is_cancelled() {
                break;
            }
            self.execute_job(job).await;
        }

        Ok(batch_size)
    }

    /// Runs one job and settles its outcome with the queue.
    async fn execute_job(&self, job: Job) {
        {
            let mut stats = self.stats.write().await;
            stats.in_flight += 1;
        }

        let attempt_number = job.next_attempt_number();
        let result = self.registry.perform(&job.task_name, job.props.clone()).await;

        {
            let mut stats = self.stats.write().await;
            stats.in_flight -= 1;
            stats.jobs_processed += 1;
        }

        match result {
            Ok(()) => {
                if let Err(error) = self.queue.mark_completed(job.id).await {
                    error!(worker_id = self.id, job_id = %job.id, error = %error,
                        "failed to mark job completed");
                }
                let mut stats = self.stats.write().await;
                stats.jobs_succeeded += 1;
            },
            Err(task_error) => {
                let retryable = task_error.is_retryable() && job.attempts_remaining_after_failure();

                if retryable {
                    let retry_at =
                        job.retry.next_attempt_at(attempt_number, self.clock.now_utc());
                    warn!(
                        worker_id = self.id,
                        job_id = %job.id,
                        task = %job.task_name,
                        attempt = attempt_number,
                        next_retry_at = %retry_at,
                        error = %task_error,
                        "job failed, retry scheduled"
                    );
                    if let Err(error) = self
                        .queue
                        .record_failure(job.id, &task_error.to_string(), Some(retry_at))
                        .await
                    {
                        error!(worker_id = self.id, job_id = %job.id, error = %error,
                            "failed to schedule job retry");
                    }
                    let mut stats = self.stats.write().await;
                    stats.jobs_retried += 1;
                } else {
                    error!(
                        worker_id = self.id,
                        job_id = %job.id,
                        task = %job.task_name,
                        attempt = attempt_number,
                        error = %task_error,
                        "job permanently failed"
                    );
                    if let Err(error) =
                        self.queue.record_failure(job.id, &task_error.to_string(), None).await
                    {
                        error!(worker_id = self.id, job_id = %job.id, error = %error,
                            "failed to mark job failed");
                    }

                    // The failure hook runs after the job is terminally
                    // settled, so a crash here cannot cause a second run.
                    self.registry.run_on_failed(&job.task_name, job.props).await;

                    let mut stats = self.stats.write().await;
                    stats.jobs_failed += 1;
                }
            },
        }
    }
}
