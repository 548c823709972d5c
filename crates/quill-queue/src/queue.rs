//! The durable priority queue contract and its implementations.
//!
//! The queue is the only owner of job rows. Workers claim due jobs with
//! `FOR UPDATE SKIP LOCKED` so any number of worker processes can pull from
//! the same table without coordination, and redelivery after a crash falls
//! out of the visibility mechanics of the `Active` state plus the broker's
//! requeue sweep (external to this subsystem).

use std::{future::Future, pin::Pin};

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::Result,
    job::{Job, JobHandle, JobId, JobSpec},
};

/// Boxed future alias used across the queue trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const JOB_COLUMNS: &str = "id, task_name, props, priority, attempt, max_attempts, base_delay_ms, \
                           max_delay_ms, jitter_factor, backoff_strategy, scheduled_at, state, \
                           last_error, created_at";

/// Durable FIFO-with-priority store for task invocations.
///
/// Implementations must provide at-least-once delivery: a claimed job that
/// is neither completed nor failed must eventually become claimable again.
pub trait Queue: Send + Sync + 'static {
    /// Persists a new job and returns its handle.
    fn enqueue(&self, spec: JobSpec) -> BoxFuture<'_, Result<JobHandle>>;

    /// Claims up to `batch_size` due jobs, marking them `Active`.
    ///
    /// Ordering is priority first, then `scheduled_at` (FIFO within a
    /// priority band).
    fn claim_due(&self, batch_size: usize, now: DateTime<Utc>) -> BoxFuture<'_, Result<Vec<Job>>>;

    /// Marks a job as successfully completed.
    fn mark_completed(&self, id: JobId) -> BoxFuture<'_, Result<()>>;

    /// Records a failed attempt.
    ///
    /// Increments the attempt counter and stores the error. With
    /// `retry_at = Some(_)` the job goes back to `Pending` for redelivery at
    /// that time; with `None` it is terminally `Failed`.
    fn record_failure(
        &self,
        id: JobId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Fetches a job by id. Used by tests and inspection tooling.
    fn find_job(&self, id: JobId) -> BoxFuture<'_, Result<Option<Job>>>;

    /// Number of jobs not yet in a terminal state.
    fn pending_count(&self) -> BoxFuture<'_, Result<u64>>;
}

/// Production queue backed by PostgreSQL.
pub struct PostgresQueue {
    pool: PgPool,
}

impl PostgresQueue {
    /// Creates a queue over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Queue for PostgresQueue {
    fn enqueue(&self, spec: JobSpec) -> BoxFuture<'_, Result<JobHandle>> {
        Box::pin(async move {
            let id = JobId::new();
            let retry = &spec.options.retry;

            sqlx::query(
                r#"
                INSERT INTO jobs (
                    id, task_name, props, priority, attempt, max_attempts, base_delay_ms,
                    max_delay_ms, jitter_factor, backoff_strategy, scheduled_at, state, created_at
                ) VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $8, $9, $10, 'pending', NOW())
                "#,
            )
            .bind(id)
            .bind(&spec.task_name)
            .bind(sqlx::types::Json(&spec.props))
            .bind(spec.options.priority.as_i16())
            .bind(i32::try_from(retry.max_attempts).unwrap_or(i32::MAX))
            .bind(i64::try_from(retry.base_delay.as_millis()).unwrap_or(i64::MAX))
            .bind(i64::try_from(retry.max_delay.as_millis()).unwrap_or(i64::MAX))
            .bind(retry.jitter_factor)
            .bind(retry.strategy.as_str())
            .bind(spec.scheduled_at)
            .execute(&self.pool)
            .await?;

            Ok(JobHandle { id, task_name: spec.task_name, scheduled_at: spec.scheduled_at })
        })
    }

    fn claim_due(&self, batch_size: usize, now: DateTime<Utc>) -> BoxFuture<'_, Result<Vec<Job>>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            let job_ids: Vec<Uuid> = sqlx::query_scalar(
                r#"
                SELECT id FROM jobs
                WHERE state = 'pending' AND scheduled_at <= $1
                ORDER BY priority DESC, scheduled_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
                "#,
            )
            .bind(now)
            .bind(i64::try_from(batch_size).unwrap_or(i64::MAX))
            .fetch_all(&mut *tx)
            .await?;

            if job_ids.is_empty() {
                tx.rollback().await?;
                return Ok(Vec::new());
            }

            let jobs = sqlx::query_as::<_, Job>(&format!(
                "UPDATE jobs SET state = 'active' WHERE id = ANY($1) RETURNING {JOB_COLUMNS}"
            ))
            .bind(&job_ids)
            .fetch_all(&mut *tx)
            .await?;

            tx.commit().await?;

            Ok(jobs)
        })
    }

    fn mark_completed(&self, id: JobId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            sqlx::query("UPDATE jobs SET state = 'completed' WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn record_failure(
        &self,
        id: JobId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, Result<()>> {
        let error = error.to_string();
        Box::pin(async move {
            match retry_at {
                Some(retry_at) => {
                    sqlx::query(
                        "UPDATE jobs SET state = 'pending', attempt = attempt + 1, \
                         last_error = $2, scheduled_at = $3 WHERE id = $1",
                    )
                    .bind(id)
                    .bind(&error)
                    .bind(retry_at)
                    .execute(&self.pool)
                    .await?;
                },
                None => {
                    sqlx::query(
                        "UPDATE jobs SET state = 'failed', attempt = attempt + 1, \
                         last_error = $2 WHERE id = $1",
                    )
                    .bind(id)
                    .bind(&error)
                    .execute(&self.pool)
                    .await?;
                },
            }
            Ok(())
        })
    }

    fn find_job(&self, id: JobId) -> BoxFuture<'_, Result<Option<Job>>> {
        Box::pin(async move {
            let job = sqlx::query_as::<_, Job>(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(job)
        })
    }

    fn pending_count(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM jobs WHERE state IN ('pending', 'active')",
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }
}

pub mod mock {
    //! In-memory queue for tests.
    //!
    //! Mirrors the PostgreSQL contract (priority ordering, attempt
    //! bookkeeping, scheduled-time gating) without a database so worker
    //! logic and task behavior can be tested deterministically against an
    //! injected clock.

    use std::{collections::HashMap, sync::Arc};

    use chrono::{DateTime, Utc};
    use tokio::sync::RwLock;

    use super::{BoxFuture, Queue};
    use crate::{
        error::Result,
        job::{Job, JobHandle, JobId, JobSpec, JobState},
    };

    /// Deterministic in-memory queue.
    #[derive(Default)]
    pub struct InMemoryQueue {
        jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    }

    impl InMemoryQueue {
        /// Creates an empty queue.
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of every job, for assertions.
        pub async fn all_jobs(&self) -> Vec<Job> {
            let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
            jobs.sort_by_key(|j| j.created_at);
            jobs
        }

        /// Jobs currently enqueued for a given task name.
        pub async fn jobs_for_task(&self, task_name: &str) -> Vec<Job> {
            self.all_jobs().await.into_iter().filter(|j| j.task_name == task_name).collect()
        }

        /// Number of jobs in a given state.
        pub async fn count_in_state(&self, state: JobState) -> usize {
            self.jobs.read().await.values().filter(|j| j.state == state).count()
        }
    }

    impl Queue for InMemoryQueue {
        fn enqueue(&self, spec: JobSpec) -> BoxFuture<'_, Result<JobHandle>> {
            Box::pin(async move {
                let id = JobId::new();
                let job = Job {
                    id,
                    task_name: spec.task_name.clone(),
                    props: spec.props,
                    priority: spec.options.priority,
                    attempt: 0,
                    retry: spec.options.retry,
                    scheduled_at: spec.scheduled_at,
                    state: JobState::Pending,
                    last_error: None,
                    created_at: Utc::now(),
                };
                self.jobs.write().await.insert(id, job);

                Ok(JobHandle { id, task_name: spec.task_name, scheduled_at: spec.scheduled_at })
            })
        }

        fn claim_due(
            &self,
            batch_size: usize,
            now: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<Vec<Job>>> {
            Box::pin(async move {
                let mut jobs = self.jobs.write().await;

                let mut due: Vec<JobId> = jobs
                    .values()
                    .filter(|j| j.state == JobState::Pending && j.scheduled_at <= now)
                    .map(|j| j.id)
                    .collect();
                due.sort_by_key(|id| {
                    let job = &jobs[id];
                    (std::cmp::Reverse(job.priority), job.scheduled_at, job.created_at)
                });
                due.truncate(batch_size);

                let mut claimed = Vec::with_capacity(due.len());
                for id in due {
                    if let Some(job) = jobs.get_mut(&id) {
                        job.state = JobState::Active;
                        claimed.push(job.clone());
                    }
                }

                Ok(claimed)
            })
        }

        fn mark_completed(&self, id: JobId) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if let Some(job) = self.jobs.write().await.get_mut(&id) {
                    job.state = JobState::Completed;
                }
                Ok(())
            })
        }

        fn record_failure(
            &self,
            id: JobId,
            error: &str,
            retry_at: Option<DateTime<Utc>>,
        ) -> BoxFuture<'_, Result<()>> {
            let error = error.to_string();
            Box::pin(async move {
                if let Some(job) = self.jobs.write().await.get_mut(&id) {
                    job.attempt += 1;
                    job.last_error = Some(error);
                    match retry_at {
                        Some(retry_at) => {
                            job.state = JobState::Pending;
                            job.scheduled_at = retry_at;
                        },
                        None => job.state = JobState::Failed,
                    }
                }
                Ok(())
            })
        }

        fn find_job(&self, id: JobId) -> BoxFuture<'_, Result<Option<Job>>> {
            Box::pin(async move { Ok(self.jobs.read().await.get(&id).cloned()) })
        }

        fn pending_count(&self) -> BoxFuture<'_, Result<u64>> {
            Box::pin(async move {
                let count = self
                    .jobs
                    .read()
                    .await
                    .values()
                    .filter(|j| matches!(j.state, JobState::Pending | JobState::Active))
                    .count();
                Ok(count as u64)
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::task::{TaskOptions, TaskPriority};

        fn spec(name: &str, priority: TaskPriority, scheduled_at: DateTime<Utc>) -> JobSpec {
            JobSpec {
                task_name: name.to_string(),
                props: serde_json::json!({}),
                options: TaskOptions { priority, ..TaskOptions::default() },
                scheduled_at,
            }
        }

        #[tokio::test]
        async fn claims_respect_priority_then_schedule_order() {
            let queue = InMemoryQueue::new();
            let now = Utc::now();

            queue.enqueue(spec("low", TaskPriority::Low, now)).await.unwrap();
            queue.enqueue(spec("high", TaskPriority::High, now)).await.unwrap();
            queue
                .enqueue(spec("normal-early", TaskPriority::Normal, now - chrono::Duration::seconds(10)))
                .await
                .unwrap();
            queue.enqueue(spec("normal-late", TaskPriority::Normal, now)).await.unwrap();

            let claimed = queue.claim_due(10, now).await.unwrap();
            let names: Vec<&str> = claimed.iter().map(|j| j.task_name.as_str()).collect();

            assert_eq!(names, vec!["high", "normal-early", "normal-late", "low"]);
        }

        #[tokio::test]
        async fn future_jobs_are_not_claimable() {
            let queue = InMemoryQueue::new();
            let now = Utc::now();
            let later = now + chrono::Duration::seconds(300);

            queue.enqueue(spec("delayed", TaskPriority::Normal, later)).await.unwrap();

            assert!(queue.claim_due(10, now).await.unwrap().is_empty());
            assert_eq!(queue.claim_due(10, later).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn record_failure_requeues_or_fails() {
            let queue = InMemoryQueue::new();
            let now = Utc::now();
            let handle = queue.enqueue(spec("flaky", TaskPriority::Normal, now)).await.unwrap();

            queue.claim_due(1, now).await.unwrap();
            queue
                .record_failure(handle.id, "boom", Some(now + chrono::Duration::seconds(5)))
                .await
                .unwrap();

            let job = queue.find_job(handle.id).await.unwrap().unwrap();
            assert_eq!(job.state, JobState::Pending);
            assert_eq!(job.attempt, 1);
            assert_eq!(job.last_error.as_deref(), Some("boom"));

            queue.claim_due(1, now + chrono::Duration::seconds(5)).await.unwrap();
            queue.record_failure(handle.id, "boom again", None).await.unwrap();

            let job = queue.find_job(handle.id).await.unwrap().unwrap();
            assert_eq!(job.state, JobState::Failed);
            assert_eq!(job.attempt, 2);
        }

        #[tokio::test]
        async fn pending_count_excludes_terminal_states() {
            let queue = InMemoryQueue::new();
            let now = Utc::now();

            let a = queue.enqueue(spec("a", TaskPriority::Normal, now)).await.unwrap();
            queue.enqueue(spec("b", TaskPriority::Normal, now)).await.unwrap();
            assert_eq!(queue.pending_count().await.unwrap(), 2);

            queue.claim_due(1, now).await.unwrap();
            queue.mark_completed(a.id).await.unwrap();
            assert_eq!(queue.pending_count().await.unwrap(), 1);
        }
    }
}
