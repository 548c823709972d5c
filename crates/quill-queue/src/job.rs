//! Job records: the queue's view of a scheduled task invocation.
//!
//! A job is owned exclusively by the queue. Task code sees only its typed
//! props; workers see the full record including attempt bookkeeping and the
//! retry policy frozen at enqueue time.

use std::fmt;

use chrono::{DateTime, Utc};
use quill_core::define_id;
use serde::{Deserialize, Serialize};

use crate::{
    retry::{BackoffStrategy, RetryPolicy},
    task::{TaskOptions, TaskPriority},
};

define_id! {
    /// Identifies a job in the queue.
    JobId
}

/// Lifecycle of a job.
///
/// ```text
/// Pending -> Active -> Completed
///                   \-> Pending (transient failure, retry scheduled)
///                   \-> Failed  (attempts exhausted or terminal error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker, possibly until a future `scheduled_at`.
    Pending,
    /// Claimed by a worker, `perform` in flight.
    Active,
    /// Terminal success.
    Completed,
    /// Terminal failure; `on_failed` has run (or is about to).
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl JobState {
    /// Parses the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A task invocation persisted by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,

    /// Name of the task to run, resolved through the registry.
    pub task_name: String,

    /// JSON-encoded props.
    pub props: serde_json::Value,

    /// Queue priority.
    pub priority: TaskPriority,

    /// Attempts already made (0 for a job never yet executed).
    pub attempt: i32,

    /// Retry policy frozen at enqueue time.
    pub retry: RetryPolicy,

    /// Earliest time the job may run.
    pub scheduled_at: DateTime<Utc>,

    /// Current lifecycle state.
    pub state: JobState,

    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,

    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// The attempt number the next execution would be (1-based).
    pub fn next_attempt_number(&self) -> u32 {
        u32::try_from(self.attempt).unwrap_or(u32::MAX).saturating_add(1)
    }

    /// Whether another attempt is allowed after one more failure.
    pub fn attempts_remaining_after_failure(&self) -> bool {
        self.next_attempt_number() < self.retry.max_attempts
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for Job {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let priority: i16 = row.try_get("priority")?;
        let strategy: String = row.try_get("backoff_strategy")?;
        let base_delay_ms: i64 = row.try_get("base_delay_ms")?;
        let max_delay_ms: i64 = row.try_get("max_delay_ms")?;
        let max_attempts: i32 = row.try_get("max_attempts")?;
        let state: String = row.try_get("state")?;
        let props: sqlx::types::Json<serde_json::Value> = row.try_get("props")?;

        Ok(Self {
            id: row.try_get("id")?,
            task_name: row.try_get("task_name")?,
            props: props.0,
            priority: TaskPriority::from_i16(priority)
                .ok_or_else(|| sqlx::Error::Decode(format!("invalid priority: {priority}").into()))?,
            attempt: row.try_get("attempt")?,
            retry: RetryPolicy {
                max_attempts: u32::try_from(max_attempts)
                    .map_err(|_| sqlx::Error::Decode("max_attempts cannot be negative".into()))?,
                base_delay: std::time::Duration::from_millis(
                    u64::try_from(base_delay_ms).unwrap_or(0),
                ),
                max_delay: std::time::Duration::from_millis(
                    u64::try_from(max_delay_ms).unwrap_or(0),
                ),
                jitter_factor: row.try_get("jitter_factor")?,
                strategy: BackoffStrategy::parse(&strategy).ok_or_else(|| {
                    sqlx::Error::Decode(format!("invalid backoff strategy: {strategy}").into())
                })?,
            },
            scheduled_at: row.try_get("scheduled_at")?,
            state: JobState::parse(&state)
                .ok_or_else(|| sqlx::Error::Decode(format!("invalid job state: {state}").into()))?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Everything the queue needs to persist a new job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Name of the task to run.
    pub task_name: String,

    /// JSON-encoded props.
    pub props: serde_json::Value,

    /// Options merged from the task type.
    pub options: TaskOptions,

    /// Earliest time the job may run.
    pub scheduled_at: DateTime<Utc>,
}

/// Receipt returned to the scheduling caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    /// Identifier of the persisted job.
    pub id: JobId,

    /// Name of the task that will run.
    pub task_name: String,

    /// Earliest time the job may run.
    pub scheduled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_attempts(attempt: i32, max_attempts: u32) -> Job {
        Job {
            id: JobId::new(),
            task_name: "example".to_string(),
            props: serde_json::json!({}),
            priority: TaskPriority::Normal,
            attempt,
            retry: RetryPolicy { max_attempts, ..RetryPolicy::default() },
            scheduled_at: Utc::now(),
            state: JobState::Active,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn attempt_accounting() {
        let fresh = job_with_attempts(0, 3);
        assert_eq!(fresh.next_attempt_number(), 1);
        assert!(fresh.attempts_remaining_after_failure());

        let last = job_with_attempts(2, 3);
        assert_eq!(last.next_attempt_number(), 3);
        assert!(!last.attempts_remaining_after_failure());
    }

    #[test]
    fn single_attempt_jobs_never_retry() {
        let job = job_with_attempts(0, 1);
        assert!(!job.attempts_remaining_after_failure());
    }
}
