//! The Task contract: a named unit of deferred, retryable work.
//!
//! Tasks are plain structs holding their dependencies (storage handles,
//! HTTP clients); the queue never constructs them. Scheduling goes through
//! [`TaskScheduler`](crate::scheduler::TaskScheduler): callers never invoke
//! `perform` directly, and `perform` must tolerate being invoked more than
//! once with the same props, because delivery is at-least-once.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::{error::TaskError, retry::RetryPolicy};

/// Queue priority. Higher priorities drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Maintenance work that should never crowd out user-visible tasks.
    Background,
    /// Low-urgency work.
    Low,
    /// Default priority.
    Normal,
    /// User-visible work that should run promptly.
    High,
}

impl TaskPriority {
    /// Database representation; ordering matters for the claim query.
    pub fn as_i16(self) -> i16 {
        match self {
            Self::Background => 0,
            Self::Low => 1,
            Self::Normal => 2,
            Self::High => 3,
        }
    }

    /// Parses the database representation.
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Background),
            1 => Some(Self::Low),
            2 => Some(Self::Normal),
            3 => Some(Self::High),
            _ => None,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Options merged into the job record at enqueue time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TaskOptions {
    /// Queue priority.
    pub priority: TaskPriority,

    /// Retry policy applied by the queue on transient failure.
    pub retry: RetryPolicy,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self { priority: TaskPriority::Normal, retry: RetryPolicy::default() }
    }
}

/// A named unit of deferred, retryable background work.
///
/// Implementations must be idempotent: prefer find-or-create over create,
/// check aggregate state before re-doing work, and treat "already done" as
/// success. A failed `perform` is retried per [`TaskOptions::retry`] when
/// the error is transient; once attempts are exhausted (or immediately on a
/// terminal error) `on_failed` runs exactly once.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Stable task name recorded on job rows. Changing it orphans in-flight
    /// jobs, so treat it as part of the storage schema.
    const NAME: &'static str;

    /// Payload carried by each job for this task.
    type Props: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Job options for this task type.
    fn options() -> TaskOptions {
        TaskOptions::default()
    }

    /// Performs one unit of work.
    ///
    /// # Errors
    ///
    /// Transient errors are retried with backoff; terminal errors fail the
    /// job immediately.
    async fn perform(&self, props: Self::Props) -> Result<(), TaskError>;

    /// Invoked exactly once when all attempts are exhausted.
    ///
    /// Best-effort: failures inside this hook are logged by the worker and
    /// never retried.
    async fn on_failed(&self, props: Self::Props) {
        let _ = props;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_matches_database_encoding() {
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
        assert!(TaskPriority::Low > TaskPriority::Background);

        for priority in
            [TaskPriority::Background, TaskPriority::Low, TaskPriority::Normal, TaskPriority::High]
        {
            assert_eq!(TaskPriority::from_i16(priority.as_i16()), Some(priority));
        }
        assert_eq!(TaskPriority::from_i16(7), None);
    }
}
