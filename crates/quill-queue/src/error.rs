//! Error types for queue and task execution.
//!
//! Two layers of failure exist here. [`QueueError`] covers the queue
//! machinery itself (persistence, serialization, registration). [`TaskError`]
//! is what a task's `perform` returns, and its transient/terminal split is
//! what drives the retry decision: transient failures go back on the queue
//! with backoff, terminal failures skip straight to the failure hook.

use thiserror::Error;

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised by the queue machinery.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Database operation failed.
    #[error("queue database error: {0}")]
    Database(String),

    /// Task props could not be serialized for enqueueing.
    #[error("props serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A job referenced a task name with no registered implementation.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// A task was scheduled with invalid configuration.
    #[error("invalid task configuration: {0}")]
    InvalidConfiguration(String),

    /// Worker shutdown did not finish within the configured timeout.
    #[error("shutdown timed out after {timeout_secs}s")]
    ShutdownTimeout {
        /// Seconds waited before giving up.
        timeout_secs: u64,
    },
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<quill_core::CoreError> for QueueError {
    fn from(err: quill_core::CoreError) -> Self {
        Self::Database(err.to_string())
    }
}

/// Failure returned from a task's `perform`.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// Temporary trouble (network, database, remote endpoint). Retried per
    /// the job's retry policy until attempts run out.
    #[error("{message}")]
    Transient {
        /// Human-readable failure description.
        message: String,
    },

    /// Permanent failure (validation, malformed input, programming error).
    /// Never retried; the job fails immediately and `on_failed` runs.
    #[error("{message}")]
    Terminal {
        /// Human-readable failure description.
        message: String,
    },
}

impl TaskError {
    /// Creates a transient, retryable failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    /// Creates a terminal, non-retryable failure.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal { message: message.into() }
    }

    /// Whether the queue should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<quill_core::CoreError> for TaskError {
    fn from(err: quill_core::CoreError) -> Self {
        if err.is_retryable() {
            Self::transient(err.to_string())
        } else {
            Self::terminal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_retryable() {
        assert!(TaskError::transient("socket closed").is_retryable());
        assert!(!TaskError::terminal("unsupported format").is_retryable());
    }

    #[test]
    fn core_errors_map_by_retryability() {
        let db = quill_core::CoreError::Database("deadlock".into());
        assert!(TaskError::from(db).is_retryable());

        let missing = quill_core::CoreError::NotFound("document".into());
        assert!(!TaskError::from(missing).is_retryable());
    }
}
