//! Error types and result handling for domain and storage operations.
//!
//! Distinguishes infrastructure failures (retryable by the task queue) from
//! programming errors and validation failures that must never be retried.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for domain and storage operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Constraint violation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Partition descriptor outside the valid index/count bounds.
    ///
    /// A programming error: callers construct partitions from static
    /// configuration, so this is raised synchronously and never enqueued.
    #[error("invalid partition: index {index} of count {count}")]
    InvalidPartition {
        /// Requested partition index.
        index: u32,
        /// Total partition count.
        count: u32,
    },

    /// A state transition was requested from the wrong source state.
    #[error("invalid state transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        /// Entity kind, e.g. "import".
        entity: &'static str,
        /// Observed current state.
        from: String,
        /// Requested target state.
        to: String,
    },
}

impl CoreError {
    /// Whether the failure is transient infrastructure trouble that a task
    /// retry could plausibly resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::ConstraintViolation(format!("foreign key constraint violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_are_retryable() {
        assert!(CoreError::Database("connection reset".into()).is_retryable());
        assert!(!CoreError::NotFound("document".into()).is_retryable());
        assert!(!CoreError::InvalidPartition { index: 4, count: 4 }.is_retryable());
    }
}
