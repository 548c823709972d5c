//! Repository for export file operation state.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{FileOperation, FileOperationId, FileOperationState},
};

const FILE_OPERATION_COLUMNS: &str =
    "id, team_id, user_id, state, key, size, error, created_at, updated_at";

/// Repository for export file operation state.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds a file operation by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: FileOperationId) -> Result<Option<FileOperation>> {
        let operation = sqlx::query_as::<_, FileOperation>(&format!(
            "SELECT {FILE_OPERATION_COLUMNS} FROM file_operations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(operation)
    }

    /// Advances the file operation state machine: `from` -> `to`.
    ///
    /// Same compare-and-set semantics as the import repository: already in
    /// `to` is a silent success, anything else is `InvalidTransition`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` for illegal transitions, or a
    /// database error.
    pub async fn transition(
        &self,
        id: FileOperationId,
        from: FileOperationState,
        to: FileOperationState,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE file_operations SET state = $3, updated_at = NOW() \
             WHERE id = $1 AND state = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<(FileOperationState,)> =
            sqlx::query_as("SELECT state FROM file_operations WHERE id = $1")
                .bind(id)
                .fetch_optional(&*self.pool)
                .await?;

        match current {
            Some(state) if state.0 == to => Ok(()),
            Some(state) => Err(CoreError::InvalidTransition {
                entity: "file_operation",
                from: state.0.to_string(),
                to: to.to_string(),
            }),
            None => Err(CoreError::NotFound(format!("file operation {id} not found"))),
        }
    }

    /// Marks the archive uploaded: records its size and completes the
    /// operation in one update, guarded on the `Uploading` state.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn complete(&self, id: FileOperationId, size: i64) -> Result<()> {
        sqlx::query(
            "UPDATE file_operations SET state = $2, size = $3, updated_at = NOW() \
             WHERE id = $1 AND state = $4",
        )
        .bind(id)
        .bind(FileOperationState::Complete)
        .bind(size)
        .bind(FileOperationState::Uploading)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Marks a file operation as failed with a truncated error message.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn set_errored(&self, id: FileOperationId, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE file_operations SET state = $2, error = $3, updated_at = NOW() \
             WHERE id = $1 AND state != $2",
        )
        .bind(id)
        .bind(FileOperationState::Error)
        .bind(crate::models::truncate_error(message))
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}
