//! Repository for import job state.
//!
//! State transitions are guarded compare-and-set updates: the `UPDATE`
//! only matches when the row is still in the expected source state, so a
//! redelivered task observes zero affected rows instead of corrupting the
//! state machine.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::{CoreError, Result},
    models::{Import, ImportId, ImportState},
};

const IMPORT_COLUMNS: &str = "id, team_id, created_by, state, input_key, error, document_count, \
                              created_at, updated_at";

/// Repository for import job state.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds an import by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: ImportId) -> Result<Option<Import>> {
        let import = sqlx::query_as::<_, Import>(&format!(
            "SELECT {IMPORT_COLUMNS} FROM imports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(import)
    }

    /// Advances the import state machine: `from` -> `to`.
    ///
    /// Succeeds silently when the row is already in `to` (idempotent
    /// resume). Fails with `InvalidTransition` when the row is in any
    /// other state.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` for illegal transitions, or a
    /// database error.
    pub async fn transition(&self, id: ImportId, from: ImportState, to: ImportState) -> Result<()> {
        let result = sqlx::query(
            "UPDATE imports SET state = $3, updated_at = NOW() WHERE id = $1 AND state = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        self.verify_current_state(id, to).await
    }

    /// Transaction variant of [`transition`], for coupling the final state
    /// advance with the batch of writes it summarizes.
    ///
    /// [`transition`]: Self::transition
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` for illegal transitions, or a
    /// database error.
    pub async fn transition_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: ImportId,
        from: ImportState,
        to: ImportState,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE imports SET state = $3, updated_at = NOW() WHERE id = $1 AND state = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current: Option<(ImportState,)> =
            sqlx::query_as("SELECT state FROM imports WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?;

        Self::check_transition_outcome(id, current.map(|(s,)| s), to)
    }

    /// Marks an import as failed with a truncated error message.
    ///
    /// Terminal and unconditional apart from already-errored rows; used by
    /// the pipeline's failure hook.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn set_errored(&self, id: ImportId, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE imports SET state = $2, error = $3, updated_at = NOW() \
             WHERE id = $1 AND state != $2",
        )
        .bind(id)
        .bind(ImportState::Errored)
        .bind(crate::models::truncate_error(message))
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Updates the running document counter.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn set_document_count_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: ImportId,
        count: i32,
    ) -> Result<()> {
        sqlx::query("UPDATE imports SET document_count = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(count)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn verify_current_state(&self, id: ImportId, expected: ImportState) -> Result<()> {
        let current: Option<(ImportState,)> =
            sqlx::query_as("SELECT state FROM imports WHERE id = $1")
                .bind(id)
                .fetch_optional(&*self.pool)
                .await?;

        Self::check_transition_outcome(id, current.map(|(s,)| s), expected)
    }

    fn check_transition_outcome(
        id: ImportId,
        current: Option<ImportState>,
        expected: ImportState,
    ) -> Result<()> {
        match current {
            Some(state) if state == expected => Ok(()),
            Some(state) => Err(CoreError::InvalidTransition {
                entity: "import",
                from: state.to_string(),
                to: expected.to_string(),
            }),
            None => Err(CoreError::NotFound(format!("import {id} not found"))),
        }
    }
}
