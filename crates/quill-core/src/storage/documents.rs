//! Repository for document database operations.
//!
//! Covers the worker subsystem's needs: lookups for processors, idempotent
//! creation during imports (keyed by external source id), placeholder
//! substitution at import finalize, and partitioned purge of soft-deleted
//! rows for the maintenance task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{CollectionId, Document, DocumentId, ImportId, TeamId, UserId},
    partition::KeyRange,
};

const DOCUMENT_COLUMNS: &str = "id, team_id, collection_id, title, text, source_id, import_id, \
                                created_by, published_at, deleted_at, created_at, updated_at";

/// Repository for document database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Finds a document by id, including soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(document)
    }

    /// Finds an imported document by its external source id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_source_id(
        &self,
        import_id: ImportId,
        source_id: &str,
    ) -> Result<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE import_id = $1 AND source_id = $2"
        ))
        .bind(import_id)
        .bind(source_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(document)
    }

    /// All documents created by an import, ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_import(&self, import_id: ImportId) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE import_id = $1 ORDER BY created_at"
        ))
        .bind(import_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(documents)
    }

    /// Creates a document inside a transaction unless one already exists for
    /// the same `(import_id, source_id)` pair. Returns the surviving row.
    ///
    /// The idempotence key makes re-running an import step safe: the second
    /// run finds the row the first run created.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or lookup fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn find_or_create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        team_id: TeamId,
        collection_id: CollectionId,
        import_id: ImportId,
        source_id: &str,
        title: &str,
        text: &str,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Document> {
        let existing = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE import_id = $1 AND source_id = $2"
        ))
        .bind(import_id)
        .bind(source_id)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(document) = existing {
            return Ok(document);
        }

        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            INSERT INTO documents (
                id, team_id, collection_id, title, text, source_id, import_id,
                created_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {DOCUMENT_COLUMNS}
            "#,
        ))
        .bind(DocumentId::new())
        .bind(team_id)
        .bind(collection_id)
        .bind(title)
        .bind(text)
        .bind(source_id)
        .bind(import_id)
        .bind(created_by)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(document)
    }

    /// Rewrites a document's text inside a transaction.
    ///
    /// Used by import finalize to substitute link placeholders. Deliberately
    /// does not bump `updated_at`, so finalize does not race the debounce.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn update_text_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: DocumentId,
        text: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE documents SET text = $2 WHERE id = $1")
            .bind(id)
            .bind(text)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// All published, non-deleted documents of a team. Used by exports.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_for_export(&self, team_id: TeamId) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE team_id = $1 AND deleted_at IS NULL ORDER BY created_at"
        ))
        .bind(team_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(documents)
    }

    /// Permanently removes soft-deleted documents older than `cutoff`,
    /// optionally restricted to a partition of the key space.
    ///
    /// Partitioned callers rely on disjoint ranges instead of locks; two
    /// workers with different partition indexes can never touch the same
    /// row.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn purge_deleted(
        &self,
        range: Option<KeyRange>,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = match range {
            Some(range) => {
                sqlx::query(
                    "DELETE FROM documents \
                     WHERE deleted_at IS NOT NULL AND deleted_at < $1 \
                       AND id >= $2 AND id <= $3",
                )
                .bind(cutoff)
                .bind(range.lower)
                .bind(range.upper)
                .execute(&*self.pool)
                .await?
            },
            None => {
                sqlx::query("DELETE FROM documents WHERE deleted_at IS NOT NULL AND deleted_at < $1")
                    .bind(cutoff)
                    .execute(&*self.pool)
                    .await?
            },
        };

        Ok(result.rows_affected())
    }
}
