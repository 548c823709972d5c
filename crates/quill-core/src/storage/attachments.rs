//! Repository for attachment blobs created during import.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{Attachment, AttachmentId, DocumentId, ImportId, TeamId},
};

const ATTACHMENT_COLUMNS: &str =
    "id, team_id, document_id, import_id, key, content_type, size, created_at";

/// Repository for attachment blobs.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Records an attachment created while persisting an import batch.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        team_id: TeamId,
        document_id: Option<DocumentId>,
        import_id: ImportId,
        key: &str,
        content_type: &str,
        size: i64,
        now: DateTime<Utc>,
    ) -> Result<Attachment> {
        let attachment = sqlx::query_as::<_, Attachment>(&format!(
            r#"
            INSERT INTO attachments (id, team_id, document_id, import_id, key, content_type, size, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ATTACHMENT_COLUMNS}
            "#,
        ))
        .bind(AttachmentId::new())
        .bind(team_id)
        .bind(document_id)
        .bind(import_id)
        .bind(key)
        .bind(content_type)
        .bind(size)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(attachment)
    }

    /// All attachments created by an import.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_import(&self, import_id: ImportId) -> Result<Vec<Attachment>> {
        let attachments = sqlx::query_as::<_, Attachment>(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE import_id = $1 ORDER BY created_at"
        ))
        .bind(import_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(attachments)
    }

    /// Deletes every attachment row created by an import.
    ///
    /// Used by the failure path after blob cleanup; the blobs themselves are
    /// removed through the file store.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete_by_import(&self, import_id: ImportId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM attachments WHERE import_id = $1")
            .bind(import_id)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
