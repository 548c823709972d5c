//! Repository for document revision snapshots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Document, DocumentId, Revision, RevisionId},
};

const REVISION_COLUMNS: &str = "id, document_id, title, text, created_by, created_at";

/// Repository for document revision snapshots.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// The most recent revision of a document, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn latest_for_document(&self, document_id: DocumentId) -> Result<Option<Revision>> {
        let revision = sqlx::query_as::<_, Revision>(&format!(
            "SELECT {REVISION_COLUMNS} FROM revisions \
             WHERE document_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(document_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(revision)
    }

    /// Snapshots a document's current content as a new revision.
    ///
    /// Callers are expected to compare against [`latest_for_document`] first
    /// so duplicate event delivery does not pile up identical snapshots.
    ///
    /// [`latest_for_document`]: Self::latest_for_document
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create_from_document(
        &self,
        document: &Document,
        now: DateTime<Utc>,
    ) -> Result<Revision> {
        let revision = sqlx::query_as::<_, Revision>(&format!(
            r#"
            INSERT INTO revisions (id, document_id, title, text, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {REVISION_COLUMNS}
            "#,
        ))
        .bind(RevisionId::new())
        .bind(document.id)
        .bind(&document.title)
        .bind(&document.text)
        .bind(document.created_by)
        .bind(now)
        .fetch_one(&*self.pool)
        .await?;

        Ok(revision)
    }
}
