//! Repository for document relationship (backlink) rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{DocumentId, Relationship, RelationshipId},
};

const RELATIONSHIP_COLUMNS: &str = "id, document_id, target_document_id, created_at";

/// Repository for document relationship rows.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// All relationships originating from a document.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_document(&self, document_id: DocumentId) -> Result<Vec<Relationship>> {
        let relationships = sqlx::query_as::<_, Relationship>(&format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships \
             WHERE document_id = $1 ORDER BY created_at"
        ))
        .bind(document_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(relationships)
    }

    /// Reconciles a document's outgoing links to exactly `targets`.
    ///
    /// Inserts missing rows and deletes stale ones in one transaction, so
    /// repeated invocations with the same target set converge to the same
    /// rows. The unique `(document_id, target_document_id)` constraint plus
    /// `ON CONFLICT DO NOTHING` absorbs concurrent duplicate delivery.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails.
    pub async fn replace_for_document(
        &self,
        document_id: DocumentId,
        targets: &[DocumentId],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let target_uuids: Vec<uuid::Uuid> = targets.iter().map(|t| t.0).collect();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM relationships \
             WHERE document_id = $1 AND target_document_id != ALL($2)",
        )
        .bind(document_id)
        .bind(&target_uuids)
        .execute(&mut *tx)
        .await?;

        for target in targets {
            sqlx::query(
                r#"
                INSERT INTO relationships (id, document_id, target_document_id, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (document_id, target_document_id) DO NOTHING
                "#,
            )
            .bind(RelationshipId::new())
            .bind(document_id)
            .bind(target)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Removes every relationship involving a document, in either direction.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete_for_document(&self, document_id: DocumentId) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM relationships WHERE document_id = $1 OR target_document_id = $1",
        )
        .bind(document_id)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
