//! Repository for collection database operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{Collection, CollectionId, ImportId, TeamId, UserId},
};

const COLLECTION_COLUMNS: &str =
    "id, team_id, name, source_id, import_id, created_by, created_at, deleted_at";

/// Repository for collection database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds a collection by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: CollectionId) -> Result<Option<Collection>> {
        let collection = sqlx::query_as::<_, Collection>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(collection)
    }

    /// All non-deleted collections of a team. Used by exports.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_for_export(&self, team_id: TeamId) -> Result<Vec<Collection>> {
        let collections = sqlx::query_as::<_, Collection>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections \
             WHERE team_id = $1 AND deleted_at IS NULL ORDER BY created_at"
        ))
        .bind(team_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(collections)
    }

    /// Creates a collection inside a transaction unless one already exists
    /// for the same `(import_id, source_id)` pair. Returns the surviving
    /// row, making import steps re-runnable.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or lookup fails.
    pub async fn find_or_create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        team_id: TeamId,
        import_id: ImportId,
        source_id: &str,
        name: &str,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Collection> {
        let existing = sqlx::query_as::<_, Collection>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE import_id = $1 AND source_id = $2"
        ))
        .bind(import_id)
        .bind(source_id)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(collection) = existing {
            return Ok(collection);
        }

        let collection = sqlx::query_as::<_, Collection>(&format!(
            r#"
            INSERT INTO collections (id, team_id, name, source_id, import_id, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLLECTION_COLUMNS}
            "#,
        ))
        .bind(CollectionId::new())
        .bind(team_id)
        .bind(name)
        .bind(source_id)
        .bind(import_id)
        .bind(created_by)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(collection)
    }
}
