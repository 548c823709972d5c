//! Repository for team aggregate operations.

use std::sync::Arc;

use sqlx::{PgPool, Row};

use crate::{
    error::Result,
    models::{Team, TeamId},
};

/// Repository for team aggregate operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds a team by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: TeamId) -> Result<Option<Team>> {
        let team = sqlx::query_as::<_, Team>(
            "SELECT id, name, active_user_count, created_at, updated_at FROM teams WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(team)
    }

    /// Recalculates the team's active-seat counter from the users table.
    ///
    /// Runs in its own transaction with a `FOR UPDATE` lock on the team row
    /// so concurrent suspend/activate events serialize their read-count-write
    /// cycles. Recalculating instead of applying a delta makes duplicate
    /// event delivery a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails. Returns the new count.
    pub async fn recalculate_active_users(&self, team_id: TeamId) -> Result<i32> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM teams WHERE id = $1 FOR UPDATE")
            .bind(team_id)
            .fetch_one(&mut *tx)
            .await?;

        let row = sqlx::query(
            "SELECT COUNT(*)::INT AS active FROM users \
             WHERE team_id = $1 AND suspended_at IS NULL",
        )
        .bind(team_id)
        .fetch_one(&mut *tx)
        .await?;
        let active: i32 = row.try_get("active")?;

        sqlx::query("UPDATE teams SET active_user_count = $2, updated_at = NOW() WHERE id = $1")
            .bind(team_id)
            .bind(active)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(active)
    }
}
