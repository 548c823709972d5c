//! Repository for user lookups.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{TeamId, User, UserId},
};

const USER_COLUMNS: &str = "id, team_id, name, email, suspended_at, created_at";

/// Repository for user lookups.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds a user by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&*self.pool)
                .await?;

        Ok(user)
    }

    /// All non-suspended members of a team. Notification fan-out source.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_active_by_team(&self, team_id: TeamId) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE team_id = $1 AND suspended_at IS NULL ORDER BY created_at"
        ))
        .bind(team_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(users)
    }
}
