//! Repository for webhook subscriptions.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{SubscriptionId, TeamId, WebhookSubscription},
};

const SUBSCRIPTION_COLUMNS: &str = "id, team_id, created_by, url, secret, events, enabled, \
                                    created_at, updated_at, deleted_at";

/// Repository for webhook subscriptions.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds a subscription by id, excluding soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: SubscriptionId) -> Result<Option<WebhookSubscription>> {
        let subscription = sqlx::query_as::<_, WebhookSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions \
             WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(subscription)
    }

    /// All enabled, non-deleted subscriptions of a team.
    ///
    /// Event-name filtering happens in memory via
    /// [`WebhookSubscription::subscribed_to`]; the listed events are a small
    /// set and the wildcard makes SQL-side filtering awkward.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_enabled_for_team(&self, team_id: TeamId) -> Result<Vec<WebhookSubscription>> {
        let subscriptions = sqlx::query_as::<_, WebhookSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions \
             WHERE team_id = $1 AND enabled = TRUE AND deleted_at IS NULL \
             ORDER BY created_at"
        ))
        .bind(team_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(subscriptions)
    }

    /// Disables a subscription after sustained delivery failure.
    ///
    /// Locks the row first so two concurrent deliveries tripping the
    /// breaker at once settle on a single update. Returns whether the
    /// subscription was still enabled when we disabled it.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails.
    pub async fn disable(&self, id: SubscriptionId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(bool,)> =
            sqlx::query_as("SELECT enabled FROM webhook_subscriptions WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((was_enabled,)) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        if was_enabled {
            sqlx::query(
                "UPDATE webhook_subscriptions SET enabled = FALSE, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(was_enabled)
    }
}
