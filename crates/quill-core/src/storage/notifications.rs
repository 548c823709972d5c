//! Repository for in-app notifications.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{DocumentId, Notification, NotificationId, NotificationKind, UserId},
};

const NOTIFICATION_COLUMNS: &str = "id, user_id, actor_id, document_id, kind, created_at";

/// Repository for in-app notifications.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Creates a notification unless an identical one already exists.
    ///
    /// The identity is `(user_id, kind, document_id)`, which is exactly what
    /// duplicate event delivery would reproduce. Returns the surviving row.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or lookup fails.
    pub async fn find_or_create(
        &self,
        user_id: UserId,
        actor_id: Option<UserId>,
        document_id: Option<DocumentId>,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> Result<Notification> {
        let existing = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 AND kind = $2 AND document_id IS NOT DISTINCT FROM $3"
        ))
        .bind(user_id)
        .bind(kind)
        .bind(document_id)
        .fetch_optional(&*self.pool)
        .await?;

        if let Some(notification) = existing {
            return Ok(notification);
        }

        let notification = sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (id, user_id, actor_id, document_id, kind, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {NOTIFICATION_COLUMNS}
            "#,
        ))
        .bind(NotificationId::new())
        .bind(user_id)
        .bind(actor_id)
        .bind(document_id)
        .bind(kind)
        .bind(now)
        .fetch_one(&*self.pool)
        .await?;

        Ok(notification)
    }
}
