//! Repository for webhook delivery audit rows.
//!
//! Rows are append-only: created before the HTTP attempt, then the response
//! fields of the same row are filled in once. Nothing else ever updates
//! them, which is what makes the recency-window circuit breaker a plain
//! ordered read.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{DeliveryId, DeliveryStatus, SubscriptionId, WebhookDelivery},
};

const DELIVERY_COLUMNS: &str =
    "id, subscription_id, status, status_code, request_body, response_body, created_at";

/// Repository for webhook delivery audit rows.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Records a delivery attempt before the HTTP call is made.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create(&self, delivery: &WebhookDelivery) -> Result<DeliveryId> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO webhook_deliveries (
                id, subscription_id, status, status_code, request_body, response_body, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.subscription_id)
        .bind(delivery.status)
        .bind(delivery.status_code)
        .bind(sqlx::types::Json(&delivery.request_body))
        .bind(&delivery.response_body)
        .bind(delivery.created_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(id)
    }

    /// Fills in the outcome of a delivery attempt on its existing row.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn record_response(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        status_code: Option<i32>,
        response_body: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_deliveries \
             SET status = $2, status_code = $3, response_body = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(status_code)
        .bind(response_body)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// The most recent deliveries for a subscription, newest first.
    ///
    /// This is the circuit breaker's read: the caller checks whether the
    /// full window is failures.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn recent_for_subscription(
        &self,
        subscription_id: SubscriptionId,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>> {
        let deliveries = sqlx::query_as::<_, WebhookDelivery>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries \
             WHERE subscription_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(subscription_id)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(deliveries)
    }
}
