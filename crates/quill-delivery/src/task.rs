//! The webhook delivery task.
//!
//! One job per (subscription, event): re-hydrate the model, write the audit
//! row, make a single signed POST outside any transaction, fill in the
//! outcome on the same row, then run the circuit breaker over the most
//! recent deliveries. Failures are recorded *and* re-thrown so the queue's
//! retry policy drives subsequent attempts.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use quill_core::{
    models::{WebhookDelivery, WebhookSubscription},
    Clock, DeliveryStatus, Event, SubscriptionId,
};
use quill_queue::{RetryPolicy, Task, TaskError, TaskOptions, TaskPriority};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    client::{sign_payload, truncate_body, HttpTransport, WebhookRequest},
    store::DeliveryStore,
};

/// Size of the recency window the circuit breaker inspects.
///
/// The subscription is disabled only when this many consecutive most-recent
/// deliveries all failed; a single success anywhere in the window keeps it
/// enabled. The window is read from the audit rows, not a counter.
pub const DISABLE_AFTER_CONSECUTIVE_FAILURES: usize = 25;

/// Props for [`DeliverWebhookTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverWebhookProps {
    /// Subscription to deliver to.
    pub subscription_id: SubscriptionId,

    /// The event being delivered.
    pub event: Event,
}

/// Delivers one event to one subscription.
pub struct DeliverWebhookTask {
    store: Arc<dyn DeliveryStore>,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl DeliverWebhookTask {
    /// Creates the task with its wiring.
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, transport, clock }
    }

    /// Builds the outbound envelope.
    ///
    /// Wire format: `{ event, payload: { id, model }, delivery: { id } }`.
    fn build_envelope(
        event: &Event,
        model: Option<serde_json::Value>,
        delivery_id: quill_core::DeliveryId,
    ) -> serde_json::Value {
        json!({
            "event": {
                "name": event.name,
                "teamId": event.team_id,
                "actorId": event.actor_id,
                "modelId": event.model_id,
                "documentId": event.document_id,
                "collectionId": event.collection_id,
                "data": event.data,
                "createdAt": event.created_at,
            },
            "payload": {
                "id": event.model_id,
                "model": model,
            },
            "delivery": {
                "id": delivery_id,
            },
        })
    }

    /// Trips the breaker when the whole recency window is failures.
    async fn check_circuit(&self, subscription: &WebhookSubscription) -> Result<(), TaskError> {
        let recent = self
            .store
            .recent_deliveries(subscription.id, DISABLE_AFTER_CONSECUTIVE_FAILURES as i64)
            .await?;

        let window_full = recent.len() == DISABLE_AFTER_CONSECUTIVE_FAILURES;
        let all_failed = recent.iter().all(|d| d.status == DeliveryStatus::Failed);

        if window_full && all_failed {
            let disabled = self.store.disable_subscription(subscription.id).await?;
            if disabled {
                warn!(
                    subscription_id = %subscription.id,
                    url = %subscription.url,
                    window = DISABLE_AFTER_CONSECUTIVE_FAILURES,
                    "subscription disabled after sustained delivery failure"
                );
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Task for DeliverWebhookTask {
    const NAME: &'static str = "webhooks.deliver";
    type Props = DeliverWebhookProps;

    fn options() -> TaskOptions {
        TaskOptions {
            priority: TaskPriority::Normal,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_secs(10),
                max_delay: Duration::from_secs(300),
                ..RetryPolicy::default()
            },
        }
    }

    async fn perform(&self, props: Self::Props) -> Result<(), TaskError> {
        let Some(subscription) = self.store.find_subscription(props.subscription_id).await? else {
            // Deleted since the event fired; nothing to deliver.
            return Ok(());
        };
        if !subscription.enabled {
            debug!(subscription_id = %subscription.id, "skipping delivery: subscription disabled");
            return Ok(());
        }

        let event = &props.event;
        let now = self.clock.now_utc();
        let delivery_id = quill_core::DeliveryId::new();

        // Missing model is presented as null, never treated as a failure.
        let model = self.store.model_snapshot(event).await?;
        let envelope = Self::build_envelope(event, model, delivery_id);

        // Audit row first: even a delivery that never leaves this process
        // is visible in the subscription's history.
        self.store
            .create_delivery(WebhookDelivery {
                id: delivery_id,
                subscription_id: subscription.id,
                status: DeliveryStatus::Pending,
                status_code: None,
                request_body: envelope.clone(),
                response_body: None,
                created_at: now,
            })
            .await?;

        let signature = subscription.secret.as_deref().map(|secret| {
            let body = envelope.to_string();
            sign_payload(secret, now.timestamp(), body.as_bytes())
        });

        // The HTTP call runs outside any database transaction; no lock is
        // held across this suspension point.
        let result = self
            .transport
            .post(WebhookRequest {
                delivery_id,
                url: subscription.url.clone(),
                event_name: event.name.to_string(),
                body: envelope,
                signature,
            })
            .await;

        let failure = match result {
            Ok(response) => {
                let status = if response.is_success() {
                    DeliveryStatus::Success
                } else {
                    DeliveryStatus::Failed
                };
                self.store
                    .record_outcome(
                        delivery_id,
                        status,
                        Some(i32::from(response.status_code)),
                        Some(truncate_body(&response.body)),
                    )
                    .await?;

                if response.is_success() {
                    info!(
                        subscription_id = %subscription.id,
                        delivery_id = %delivery_id,
                        status = response.status_code,
                        "webhook delivered"
                    );
                    None
                } else {
                    Some(TaskError::transient(format!(
                        "webhook endpoint returned {}",
                        response.status_code
                    )))
                }
            },
            Err(error) => {
                self.store
                    .record_outcome(
                        delivery_id,
                        DeliveryStatus::Failed,
                        None,
                        Some(error.to_string()),
                    )
                    .await?;
                Some(TaskError::transient(format!("webhook request failed: {error}")))
            },
        };

        // The breaker runs after every delivery, success or failure.
        self.check_circuit(&subscription).await?;

        match failure {
            None => Ok(()),
            Some(error) => {
                warn!(
                    subscription_id = %subscription.id,
                    delivery_id = %delivery_id,
                    error = %error,
                    "webhook delivery failed"
                );
                Err(error)
            },
        }
    }

    async fn on_failed(&self, props: Self::Props) {
        // The audit rows already tell the whole story; exhaustion is only
        // worth a log line.
        warn!(
            subscription_id = %props.subscription_id,
            event = %props.event.name,
            "webhook delivery abandoned after exhausting retries"
        );
    }
}
