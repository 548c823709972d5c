//! Matches events against a team's webhook subscriptions.
//!
//! A wildcard processor: every public event is checked against the team's
//! enabled subscriptions, and one delivery task is scheduled per match so
//! each subscription retries on its own schedule.

use std::sync::Arc;

use async_trait::async_trait;
use quill_core::{Event, EventName};
use quill_processors::{ApplicableEvents, Processor};
use quill_queue::{TaskError, TaskScheduler};
use tracing::debug;

use crate::{
    store::DeliveryStore,
    task::{DeliverWebhookProps, DeliverWebhookTask},
};

/// Schedules webhook deliveries for matching subscriptions.
pub struct WebhookProcessor {
    store: Arc<dyn DeliveryStore>,
    scheduler: TaskScheduler,
}

impl WebhookProcessor {
    /// Creates the processor.
    pub fn new(store: Arc<dyn DeliveryStore>, scheduler: TaskScheduler) -> Self {
        Self { store, scheduler }
    }
}

#[async_trait]
impl Processor for WebhookProcessor {
    fn name(&self) -> &'static str {
        "webhooks"
    }

    fn applicable_events(&self) -> ApplicableEvents {
        ApplicableEvents::All
    }

    async fn perform(&self, event: &Event) -> Result<(), TaskError> {
        // The delayed leg of the debounce is internal machinery, never a
        // public event.
        if event.name == EventName::DocumentsUpdateDelayed {
            return Ok(());
        }

        let subscriptions = self.store.enabled_subscriptions(event.team_id).await?;
        let mut scheduled = 0;

        for subscription in subscriptions {
            if !subscription.subscribed_to(event.name) {
                continue;
            }
            self.scheduler
                .schedule::<DeliverWebhookTask>(DeliverWebhookProps {
                    subscription_id: subscription.id,
                    event: event.clone(),
                })
                .await
                .map_err(|e| {
                    TaskError::transient(format!(
                        "failed to schedule delivery for {}: {e}",
                        subscription.id
                    ))
                })?;
            scheduled += 1;
        }

        if scheduled > 0 {
            debug!(event = %event.name, team_id = %event.team_id, scheduled,
                "webhook deliveries scheduled");
        }
        Ok(())
    }
}
