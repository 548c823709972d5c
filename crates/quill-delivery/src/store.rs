//! Storage abstraction for webhook delivery.
//!
//! Trait-based so delivery logic (envelope construction, audit rows, the
//! circuit breaker) can be tested against an in-memory double; production
//! wraps the concrete repository layer.

use std::sync::Arc;

use quill_core::{
    error::Result,
    models::{WebhookDelivery, WebhookSubscription},
    storage::Storage,
    DeliveryId, DeliveryStatus, Event, EventName, SubscriptionId, TeamId,
};
use quill_queue::BoxFuture;

use crate::presenters;

/// Storage operations required by webhook delivery.
pub trait DeliveryStore: Send + Sync + 'static {
    /// Fetches a subscription by id.
    fn find_subscription(
        &self,
        id: SubscriptionId,
    ) -> BoxFuture<'_, Result<Option<WebhookSubscription>>>;

    /// Enabled subscriptions of a team.
    fn enabled_subscriptions(
        &self,
        team_id: TeamId,
    ) -> BoxFuture<'_, Result<Vec<WebhookSubscription>>>;

    /// Records a delivery attempt before its HTTP call.
    fn create_delivery(&self, delivery: WebhookDelivery) -> BoxFuture<'_, Result<()>>;

    /// Fills the outcome onto an existing delivery row.
    fn record_outcome(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        status_code: Option<i32>,
        response_body: Option<String>,
    ) -> BoxFuture<'_, Result<()>>;

    /// The most recent deliveries for a subscription, newest first.
    fn recent_deliveries(
        &self,
        subscription_id: SubscriptionId,
        limit: i64,
    ) -> BoxFuture<'_, Result<Vec<WebhookDelivery>>>;

    /// Disables a subscription. Returns whether it was enabled before.
    fn disable_subscription(&self, id: SubscriptionId) -> BoxFuture<'_, Result<bool>>;

    /// Re-hydrates the model a delivery's event refers to.
    ///
    /// `None` when the model has been deleted since the event fired; the
    /// payload then carries `model: null`.
    fn model_snapshot(&self, event: &Event) -> BoxFuture<'_, Result<Option<serde_json::Value>>>;
}

/// Production implementation over the PostgreSQL repositories.
pub struct PostgresDeliveryStore {
    storage: Arc<Storage>,
}

impl PostgresDeliveryStore {
    /// Creates a new adapter over the repository layer.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl DeliveryStore for PostgresDeliveryStore {
    fn find_subscription(
        &self,
        id: SubscriptionId,
    ) -> BoxFuture<'_, Result<Option<WebhookSubscription>>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_subscriptions.find_by_id(id).await })
    }

    fn enabled_subscriptions(
        &self,
        team_id: TeamId,
    ) -> BoxFuture<'_, Result<Vec<WebhookSubscription>>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_subscriptions.find_enabled_for_team(team_id).await })
    }

    fn create_delivery(&self, delivery: WebhookDelivery) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_deliveries.create(&delivery).await.map(|_| ()) })
    }

    fn record_outcome(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        status_code: Option<i32>,
        response_body: Option<String>,
    ) -> BoxFuture<'_, Result<()>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage
                .webhook_deliveries
                .record_response(id, status, status_code, response_body.as_deref())
                .await
        })
    }

    fn recent_deliveries(
        &self,
        subscription_id: SubscriptionId,
        limit: i64,
    ) -> BoxFuture<'_, Result<Vec<WebhookDelivery>>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.webhook_deliveries.recent_for_subscription(subscription_id, limit).await
        })
    }

    fn disable_subscription(&self, id: SubscriptionId) -> BoxFuture<'_, Result<bool>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhook_subscriptions.disable(id).await })
    }

    fn model_snapshot(&self, event: &Event) -> BoxFuture<'_, Result<Option<serde_json::Value>>> {
        let storage = self.storage.clone();
        let event = event.clone();
        Box::pin(async move {
            match event.name {
                EventName::DocumentsCreate
                | EventName::DocumentsUpdate
                | EventName::DocumentsUpdateDelayed
                | EventName::DocumentsUpdateDebounced
                | EventName::DocumentsPublish
                | EventName::DocumentsDelete => {
                    let Some(document_id) = event.document_id else { return Ok(None) };
                    Ok(storage
                        .documents
                        .find_by_id(document_id)
                        .await?
                        .map(|d| presenters::present_document(&d)))
                },
                EventName::CollectionsCreate | EventName::CollectionsDelete => {
                    let Some(collection_id) = event.collection_id else { return Ok(None) };
                    Ok(storage
                        .collections
                        .find_by_id(collection_id)
                        .await?
                        .map(|c| presenters::present_collection(&c)))
                },
                EventName::UsersSuspend | EventName::UsersActivate => {
                    let Some(model_id) = event.model_id else { return Ok(None) };
                    Ok(storage
                        .users
                        .find_by_id(model_id.into())
                        .await?
                        .map(|u| presenters::present_user(&u)))
                },
                EventName::ImportsCreate
                | EventName::FileOperationsCreate
                | EventName::FileOperationsUpdate => Ok(None),
            }
        })
    }
}

pub mod mock {
    //! In-memory delivery store for tests.

    use std::{collections::HashMap, sync::Arc};

    use tokio::sync::RwLock;
    use uuid::Uuid;

    use super::{
        BoxFuture, DeliveryId, DeliveryStatus, DeliveryStore, Event, Result, SubscriptionId,
        TeamId, WebhookDelivery, WebhookSubscription,
    };

    /// Deterministic in-memory implementation of [`DeliveryStore`].
    #[derive(Default)]
    pub struct InMemoryDeliveryStore {
        subscriptions: Arc<RwLock<HashMap<SubscriptionId, WebhookSubscription>>>,
        deliveries: Arc<RwLock<Vec<WebhookDelivery>>>,
        snapshots: Arc<RwLock<HashMap<Uuid, serde_json::Value>>>,
    }

    impl InMemoryDeliveryStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a subscription.
        pub async fn insert_subscription(&self, subscription: WebhookSubscription) {
            self.subscriptions.write().await.insert(subscription.id, subscription);
        }

        /// Seeds a model snapshot for `model_snapshot` lookups.
        pub async fn insert_snapshot(&self, model_id: Uuid, snapshot: serde_json::Value) {
            self.snapshots.write().await.insert(model_id, snapshot);
        }

        /// Seeds a historical delivery row (oldest call first).
        pub async fn push_delivery(&self, delivery: WebhookDelivery) {
            self.deliveries.write().await.push(delivery);
        }

        /// Snapshot of all delivery rows, oldest first.
        pub async fn deliveries(&self) -> Vec<WebhookDelivery> {
            self.deliveries.read().await.clone()
        }

        /// Whether a subscription is currently enabled.
        pub async fn is_enabled(&self, id: SubscriptionId) -> bool {
            self.subscriptions.read().await.get(&id).is_some_and(|s| s.enabled)
        }
    }

    impl DeliveryStore for InMemoryDeliveryStore {
        fn find_subscription(
            &self,
            id: SubscriptionId,
        ) -> BoxFuture<'_, Result<Option<WebhookSubscription>>> {
            Box::pin(async move { Ok(self.subscriptions.read().await.get(&id).cloned()) })
        }

        fn enabled_subscriptions(
            &self,
            team_id: TeamId,
        ) -> BoxFuture<'_, Result<Vec<WebhookSubscription>>> {
            Box::pin(async move {
                let mut subscriptions: Vec<WebhookSubscription> = self
                    .subscriptions
                    .read()
                    .await
                    .values()
                    .filter(|s| s.team_id == team_id && s.enabled && s.deleted_at.is_none())
                    .cloned()
                    .collect();
                subscriptions.sort_by_key(|s| s.created_at);
                Ok(subscriptions)
            })
        }

        fn create_delivery(&self, delivery: WebhookDelivery) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.deliveries.write().await.push(delivery);
                Ok(())
            })
        }

        fn record_outcome(
            &self,
            id: DeliveryId,
            status: DeliveryStatus,
            status_code: Option<i32>,
            response_body: Option<String>,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if let Some(delivery) =
                    self.deliveries.write().await.iter_mut().find(|d| d.id == id)
                {
                    delivery.status = status;
                    delivery.status_code = status_code;
                    delivery.response_body = response_body;
                }
                Ok(())
            })
        }

        fn recent_deliveries(
            &self,
            subscription_id: SubscriptionId,
            limit: i64,
        ) -> BoxFuture<'_, Result<Vec<WebhookDelivery>>> {
            Box::pin(async move {
                let mut rows: Vec<WebhookDelivery> = self
                    .deliveries
                    .read()
                    .await
                    .iter()
                    .filter(|d| d.subscription_id == subscription_id)
                    .cloned()
                    .collect();
                // Newest first; insertion order breaks created_at ties so
                // tests with coarse clocks stay deterministic.
                rows.reverse();
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                Ok(rows)
            })
        }

        fn disable_subscription(&self, id: SubscriptionId) -> BoxFuture<'_, Result<bool>> {
            Box::pin(async move {
                let mut subscriptions = self.subscriptions.write().await;
                match subscriptions.get_mut(&id) {
                    Some(subscription) if subscription.enabled => {
                        subscription.enabled = false;
                        Ok(true)
                    },
                    _ => Ok(false),
                }
            })
        }

        fn model_snapshot(
            &self,
            event: &Event,
        ) -> BoxFuture<'_, Result<Option<serde_json::Value>>> {
            let model_id = event.model_id;
            Box::pin(async move {
                let Some(model_id) = model_id else { return Ok(None) };
                Ok(self.snapshots.read().await.get(&model_id).cloned())
            })
        }
    }
}
