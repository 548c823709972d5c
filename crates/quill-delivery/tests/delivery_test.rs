//! Integration tests for webhook delivery: audit rows, envelope shape,
//! failure propagation, and the recency-window circuit breaker.

use std::sync::Arc;

use chrono::{Duration, Utc};
use quill_core::{
    models::{DeliveryStatus, WebhookDelivery, WebhookSubscription},
    DeliveryId, Event, EventName, SubscriptionId, TeamId, TestClock, UserId,
};
use quill_delivery::{
    store::mock::InMemoryDeliveryStore, DeliverWebhookProps, DeliverWebhookTask, DeliveryError,
    HttpTransport, WebhookRequest, WebhookResponse, DISABLE_AFTER_CONSECUTIVE_FAILURES,
};
use quill_queue::{BoxFuture, Task};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Transport that replays scripted outcomes and records requests.
#[derive(Default)]
struct ScriptedTransport {
    outcomes: Mutex<Vec<Result<WebhookResponse, DeliveryError>>>,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self::default()
    }

    async fn push_outcome(&self, outcome: Result<WebhookResponse, DeliveryError>) {
        self.outcomes.lock().await.push(outcome);
    }

    async fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().await.clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn post(
        &self,
        request: WebhookRequest,
    ) -> BoxFuture<'_, Result<WebhookResponse, DeliveryError>> {
        Box::pin(async move {
            self.requests.lock().await.push(request);
            let mut outcomes = self.outcomes.lock().await;
            if outcomes.is_empty() {
                Ok(WebhookResponse { status_code: 200, body: "ok".to_string() })
            } else {
                outcomes.remove(0)
            }
        })
    }
}

fn subscription(team_id: TeamId, secret: Option<&str>) -> WebhookSubscription {
    WebhookSubscription {
        id: SubscriptionId::new(),
        team_id,
        created_by: UserId::new(),
        url: "https://hooks.example.com/quill".to_string(),
        secret: secret.map(str::to_string),
        events: vec!["*".to_string()],
        enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    }
}

fn publish_event(team_id: TeamId, model_id: Uuid) -> Event {
    let mut event = Event::new(EventName::DocumentsPublish, team_id, UserId::new(), Utc::now());
    event.model_id = Some(model_id);
    event.document_id = Some(model_id.into());
    event
}

fn failed_delivery(subscription_id: SubscriptionId, age_secs: i64) -> WebhookDelivery {
    WebhookDelivery {
        id: DeliveryId::new(),
        subscription_id,
        status: DeliveryStatus::Failed,
        status_code: Some(503),
        request_body: serde_json::json!({}),
        response_body: None,
        created_at: Utc::now() - Duration::seconds(age_secs),
    }
}

struct Fixture {
    store: Arc<InMemoryDeliveryStore>,
    transport: Arc<ScriptedTransport>,
    task: DeliverWebhookTask,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryDeliveryStore::new());
    let transport = Arc::new(ScriptedTransport::new());
    let clock = Arc::new(TestClock::new());
    let task = DeliverWebhookTask::new(store.clone(), transport.clone(), clock);
    Fixture { store, transport, task }
}

#[tokio::test]
async fn successful_delivery_audits_and_signs() {
    let f = fixture();
    let team_id = TeamId::new();
    let sub = subscription(team_id, Some("shhh"));
    let sub_id = sub.id;
    f.store.insert_subscription(sub).await;

    let model_id = Uuid::new_v4();
    f.store.insert_snapshot(model_id, serde_json::json!({"title": "Launch plan"})).await;

    f.task
        .perform(DeliverWebhookProps {
            subscription_id: sub_id,
            event: publish_event(team_id, model_id),
        })
        .await
        .unwrap();

    let deliveries = f.store.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Success);
    assert_eq!(deliveries[0].status_code, Some(200));

    // Envelope shape: { event, payload: { id, model }, delivery: { id } }.
    let body = &deliveries[0].request_body;
    assert_eq!(body["event"]["name"], "documents.publish");
    assert_eq!(body["payload"]["id"], serde_json::json!(model_id));
    assert_eq!(body["payload"]["model"]["title"], "Launch plan");
    assert_eq!(body["delivery"]["id"], serde_json::json!(deliveries[0].id));

    let requests = f.transport.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(requests[0].signature.as_deref().unwrap().starts_with("t="));
    assert_eq!(requests[0].event_name, "documents.publish");
}

#[tokio::test]
async fn missing_model_presents_null_not_failure() {
    let f = fixture();
    let team_id = TeamId::new();
    let sub = subscription(team_id, None);
    let sub_id = sub.id;
    f.store.insert_subscription(sub).await;

    // No snapshot seeded: the referenced document is gone.
    f.task
        .perform(DeliverWebhookProps {
            subscription_id: sub_id,
            event: publish_event(team_id, Uuid::new_v4()),
        })
        .await
        .unwrap();

    let deliveries = f.store.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Success);
    assert!(deliveries[0].request_body["payload"]["model"].is_null());

    let requests = f.transport.requests().await;
    assert!(requests[0].signature.is_none());
}

#[tokio::test]
async fn failed_delivery_is_recorded_then_rethrown() {
    let f = fixture();
    let team_id = TeamId::new();
    let sub = subscription(team_id, None);
    let sub_id = sub.id;
    f.store.insert_subscription(sub).await;
    f.transport
        .push_outcome(Ok(WebhookResponse { status_code: 500, body: "boom".to_string() }))
        .await;

    let error = f
        .task
        .perform(DeliverWebhookProps {
            subscription_id: sub_id,
            event: publish_event(team_id, Uuid::new_v4()),
        })
        .await
        .unwrap_err();

    // Recorded AND re-thrown: the audit row exists and the queue retries.
    assert!(error.is_retryable());
    let deliveries = f.store.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
    assert_eq!(deliveries[0].status_code, Some(500));
    assert_eq!(deliveries[0].response_body.as_deref(), Some("boom"));
}

#[tokio::test]
async fn network_failure_is_recorded_then_rethrown() {
    let f = fixture();
    let team_id = TeamId::new();
    let sub = subscription(team_id, None);
    let sub_id = sub.id;
    f.store.insert_subscription(sub).await;
    f.transport.push_outcome(Err(DeliveryError::timeout(10))).await;

    let error = f
        .task
        .perform(DeliverWebhookProps {
            subscription_id: sub_id,
            event: publish_event(team_id, Uuid::new_v4()),
        })
        .await
        .unwrap_err();

    assert!(error.is_retryable());
    let deliveries = f.store.deliveries().await;
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
    assert_eq!(deliveries[0].status_code, None);
}

#[tokio::test]
async fn disabled_or_deleted_subscription_drops_silently() {
    let f = fixture();
    let team_id = TeamId::new();
    let mut sub = subscription(team_id, None);
    sub.enabled = false;
    let sub_id = sub.id;
    f.store.insert_subscription(sub).await;

    f.task
        .perform(DeliverWebhookProps {
            subscription_id: sub_id,
            event: publish_event(team_id, Uuid::new_v4()),
        })
        .await
        .unwrap();

    // Unknown subscription id behaves the same.
    f.task
        .perform(DeliverWebhookProps {
            subscription_id: SubscriptionId::new(),
            event: publish_event(team_id, Uuid::new_v4()),
        })
        .await
        .unwrap();

    assert!(f.store.deliveries().await.is_empty());
    assert!(f.transport.requests().await.is_empty());
}

#[tokio::test]
async fn twenty_fifth_consecutive_failure_trips_the_breaker() {
    let f = fixture();
    let team_id = TeamId::new();
    let sub = subscription(team_id, None);
    let sub_id = sub.id;
    f.store.insert_subscription(sub).await;

    // 24 historical failures, newest last.
    for i in 0..(DISABLE_AFTER_CONSECUTIVE_FAILURES - 1) {
        f.store.push_delivery(failed_delivery(sub_id, 1_000 - i as i64)).await;
    }

    f.transport
        .push_outcome(Ok(WebhookResponse { status_code: 503, body: String::new() }))
        .await;

    let _ = f
        .task
        .perform(DeliverWebhookProps {
            subscription_id: sub_id,
            event: publish_event(team_id, Uuid::new_v4()),
        })
        .await;

    assert!(!f.store.is_enabled(sub_id).await, "25 consecutive failures must disable");
}

#[tokio::test]
async fn success_in_window_keeps_subscription_enabled() {
    let f = fixture();
    let team_id = TeamId::new();
    let sub = subscription(team_id, None);
    let sub_id = sub.id;
    f.store.insert_subscription(sub).await;

    // 24 failures followed by one success: the window is not all failures.
    for i in 0..(DISABLE_AFTER_CONSECUTIVE_FAILURES - 1) {
        f.store.push_delivery(failed_delivery(sub_id, 1_000 - i as i64)).await;
    }

    f.task
        .perform(DeliverWebhookProps {
            subscription_id: sub_id,
            event: publish_event(team_id, Uuid::new_v4()),
        })
        .await
        .unwrap();

    assert!(f.store.is_enabled(sub_id).await, "a success inside the window must not trip");

    // And one more failure after the success still leaves 24 consecutive.
    f.transport
        .push_outcome(Ok(WebhookResponse { status_code: 500, body: String::new() }))
        .await;
    let _ = f
        .task
        .perform(DeliverWebhookProps {
            subscription_id: sub_id,
            event: publish_event(team_id, Uuid::new_v4()),
        })
        .await;

    assert!(f.store.is_enabled(sub_id).await);
}

#[tokio::test]
async fn fewer_than_window_failures_never_trips() {
    let f = fixture();
    let team_id = TeamId::new();
    let sub = subscription(team_id, None);
    let sub_id = sub.id;
    f.store.insert_subscription(sub).await;

    for _ in 0..10 {
        f.transport
            .push_outcome(Ok(WebhookResponse { status_code: 502, body: String::new() }))
            .await;
        let _ = f
            .task
            .perform(DeliverWebhookProps {
                subscription_id: sub_id,
                event: publish_event(team_id, Uuid::new_v4()),
            })
            .await;
    }

    assert!(f.store.is_enabled(sub_id).await);
    assert_eq!(f.store.deliveries().await.len(), 10);
}
