//! End-to-end scenarios over the fully wired event pipeline: bus ->
//! dispatch -> processors -> tasks, on the in-memory queue with a test
//! clock.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use quill_core::{
    models::{Document, User, WebhookSubscription},
    Clock, CollectionId, DocumentId, Event, EventName, SubscriptionId, TeamId, TestClock, UserId,
};
use quill_delivery::{
    store::mock::InMemoryDeliveryStore, DeliverWebhookTask, DeliveryError, HttpTransport,
    WebhookProcessor, WebhookRequest, WebhookResponse,
};
use quill_processors::{
    store::mock::InMemoryWorkspace, BacklinksProcessor, DispatchEventTask, EventBus,
    NotificationsProcessor, ProcessEventTask, ProcessorRegistry, RevisionsProcessor,
    UserLifecycleProcessor,
};
use quill_queue::{
    queue::mock::InMemoryQueue, BoxFuture, Queue, TaskEngine, TaskRegistry, TaskScheduler,
    WorkerConfig,
};
use tokio::sync::Mutex;

/// Transport that acknowledges everything and records the requests.
#[derive(Default)]
struct RecordingTransport {
    requests: Mutex<Vec<WebhookRequest>>,
}

impl RecordingTransport {
    async fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().await.clone()
    }
}

impl HttpTransport for RecordingTransport {
    fn post(
        &self,
        request: WebhookRequest,
    ) -> BoxFuture<'_, Result<WebhookResponse, DeliveryError>> {
        Box::pin(async move {
            self.requests.lock().await.push(request);
            Ok(WebhookResponse { status_code: 200, body: "ok".to_string() })
        })
    }
}

struct Harness {
    queue: Arc<InMemoryQueue>,
    clock: Arc<TestClock>,
    engine: TaskEngine,
    bus: EventBus,
    workspace: Arc<InMemoryWorkspace>,
    delivery_store: Arc<InMemoryDeliveryStore>,
    transport: Arc<RecordingTransport>,
}

fn harness() -> Harness {
    let queue = Arc::new(InMemoryQueue::new());
    let clock = Arc::new(TestClock::new());
    let scheduler = TaskScheduler::new(queue.clone(), clock.clone());
    let bus = EventBus::new(scheduler.clone());
    let workspace = Arc::new(InMemoryWorkspace::new());
    let delivery_store = Arc::new(InMemoryDeliveryStore::new());
    let transport = Arc::new(RecordingTransport::default());

    let mut processors = ProcessorRegistry::new();
    processors.register(Arc::new(RevisionsProcessor::new(workspace.clone(), bus.clone())));
    processors.register(Arc::new(BacklinksProcessor::new(workspace.clone())));
    processors.register(Arc::new(NotificationsProcessor::new(workspace.clone())));
    processors.register(Arc::new(UserLifecycleProcessor::new(workspace.clone())));
    processors.register(Arc::new(WebhookProcessor::new(
        delivery_store.clone(),
        scheduler.clone(),
    )));
    let processors = Arc::new(processors);

    let mut tasks = TaskRegistry::new();
    tasks.register(DispatchEventTask::new(processors.clone(), scheduler.clone()));
    tasks.register(ProcessEventTask::new(processors));
    tasks.register(DeliverWebhookTask::new(
        delivery_store.clone(),
        transport.clone(),
        clock.clone(),
    ));

    let engine =
        TaskEngine::new(queue.clone(), Arc::new(tasks), WorkerConfig::default(), clock.clone());

    Harness { queue, clock, engine, bus, workspace, delivery_store, transport }
}

impl Harness {
    async fn drain(&self) {
        for _ in 0..30 {
            while self.engine.process_batch().await.unwrap() > 0 {}
            if self.queue.pending_count().await.unwrap() == 0 {
                return;
            }
            self.clock.advance(Duration::from_secs(360));
        }
    }
}

fn document_with_text(team_id: TeamId, text: &str) -> Document {
    let now = Utc::now();
    Document {
        id: DocumentId::new(),
        team_id,
        collection_id: CollectionId::new(),
        title: "Notes".to_string(),
        text: text.to_string(),
        source_id: None,
        import_id: None,
        created_by: UserId::new(),
        published_at: Some(now),
        deleted_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn publish_creates_one_backlink_per_referenced_document() {
    let h = harness();
    let team_id = TeamId::new();
    let actor = UserId::new();

    let target_a = document_with_text(team_id, "target a");
    let target_b = document_with_text(team_id, "target b");
    let source = document_with_text(
        team_id,
        &format!("See [a](/doc/{}) and [b](/doc/{}).", target_a.id, target_b.id),
    );
    let source_id = source.id;
    h.workspace.insert_document(target_a.clone()).await;
    h.workspace.insert_document(target_b.clone()).await;
    h.workspace.insert_document(source).await;

    h.bus
        .publish(Event::for_document(
            EventName::DocumentsPublish,
            team_id,
            actor,
            source_id,
            h.clock.now_utc(),
        ))
        .await
        .unwrap();
    h.drain().await;

    let relationships = h.workspace.relationships().await;
    assert_eq!(relationships.len(), 2);
    assert!(relationships.iter().all(|r| r.document_id == source_id));
    let targets: Vec<DocumentId> = relationships.iter().map(|r| r.target_document_id).collect();
    assert!(targets.contains(&target_a.id));
    assert!(targets.contains(&target_b.id));
}

#[tokio::test]
async fn publish_without_references_creates_zero_backlinks() {
    let h = harness();
    let team_id = TeamId::new();
    let document = document_with_text(team_id, "no links here");
    let document_id = document.id;
    h.workspace.insert_document(document).await;

    h.bus
        .publish(Event::for_document(
            EventName::DocumentsPublish,
            team_id,
            UserId::new(),
            document_id,
            h.clock.now_utc(),
        ))
        .await
        .unwrap();
    h.drain().await;

    assert!(h.workspace.relationships().await.is_empty());
}

#[tokio::test]
async fn duplicate_publish_delivery_is_idempotent_across_processors() {
    let h = harness();
    let team_id = TeamId::new();
    let actor = UserId::new();

    let target = document_with_text(team_id, "target");
    let source =
        document_with_text(team_id, &format!("link to [t](/doc/{})", target.id));
    let source_id = source.id;
    h.workspace.insert_document(target).await;
    h.workspace.insert_document(source).await;

    for member in 0..2 {
        h.workspace
            .insert_user(User {
                id: UserId::new(),
                team_id,
                name: format!("member-{member}"),
                email: format!("member-{member}@example.com"),
                suspended_at: None,
                created_at: Utc::now(),
            })
            .await;
    }

    let event = Event::for_document(
        EventName::DocumentsPublish,
        team_id,
        actor,
        source_id,
        h.clock.now_utc(),
    );
    h.bus.publish(event.clone()).await.unwrap();
    h.bus.publish(event).await.unwrap();
    h.drain().await;

    // Backlinks reconciled, not duplicated; one notification per member.
    assert_eq!(h.workspace.relationships().await.len(), 1);
    assert_eq!(h.workspace.notifications().await.len(), 2);
    // Revisions deduplicate on identical content.
    assert_eq!(h.workspace.revisions().await.len(), 1);
}

#[tokio::test]
async fn publish_reaches_matching_webhook_subscriptions_only() {
    let h = harness();
    let team_id = TeamId::new();
    let actor = UserId::new();
    let document = document_with_text(team_id, "content");
    let document_id = document.id;
    h.workspace.insert_document(document).await;

    let matching = WebhookSubscription {
        id: SubscriptionId::new(),
        team_id,
        created_by: actor,
        url: "https://hooks.example.com/match".to_string(),
        secret: None,
        events: vec!["documents.publish".to_string()],
        enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        deleted_at: None,
    };
    let other = WebhookSubscription {
        id: SubscriptionId::new(),
        url: "https://hooks.example.com/other".to_string(),
        events: vec!["users.suspend".to_string()],
        ..matching.clone()
    };
    h.delivery_store.insert_subscription(matching.clone()).await;
    h.delivery_store.insert_subscription(other).await;

    h.bus
        .publish(Event::for_document(
            EventName::DocumentsPublish,
            team_id,
            actor,
            document_id,
            h.clock.now_utc(),
        ))
        .await
        .unwrap();
    h.drain().await;

    let requests = h.transport.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://hooks.example.com/match");
    assert_eq!(requests[0].body["event"]["name"], "documents.publish");

    let deliveries = h.delivery_store.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].subscription_id, matching.id);
}

#[tokio::test]
async fn suspend_event_recalculates_team_seats() {
    let h = harness();
    let team_id = TeamId::new();

    h.workspace
        .insert_user(User {
            id: UserId::new(),
            team_id,
            name: "active".to_string(),
            email: "active@example.com".to_string(),
            suspended_at: None,
            created_at: Utc::now(),
        })
        .await;
    h.workspace
        .insert_user(User {
            id: UserId::new(),
            team_id,
            name: "suspended".to_string(),
            email: "suspended@example.com".to_string(),
            suspended_at: Some(Utc::now()),
            created_at: Utc::now(),
        })
        .await;

    // The event pipeline runs the recalculation without errors, twice
    // (duplicate delivery converges on the same count).
    let event = Event::new(EventName::UsersSuspend, team_id, UserId::new(), h.clock.now_utc());
    h.bus.publish(event.clone()).await.unwrap();
    h.bus.publish(event).await.unwrap();
    h.drain().await;

    assert_eq!(h.queue.pending_count().await.unwrap(), 0);
}
