//! Integration tests for the import pipeline: page chaining, two-phase
//! link resolution, idempotent resume, and the failure path.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use quill_core::{
    models::{Attachment, AttachmentId, Import, NotificationKind},
    ImportId, ImportState, TeamId, TestClock, UserId,
};
use quill_pipelines::{
    store::mock::{InMemoryFileStore, InMemoryPipelineStore},
    ImportCleanupTask, ImportProps, ImportTask,
};
use quill_queue::{
    queue::mock::InMemoryQueue, JobState, Queue, Task, TaskEngine, TaskRegistry, TaskScheduler,
    WorkerConfig,
};

const INPUT_KEY: &str = "imports/staged-upload.json";

fn manifest_json() -> Vec<u8> {
    // doc-b links forward to doc-c, which is persisted a page later.
    br#"{
        "collections": [
            {
                "externalId": "col-a",
                "name": "Handbook",
                "documents": [
                    {"externalId": "doc-a", "title": "Welcome", "text": "plain text"},
                    {"externalId": "doc-b", "title": "Guide", "text": "see quill://doc-c"}
                ]
            },
            {
                "externalId": "col-b",
                "name": "Runbooks",
                "documents": [
                    {"externalId": "doc-c", "title": "Oncall", "text": "back to quill://doc-a"}
                ]
            }
        ]
    }"#
    .to_vec()
}

struct Harness {
    queue: Arc<InMemoryQueue>,
    clock: Arc<TestClock>,
    engine: TaskEngine,
    scheduler: TaskScheduler,
    store: Arc<InMemoryPipelineStore>,
    files: Arc<InMemoryFileStore>,
}

fn harness() -> Harness {
    let queue = Arc::new(InMemoryQueue::new());
    let clock = Arc::new(TestClock::new());
    let scheduler = TaskScheduler::new(queue.clone(), clock.clone());
    let store = Arc::new(InMemoryPipelineStore::new());
    let files = Arc::new(InMemoryFileStore::new());

    let mut tasks = TaskRegistry::new();
    tasks.register(ImportTask::new(
        store.clone(),
        files.clone(),
        scheduler.clone(),
        clock.clone(),
    ));
    tasks.register(ImportCleanupTask::new(store.clone(), files.clone(), clock.clone()));

    let engine =
        TaskEngine::new(queue.clone(), Arc::new(tasks), WorkerConfig::default(), clock.clone());

    Harness { queue, clock, engine, scheduler, store, files }
}

impl Harness {
    async fn drain(&self) {
        for _ in 0..20 {
            while self.engine.process_batch().await.unwrap() > 0 {}
            if self.queue.pending_count().await.unwrap() == 0 {
                return;
            }
            self.clock.advance(Duration::from_secs(60));
        }
    }

    async fn seed_import(&self) -> Import {
        let import = Import {
            id: ImportId::new(),
            team_id: TeamId::new(),
            created_by: UserId::new(),
            state: ImportState::Created,
            input_key: INPUT_KEY.to_string(),
            error: None,
            document_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.store.insert_import(import.clone()).await;
        self.files.insert(INPUT_KEY, manifest_json()).await;
        import
    }
}

#[tokio::test]
async fn import_runs_to_processed_with_links_resolved() {
    let h = harness();
    let import = h.seed_import().await;

    h.scheduler
        .schedule::<ImportTask>(ImportProps { import_id: import.id, page: 0 })
        .await
        .unwrap();
    h.drain().await;

    assert_eq!(h.store.import_state(import.id).await, Some(ImportState::Processed));

    let documents = h.store.documents().await;
    let collections = h.store.collections().await;
    assert_eq!(collections.len(), 2);
    assert_eq!(documents.len(), 3);

    // Two-phase resolution: the forward reference doc-b -> doc-c resolved
    // to the internal URL of the document persisted a page later.
    let doc_b = documents.iter().find(|d| d.source_id.as_deref() == Some("doc-b")).unwrap();
    let doc_c = documents.iter().find(|d| d.source_id.as_deref() == Some("doc-c")).unwrap();
    let doc_a = documents.iter().find(|d| d.source_id.as_deref() == Some("doc-a")).unwrap();
    assert_eq!(doc_b.text, format!("see /doc/{}", doc_c.id));
    assert_eq!(doc_c.text, format!("back to /doc/{}", doc_a.id));

    // Cleanup removed the staged upload and told the user.
    assert!(!h.files.contains(INPUT_KEY).await);
    let notifications = h.store.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::ImportCompleted);
    assert_eq!(notifications[0].user_id, import.created_by);
}

#[tokio::test]
async fn completed_import_is_not_reprocessed() {
    let h = harness();
    let import = h.seed_import().await;

    h.scheduler
        .schedule::<ImportTask>(ImportProps { import_id: import.id, page: 0 })
        .await
        .unwrap();
    h.drain().await;
    assert_eq!(h.store.import_state(import.id).await, Some(ImportState::Processed));

    let documents_before = h.store.documents().await.len();

    // Restore the staged file (cleanup deleted it) and replay every page,
    // as an at-least-once queue might after a visibility timeout.
    h.files.insert(INPUT_KEY, manifest_json()).await;
    for page in 0..3 {
        h.scheduler
            .schedule::<ImportTask>(ImportProps { import_id: import.id, page })
            .await
            .unwrap();
    }
    h.drain().await;

    // Exactly one row per external id, and the state never regressed.
    assert_eq!(h.store.documents().await.len(), documents_before);
    assert_eq!(h.store.import_state(import.id).await, Some(ImportState::Processed));
}

#[tokio::test]
async fn replayed_page_creates_no_duplicates_mid_flight() {
    let h = harness();
    let import = h.seed_import().await;

    // Deliver page 0 twice before the chain continues.
    h.scheduler
        .schedule::<ImportTask>(ImportProps { import_id: import.id, page: 0 })
        .await
        .unwrap();
    h.scheduler
        .schedule::<ImportTask>(ImportProps { import_id: import.id, page: 0 })
        .await
        .unwrap();
    h.drain().await;

    let documents = h.store.documents().await;
    assert_eq!(documents.len(), 3, "find-or-create must absorb the duplicate page");
    assert_eq!(h.store.collections().await.len(), 2);
    assert_eq!(h.store.import_state(import.id).await, Some(ImportState::Processed));
}

#[tokio::test]
async fn malformed_manifest_moves_import_to_errored() {
    let h = harness();
    let import = h.seed_import().await;
    h.files.insert(INPUT_KEY, b"{ not valid json".to_vec()).await;

    let handle = h
        .scheduler
        .schedule::<ImportTask>(ImportProps { import_id: import.id, page: 0 })
        .await
        .unwrap();
    h.drain().await;

    assert_eq!(h.store.import_state(import.id).await, Some(ImportState::Errored));

    // Single attempt, then the failure notification.
    let job = h.queue.find_job(handle.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt, 1);

    let notifications = h.store.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::ImportFailed);
}

#[tokio::test]
async fn mid_batch_failure_aborts_and_cleans_up() {
    let h = harness();
    let import = h.seed_import().await;

    // Attachment blob created by the (simulated) earlier part of the run.
    let attachment_key = "attachments/logo.png";
    h.files.insert(attachment_key, vec![1, 2, 3]).await;
    h.store
        .insert_attachment(Attachment {
            id: AttachmentId::new(),
            team_id: import.team_id,
            document_id: None,
            import_id: Some(import.id),
            key: attachment_key.to_string(),
            content_type: "image/png".to_string(),
            size: 3,
            created_at: Utc::now(),
        })
        .await;

    // First collection persists, second one blows up.
    h.store.fail_persist_for("col-b").await;

    h.scheduler
        .schedule::<ImportTask>(ImportProps { import_id: import.id, page: 0 })
        .await
        .unwrap();
    h.drain().await;

    assert_eq!(h.store.import_state(import.id).await, Some(ImportState::Errored));

    // The first batch survived (durable checkpoint); the failed batch left
    // nothing behind.
    let documents = h.store.documents().await;
    assert_eq!(documents.len(), 2);
    assert!(documents.iter().all(|d| {
        matches!(d.source_id.as_deref(), Some("doc-a") | Some("doc-b"))
    }));

    // Attachment blobs and rows were cleaned up.
    assert!(!h.files.contains(attachment_key).await);
    assert!(h.store.attachments().await.is_empty());
}

#[tokio::test]
async fn errored_import_retries_from_durable_state_not_scratch() {
    let h = harness();
    let import = h.seed_import().await;
    h.store.fail_persist_for("col-b").await;

    h.scheduler
        .schedule::<ImportTask>(ImportProps { import_id: import.id, page: 0 })
        .await
        .unwrap();
    h.drain().await;
    assert_eq!(h.store.import_state(import.id).await, Some(ImportState::Errored));
    assert_eq!(h.store.documents().await.len(), 2);

    // A settled (errored) import ignores replayed jobs entirely.
    let props = ImportProps { import_id: import.id, page: 1 };
    let task = ImportTask::new(
        h.store.clone(),
        h.files.clone(),
        h.scheduler.clone(),
        h.clock.clone(),
    );
    task.perform(props).await.unwrap();
    assert_eq!(h.store.documents().await.len(), 2);
    assert_eq!(h.store.import_state(import.id).await, Some(ImportState::Errored));
}
