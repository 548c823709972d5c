//! Integration tests for the export pipeline and the partitioned
//! maintenance task.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use quill_core::{
    models::{Collection, Document, FileOperation, NotificationKind},
    CollectionId, DocumentId, FileOperationId, FileOperationState, TeamId, TestClock, UserId,
};
use quill_pipelines::{
    store::mock::{InMemoryFileStore, InMemoryPipelineStore},
    CleanupDeletedDocumentsTask, ExportProps, ExportTask,
};
use quill_queue::{
    queue::mock::InMemoryQueue, Queue, Task, TaskEngine, TaskRegistry, TaskScheduler, WorkerConfig,
};

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
    tasks.register(ExportTask::new(store.clone(), files.clone(), clock.clone()));
    tasks.register(CleanupDeletedDocumentsTask::new(store.clone(), clock.clone()));

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
}

fn file_operation(team_id: TeamId) -> FileOperation {
    FileOperation {
        id: FileOperationId::new(),
        team_id,
        user_id: UserId::new(),
        state: FileOperationState::Creating,
        key: format!("exports/{}.json", uuid::Uuid::new_v4()),
        size: 0,
        error: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn document(team_id: TeamId, collection_id: CollectionId, title: &str) -> Document {
    let now = Utc::now();
    Document {
        id: DocumentId::new(),
        team_id,
        collection_id,
        title: title.to_string(),
        text: "content".to_string(),
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
async fn export_uploads_archive_and_completes() {
    let h = harness();
    let team_id = TeamId::new();
    let collection = Collection {
        id: CollectionId::new(),
        team_id,
        name: "Handbook".to_string(),
        source_id: None,
        import_id: None,
        created_by: UserId::new(),
        created_at: Utc::now(),
        deleted_at: None,
    };
    h.store.insert_collection(collection.clone()).await;
    h.store.insert_document(document(team_id, collection.id, "Welcome")).await;
    h.store.insert_document(document(team_id, collection.id, "Guide")).await;

    let operation = file_operation(team_id);
    h.store.insert_file_operation(operation.clone()).await;

    h.scheduler
        .schedule::<ExportTask>(ExportProps { file_operation_id: operation.id })
        .await
        .unwrap();
    h.drain().await;

    let settled = h.store.file_operation(operation.id).await.unwrap();
    assert_eq!(settled.state, FileOperationState::Complete);
    assert!(settled.size > 0);

    let archive = h.files.get(&operation.key).await.expect("archive uploaded");
    let parsed: serde_json::Value = serde_json::from_slice(&archive).unwrap();
    assert_eq!(parsed["collections"].as_array().unwrap().len(), 1);
    assert_eq!(parsed["documents"].as_array().unwrap().len(), 2);

    let notifications = h.store.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::ExportCompleted);
    assert_eq!(notifications[0].user_id, operation.user_id);
}

#[tokio::test]
async fn completed_export_ignores_redelivery() {
    let h = harness();
    let team_id = TeamId::new();
    let operation = file_operation(team_id);
    h.store.insert_file_operation(operation.clone()).await;

    h.scheduler
        .schedule::<ExportTask>(ExportProps { file_operation_id: operation.id })
        .await
        .unwrap();
    h.drain().await;
    let first = h.store.file_operation(operation.id).await.unwrap();
    assert_eq!(first.state, FileOperationState::Complete);

    // Redeliver: settled operations are a no-op.
    h.scheduler
        .schedule::<ExportTask>(ExportProps { file_operation_id: operation.id })
        .await
        .unwrap();
    h.drain().await;

    let second = h.store.file_operation(operation.id).await.unwrap();
    assert_eq!(second.state, FileOperationState::Complete);
    assert_eq!(second.size, first.size);
}

#[tokio::test]
async fn interrupted_upload_resumes_from_uploading_state() {
    let h = harness();
    let team_id = TeamId::new();
    let mut operation = file_operation(team_id);
    // Simulate a crash after the Creating -> Uploading transition.
    operation.state = FileOperationState::Uploading;
    h.store.insert_file_operation(operation.clone()).await;

    let task = ExportTask::new(h.store.clone(), h.files.clone(), h.clock.clone());
    task.perform(ExportProps { file_operation_id: operation.id }).await.unwrap();

    let settled = h.store.file_operation(operation.id).await.unwrap();
    assert_eq!(settled.state, FileOperationState::Complete);
    assert!(h.files.contains(&operation.key).await);
}

#[tokio::test]
async fn export_failure_notifies_user() {
    let h = harness();
    let team_id = TeamId::new();
    let operation = file_operation(team_id);
    h.store.insert_file_operation(operation.clone()).await;

    let task = ExportTask::new(h.store.clone(), h.files.clone(), h.clock.clone());
    task.on_failed(ExportProps { file_operation_id: operation.id }).await;

    let notifications = h.store.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::ExportFailed);
}

#[tokio::test]
async fn partitioned_purge_covers_table_exactly_once() {
    let h = harness();
    let team_id = TeamId::new();
    let collection_id = CollectionId::new();

    // 30 expired soft-deleted documents, plus survivors of both kinds.
    let old = Utc::now() - chrono::Duration::days(60);
    for i in 0..30 {
        let mut doc = document(team_id, collection_id, &format!("expired-{i}"));
        doc.deleted_at = Some(old);
        h.store.insert_document(doc).await;
    }
    let mut fresh_delete = document(team_id, collection_id, "recently-deleted");
    fresh_delete.deleted_at = Some(Utc::now() - chrono::Duration::days(1));
    h.store.insert_document(fresh_delete).await;
    h.store.insert_document(document(team_id, collection_id, "alive")).await;

    CleanupDeletedDocumentsTask::schedule_all(&h.scheduler, 3).await.unwrap();
    assert_eq!(h.queue.pending_count().await.unwrap(), 3);
    h.drain().await;

    // Disjoint partitions purged every expired row; the recent delete and
    // the live document survived.
    let remaining = h.store.documents().await;
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|d| {
        d.title == "alive" || d.title == "recently-deleted"
    }));
}

#[tokio::test]
async fn unpartitioned_purge_scans_everything() {
    let h = harness();
    let team_id = TeamId::new();
    let collection_id = CollectionId::new();

    let mut doc = document(team_id, collection_id, "expired");
    doc.deleted_at = Some(Utc::now() - chrono::Duration::days(45));
    h.store.insert_document(doc).await;

    let task = CleanupDeletedDocumentsTask::new(h.store.clone(), h.clock.clone());
    task.perform(quill_pipelines::CleanupDeletedDocumentsProps::default()).await.unwrap();

    assert!(h.store.documents().await.is_empty());
}

#[tokio::test]
async fn mismatched_partition_props_fail_terminally() {
    let h = harness();
    let task = CleanupDeletedDocumentsTask::new(h.store.clone(), h.clock.clone());

    let err = task
        .perform(quill_pipelines::CleanupDeletedDocumentsProps {
            partition_index: Some(1),
            partition_count: None,
        })
        .await
        .unwrap_err();
    assert!(!err.is_retryable());

    let err = task
        .perform(quill_pipelines::CleanupDeletedDocumentsProps {
            partition_index: Some(5),
            partition_count: Some(3),
        })
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
}
