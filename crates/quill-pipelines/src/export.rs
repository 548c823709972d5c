//! The export pipeline: `Creating -> Uploading -> Complete | Error`.
//!
//! Exports assemble a JSON archive of the team's collections and documents
//! and hand it to the file store. The state machine is coarser than the
//! import's because assembly is a single unit of work; `Uploading` exists
//! so a crash between assembly and upload resumes with a re-upload (the
//! write is idempotent) instead of re-entering from scratch.

use std::sync::Arc;

use async_trait::async_trait;
use quill_core::{
    models::{FileOperation, NotificationKind},
    Clock, Event, EventName, FileOperationId, FileOperationState,
};
use quill_processors::{ApplicableEvents, Processor};
use quill_queue::{RetryPolicy, Task, TaskError, TaskOptions, TaskPriority, TaskScheduler};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::store::{FileStore, PipelineStore};

/// Kicks off an export when the domain layer records a file operation.
pub struct ExportsProcessor {
    scheduler: TaskScheduler,
}

impl ExportsProcessor {
    /// Creates the processor.
    pub fn new(scheduler: TaskScheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Processor for ExportsProcessor {
    fn name(&self) -> &'static str {
        "exports"
    }

    fn applicable_events(&self) -> ApplicableEvents {
        ApplicableEvents::Only(&[EventName::FileOperationsCreate])
    }

    async fn perform(&self, event: &Event) -> Result<(), TaskError> {
        let Some(model_id) = event.model_id else {
            return Ok(());
        };
        self.scheduler
            .schedule::<ExportTask>(ExportProps {
                file_operation_id: FileOperationId::from(model_id),
            })
            .await
            .map_err(|e| TaskError::transient(format!("failed to schedule export: {e}")))?;
        Ok(())
    }
}

/// Props for [`ExportTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportProps {
    /// The file operation tracking this export.
    pub file_operation_id: FileOperationId,
}

/// Assembles and uploads one team export archive.
pub struct ExportTask {
    store: Arc<dyn PipelineStore>,
    files: Arc<dyn FileStore>,
    clock: Arc<dyn Clock>,
}

impl ExportTask {
    /// Creates the task with its wiring.
    pub fn new(
        store: Arc<dyn PipelineStore>,
        files: Arc<dyn FileStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, files, clock }
    }

    async fn run(&self, operation: &FileOperation) -> Result<(), TaskError> {
        if operation.state == FileOperationState::Creating {
            self.store
                .transition_file_operation(
                    operation.id,
                    FileOperationState::Creating,
                    FileOperationState::Uploading,
                )
                .await?;
        }

        let (collections, documents) = self.store.export_content(operation.team_id).await?;
        let archive = json!({
            "exportedAt": self.clock.now_utc(),
            "teamId": operation.team_id,
            "collections": collections,
            "documents": documents,
        });
        let bytes = serde_json::to_vec_pretty(&archive)
            .map_err(|e| TaskError::terminal(format!("failed to serialize archive: {e}")))?;

        let size = self.files.write(&operation.key, bytes).await?;
        self.store
            .complete_file_operation(operation.id, i64::try_from(size).unwrap_or(i64::MAX))
            .await?;

        info!(
            file_operation_id = %operation.id,
            team_id = %operation.team_id,
            collections = collections.len(),
            documents = documents.len(),
            size_bytes = size,
            "export uploaded"
        );

        // Content is durable; a lost notification must not fail the export.
        if let Err(e) = self
            .store
            .notify_user(operation.user_id, NotificationKind::ExportCompleted, self.clock.now_utc())
            .await
        {
            warn!(file_operation_id = %operation.id, error = %e,
                "failed to notify user of completed export");
        }

        Ok(())
    }
}

#[async_trait]
impl Task for ExportTask {
    const NAME: &'static str = "exports.process";
    type Props = ExportProps;

    fn options() -> TaskOptions {
        TaskOptions { priority: TaskPriority::Low, retry: RetryPolicy::no_retry() }
    }

    async fn perform(&self, props: Self::Props) -> Result<(), TaskError> {
        let Some(operation) = self.store.find_file_operation(props.file_operation_id).await?
        else {
            warn!(file_operation_id = %props.file_operation_id, "file operation missing");
            return Ok(());
        };

        // Settled operations are a no-op under redelivery.
        match operation.state {
            FileOperationState::Complete | FileOperationState::Error => return Ok(()),
            FileOperationState::Creating | FileOperationState::Uploading => {},
        }

        let result = self.run(&operation).await;

        if let Err(error) = &result {
            if let Err(e) =
                self.store.set_file_operation_errored(operation.id, error.to_string()).await
            {
                warn!(file_operation_id = %operation.id, error = %e,
                    "failed to record export error state");
            }
        }

        result
    }

    async fn on_failed(&self, props: Self::Props) {
        if let Ok(Some(operation)) = self.store.find_file_operation(props.file_operation_id).await
        {
            if let Err(e) = self
                .store
                .notify_user(operation.user_id, NotificationKind::ExportFailed, self.clock.now_utc())
                .await
            {
                warn!(file_operation_id = %props.file_operation_id, error = %e,
                    "failed to notify user of export failure");
            }
        }
    }
}
