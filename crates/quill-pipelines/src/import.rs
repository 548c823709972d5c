//! The import pipeline: a page-chained, checkpointed state machine.
//!
//! `Created -> InProgress -> Completed -> Processed`, with `Errored` as the
//! terminal failure state. Each task invocation performs one unit of work
//! (persisting a single collection batch) and explicitly schedules the next
//! page; there is no automatic continuation. Resumability comes from state
//! checks at the top of `perform` and find-or-create persistence keyed by
//! external id: re-running any step creates no duplicates.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use quill_core::{models::NotificationKind, Clock, Event, EventName, ImportId, ImportState};
use quill_processors::{ApplicableEvents, Processor};
use quill_queue::{
    RetryPolicy, Task, TaskError, TaskOptions, TaskPriority, TaskScheduler,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    manifest::{parse_manifest, rewrite_source_links, CollectionInput, ImportManifest},
    store::{FileStore, PipelineStore},
};

/// Kicks off the pipeline when the domain layer records a new import.
pub struct ImportsProcessor {
    scheduler: TaskScheduler,
}

impl ImportsProcessor {
    /// Creates the processor.
    pub fn new(scheduler: TaskScheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Processor for ImportsProcessor {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn applicable_events(&self) -> ApplicableEvents {
        ApplicableEvents::Only(&[EventName::ImportsCreate])
    }

    async fn perform(&self, event: &Event) -> Result<(), TaskError> {
        let Some(model_id) = event.model_id else {
            return Ok(());
        };
        self.scheduler
            .schedule::<ImportTask>(ImportProps { import_id: ImportId::from(model_id), page: 0 })
            .await
            .map_err(|e| TaskError::transient(format!("failed to schedule import: {e}")))?;
        Ok(())
    }
}

/// Props for [`ImportTask`]: which import, and which page of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportProps {
    /// The import being processed.
    pub import_id: ImportId,

    /// Zero-based collection batch to persist; `page == collections.len()`
    /// is the finalize step.
    pub page: usize,
}

/// Performs one page of import work, then chains the next.
pub struct ImportTask {
    store: Arc<dyn PipelineStore>,
    files: Arc<dyn FileStore>,
    scheduler: TaskScheduler,
    clock: Arc<dyn Clock>,
}

impl ImportTask {
    /// Creates the task with its wiring.
    pub fn new(
        store: Arc<dyn PipelineStore>,
        files: Arc<dyn FileStore>,
        scheduler: TaskScheduler,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, files, scheduler, clock }
    }

    /// Loads and parses the staged upload, rewriting source links to
    /// placeholders as it goes (the parse phase of two-phase resolution).
    async fn load_manifest(&self, input_key: &str) -> Result<ImportManifest, TaskError> {
        let bytes = self.files.read(input_key).await?;
        let mut manifest = parse_manifest(&bytes)?;

        for collection in &mut manifest.collections {
            for document in &mut collection.documents {
                document.text = rewrite_source_links(&document.text);
            }
        }

        Ok(manifest)
    }

    async fn persist_page(
        &self,
        import: quill_core::models::Import,
        batch: CollectionInput,
        page: usize,
    ) -> Result<(), TaskError> {
        let import_id = import.id;
        let count = self.store.persist_collection(import, batch, self.clock.now_utc()).await?;
        debug!(import_id = %import_id, page, documents = count, "import batch persisted");

        // Chaining is explicit: the next page is a fresh job, so a crash
        // here resumes from the durable page boundary.
        self.scheduler
            .schedule::<ImportTask>(ImportProps { import_id, page: page + 1 })
            .await
            .map_err(|e| TaskError::transient(format!("failed to chain import page: {e}")))?;
        Ok(())
    }

    async fn finalize(
        &self,
        import_id: ImportId,
        manifest: &ImportManifest,
    ) -> Result<(), TaskError> {
        // Every target now exists; resolve placeholders to internal URLs.
        let documents = self.store.imported_documents(import_id).await?;
        let mut resolved = HashMap::new();
        for document in &documents {
            if let Some(source_id) = &document.source_id {
                resolved.insert(source_id.clone(), format!("/doc/{}", document.id));
            }
        }

        self.store.finalize_import(import_id, resolved).await?;
        info!(
            import_id = %import_id,
            collections = manifest.collections.len(),
            documents = documents.len(),
            "import content persisted"
        );

        self.scheduler
            .schedule::<ImportCleanupTask>(ImportCleanupProps { import_id })
            .await
            .map_err(|e| TaskError::transient(format!("failed to schedule cleanup: {e}")))?;
        Ok(())
    }

    /// Failure path: abort bookkeeping the transaction rollback cannot do.
    /// Deletes attachment blobs already written to file storage and records
    /// the parent's terminal state with a truncated message.
    async fn record_failure(&self, import_id: ImportId, error: &TaskError) {
        match self.store.import_attachments(import_id).await {
            Ok(attachments) => {
                for attachment in attachments {
                    if let Err(e) = self.files.delete(&attachment.key).await {
                        warn!(import_id = %import_id, key = %attachment.key, error = %e,
                            "failed to delete attachment blob");
                    }
                }
            },
            Err(e) => {
                warn!(import_id = %import_id, error = %e, "failed to list attachments for cleanup");
            },
        }
        if let Err(e) = self.store.delete_import_attachments(import_id).await {
            warn!(import_id = %import_id, error = %e, "failed to delete attachment rows");
        }
        if let Err(e) = self.store.set_import_errored(import_id, error.to_string()).await {
            warn!(import_id = %import_id, error = %e, "failed to record import error state");
        }
    }
}

#[async_trait]
impl Task for ImportTask {
    const NAME: &'static str = "imports.process";
    type Props = ImportProps;

    fn options() -> TaskOptions {
        // Parse and validation failures are terminal by nature; the
        // pipeline resumes from its durable state, not from queue retries.
        TaskOptions { priority: TaskPriority::High, retry: RetryPolicy::no_retry() }
    }

    async fn perform(&self, props: Self::Props) -> Result<(), TaskError> {
        let Some(import) = self.store.find_import(props.import_id).await? else {
            warn!(import_id = %props.import_id, "import row missing, dropping job");
            return Ok(());
        };

        // State check before any work: a redelivered or replayed job on a
        // settled import is a no-op.
        if import.state.is_settled() {
            debug!(import_id = %import.id, state = %import.state, "import already settled");
            return Ok(());
        }

        if import.state == ImportState::Created {
            self.store
                .transition_import(import.id, ImportState::Created, ImportState::InProgress)
                .await?;
        }

        let result = async {
            let manifest = self.load_manifest(&import.input_key).await?;

            if props.page < manifest.collections.len() {
                let batch = manifest.collections[props.page].clone();
                self.persist_page(import.clone(), batch, props.page).await
            } else {
                self.finalize(import.id, &manifest).await
            }
        }
        .await;

        if let Err(error) = &result {
            self.record_failure(import.id, error).await;
        }

        result
    }

    async fn on_failed(&self, props: Self::Props) {
        // State and cleanup were already recorded on the failure path;
        // what remains is telling the user their import died.
        if let Ok(Some(import)) = self.store.find_import(props.import_id).await {
            if let Err(e) = self
                .store
                .notify_user(import.created_by, NotificationKind::ImportFailed, self.clock.now_utc())
                .await
            {
                warn!(import_id = %props.import_id, error = %e,
                    "failed to notify user of import failure");
            }
        }
    }
}

/// Props for [`ImportCleanupTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportCleanupProps {
    /// The completed import to clean up after.
    pub import_id: ImportId,
}

/// Post-completion step: deletes the staged upload, notifies the user, and
/// marks the import `Processed`.
///
/// Everything here is best-effort except the final state advance: the
/// content is already durable, so cleanup trouble must not fail the import.
pub struct ImportCleanupTask {
    store: Arc<dyn PipelineStore>,
    files: Arc<dyn FileStore>,
    clock: Arc<dyn Clock>,
}

impl ImportCleanupTask {
    /// Creates the task with its wiring.
    pub fn new(
        store: Arc<dyn PipelineStore>,
        files: Arc<dyn FileStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, files, clock }
    }
}

#[async_trait]
impl Task for ImportCleanupTask {
    const NAME: &'static str = "imports.cleanup";
    type Props = ImportCleanupProps;

    fn options() -> TaskOptions {
        TaskOptions {
            priority: TaskPriority::Low,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_secs(30),
                ..RetryPolicy::default()
            },
        }
    }

    async fn perform(&self, props: Self::Props) -> Result<(), TaskError> {
        let Some(import) = self.store.find_import(props.import_id).await? else {
            return Ok(());
        };

        match import.state {
            ImportState::Processed => return Ok(()),
            ImportState::Completed => {},
            state => {
                warn!(import_id = %import.id, state = %state,
                    "cleanup scheduled for unsettled import, dropping");
                return Ok(());
            },
        }

        if let Err(e) = self.files.delete(&import.input_key).await {
            warn!(import_id = %import.id, error = %e, "failed to delete staged upload");
        }

        if let Err(e) = self
            .store
            .notify_user(import.created_by, NotificationKind::ImportCompleted, self.clock.now_utc())
            .await
        {
            warn!(import_id = %import.id, error = %e, "failed to notify user of completed import");
        }

        self.store
            .transition_import(import.id, ImportState::Completed, ImportState::Processed)
            .await?;

        info!(import_id = %import.id, documents = import.document_count, "import processed");
        Ok(())
    }
}
