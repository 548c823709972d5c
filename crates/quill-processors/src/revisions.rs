//! Revision snapshots and the distributed update debounce.
//!
//! Documents are edited in rapid bursts. Snapshotting every save would
//! drown the revision history, so updates are debounced: the raw
//! `documents.update` re-publishes itself as a `.delayed` copy on a fixed
//! delay, and when that copy surfaces we compare the document's
//! `updated_at` against the event's `created_at`. A newer edit means a
//! newer delayed copy is already in flight and this one drops silently.
//! Only the survivor becomes `.debounced` and reaches the snapshot (and
//! backlink) logic. One settled notification per burst, no lock, just a
//! monotonically increasing timestamp comparison.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use quill_core::{Event, EventName};
use quill_queue::TaskError;
use tracing::debug;

use crate::{
    bus::EventBus,
    dispatcher::{ApplicableEvents, Processor},
    store::WorkspaceStore,
};

/// Quiet period after the last edit before a burst is considered settled.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(5 * 60);

/// Debounces document updates and snapshots settled content.
pub struct RevisionsProcessor {
    store: Arc<dyn WorkspaceStore>,
    bus: EventBus,
    debounce_delay: Duration,
}

impl RevisionsProcessor {
    /// Creates the processor with the default debounce delay.
    pub fn new(store: Arc<dyn WorkspaceStore>, bus: EventBus) -> Self {
        Self::with_debounce_delay(store, bus, DEFAULT_DEBOUNCE_DELAY)
    }

    /// Creates the processor with a custom debounce delay.
    pub fn with_debounce_delay(
        store: Arc<dyn WorkspaceStore>,
        bus: EventBus,
        debounce_delay: Duration,
    ) -> Self {
        Self { store, bus, debounce_delay }
    }

    async fn handle_update(&self, event: &Event) -> Result<(), TaskError> {
        self.bus
            .publish_in(event.with_name(EventName::DocumentsUpdateDelayed), self.debounce_delay)
            .await
            .map_err(|e| TaskError::transient(format!("failed to enqueue delayed update: {e}")))
    }

    async fn handle_delayed(&self, event: &Event) -> Result<(), TaskError> {
        let Some(document_id) = event.document_id else {
            return Ok(());
        };
        let Some(document) = self.store.find_document(document_id).await? else {
            // Deleted since the burst started. Nothing to settle.
            return Ok(());
        };

        if document.updated_at > event.created_at {
            // A newer edit re-armed the debounce; its delayed copy will
            // handle settling.
            debug!(document_id = %document_id, "dropping stale delayed update");
            return Ok(());
        }

        self.bus
            .publish(event.with_name(EventName::DocumentsUpdateDebounced))
            .await
            .map_err(|e| TaskError::transient(format!("failed to publish debounced update: {e}")))
    }

    async fn handle_settled(&self, event: &Event) -> Result<(), TaskError> {
        let Some(document_id) = event.document_id else {
            return Ok(());
        };
        let Some(document) = self.store.find_document(document_id).await? else {
            return Ok(());
        };

        // Duplicate delivery lands here with identical content; comparing
        // against the latest snapshot keeps the history clean.
        if let Some(latest) = self.store.latest_revision(document_id).await? {
            if latest.title == document.title && latest.text == document.text {
                return Ok(());
            }
        }

        let now = self.bus.clock().now_utc();
        let revision = self.store.create_revision(document, now).await?;
        debug!(document_id = %document_id, revision_id = %revision.id, "revision created");

        Ok(())
    }
}

#[async_trait]
impl Processor for RevisionsProcessor {
    fn name(&self) -> &'static str {
        "revisions"
    }

    fn applicable_events(&self) -> ApplicableEvents {
        ApplicableEvents::Only(&[
            EventName::DocumentsUpdate,
            EventName::DocumentsUpdateDelayed,
            EventName::DocumentsUpdateDebounced,
            EventName::DocumentsPublish,
        ])
    }

    async fn perform(&self, event: &Event) -> Result<(), TaskError> {
        match event.name {
            EventName::DocumentsUpdate => self.handle_update(event).await,
            EventName::DocumentsUpdateDelayed => self.handle_delayed(event).await,
            EventName::DocumentsUpdateDebounced | EventName::DocumentsPublish => {
                self.handle_settled(event).await
            },
            _ => Ok(()),
        }
    }
}
