//! Notifies team members when a document is published.

use std::sync::Arc;

use async_trait::async_trait;
use quill_core::{models::NotificationKind, Event, EventName};
use quill_queue::TaskError;
use tracing::debug;

use crate::{
    dispatcher::{ApplicableEvents, Processor},
    store::WorkspaceStore,
};

/// Creates in-app notifications for published documents.
pub struct NotificationsProcessor {
    store: Arc<dyn WorkspaceStore>,
}

impl NotificationsProcessor {
    /// Creates the processor.
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Processor for NotificationsProcessor {
    fn name(&self) -> &'static str {
        "notifications"
    }

    fn applicable_events(&self) -> ApplicableEvents {
        ApplicableEvents::Only(&[EventName::DocumentsPublish])
    }

    async fn perform(&self, event: &Event) -> Result<(), TaskError> {
        let Some(document_id) = event.document_id else {
            return Ok(());
        };
        if self.store.find_document(document_id).await?.is_none() {
            return Ok(());
        }

        let members = self.store.active_team_members(event.team_id).await?;
        let mut notified = 0;

        for member in members {
            if member.id == event.actor_id {
                continue;
            }
            // find-or-create keyed on (user, kind, document): redelivered
            // events cannot notify anyone twice.
            self.store
                .notify_once(
                    member.id,
                    Some(event.actor_id),
                    Some(document_id),
                    NotificationKind::DocumentPublished,
                    event.created_at,
                )
                .await?;
            notified += 1;
        }

        debug!(document_id = %document_id, notified, "publish notifications ensured");
        Ok(())
    }
}
