//! Maintains document-to-document backlink rows.
//!
//! When a document's content settles (publish or debounced update), its
//! internal links are extracted and the relationship rows reconciled to
//! match. Reconciling (insert missing, delete stale) rather than blindly
//! inserting keeps the operation idempotent under duplicate delivery.

use std::sync::Arc;

use async_trait::async_trait;
use quill_core::{DocumentId, Event, EventName};
use quill_queue::TaskError;
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dispatcher::{ApplicableEvents, Processor},
    store::WorkspaceStore,
};

/// Extracts the document ids referenced by internal links in markdown text.
///
/// Internal links have the form `/doc/<uuid>` (optionally behind a host).
/// Order is preserved and duplicates removed.
pub fn parse_document_links(text: &str) -> Vec<DocumentId> {
    // Compiled per call; link extraction runs on settled updates only, not
    // on every save.
    let pattern = Regex::new(
        r"/doc/([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})",
    )
    .expect("static pattern compiles");

    let mut seen = Vec::new();
    for capture in pattern.captures_iter(text) {
        if let Ok(id) = Uuid::parse_str(&capture[1]) {
            let id = DocumentId::from(id);
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
    }
    seen
}

/// Keeps backlink rows consistent with settled document content.
pub struct BacklinksProcessor {
    store: Arc<dyn WorkspaceStore>,
}

impl BacklinksProcessor {
    /// Creates the processor.
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self { store }
    }

    async fn reconcile(&self, event: &Event) -> Result<(), TaskError> {
        let Some(document_id) = event.document_id else {
            return Ok(());
        };
        let Some(document) = self.store.find_document(document_id).await? else {
            return Ok(());
        };
        if document.deleted_at.is_some() {
            return Ok(());
        }

        let mut targets = Vec::new();
        for target in parse_document_links(&document.text) {
            if target == document_id {
                continue;
            }
            // Links to documents that no longer exist produce no rows.
            if self.store.find_document(target).await?.is_some() {
                targets.push(target);
            }
        }

        debug!(document_id = %document_id, backlinks = targets.len(), "reconciling backlinks");
        let now = event.created_at;
        self.store.replace_backlinks(document_id, targets, now).await?;

        Ok(())
    }

    async fn remove(&self, event: &Event) -> Result<(), TaskError> {
        let Some(document_id) = event.document_id else {
            return Ok(());
        };
        let removed = self.store.delete_backlinks(document_id).await?;
        debug!(document_id = %document_id, removed, "removed backlinks for deleted document");
        Ok(())
    }
}

#[async_trait]
impl Processor for BacklinksProcessor {
    fn name(&self) -> &'static str {
        "backlinks"
    }

    fn applicable_events(&self) -> ApplicableEvents {
        ApplicableEvents::Only(&[
            EventName::DocumentsPublish,
            EventName::DocumentsUpdateDebounced,
            EventName::DocumentsDelete,
        ])
    }

    async fn perform(&self, event: &Event) -> Result<(), TaskError> {
        match event.name {
            EventName::DocumentsDelete => self.remove(event).await,
            _ => self.reconcile(event).await,
        }
    }
}
