//! Keeps the team seat counter in step with user lifecycle events.

use std::sync::Arc;

use async_trait::async_trait;
use quill_core::{Event, EventName};
use quill_queue::TaskError;
use tracing::info;

use crate::{
    dispatcher::{ApplicableEvents, Processor},
    store::WorkspaceStore,
};

/// Recalculates the team's active-seat counter on suspend/activate.
///
/// A blind decrement would double-count under duplicate delivery, so the
/// store recounts from the users table inside a transaction holding a
/// `FOR UPDATE` lock on the team row. Replays converge on the same number.
pub struct UserLifecycleProcessor {
    store: Arc<dyn WorkspaceStore>,
}

impl UserLifecycleProcessor {
    /// Creates the processor.
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Processor for UserLifecycleProcessor {
    fn name(&self) -> &'static str {
        "user_lifecycle"
    }

    fn applicable_events(&self) -> ApplicableEvents {
        ApplicableEvents::Only(&[EventName::UsersSuspend, EventName::UsersActivate])
    }

    async fn perform(&self, event: &Event) -> Result<(), TaskError> {
        let active = self.store.recalculate_active_users(event.team_id).await?;
        info!(team_id = %event.team_id, active_users = active, event = %event.name,
            "team seat counter recalculated");
        Ok(())
    }
}
