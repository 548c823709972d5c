//! Processor contract and the startup-built dispatch table.
//!
//! A processor declares which event names it handles (or the wildcard) and
//! the registry turns those declarations into a lookup table once, at
//! process start. Dispatch is then a table read; there is no string
//! matching on event names at runtime.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use quill_core::{Event, EventName};
use quill_queue::TaskError;

/// Which events a processor wants to receive.
#[derive(Debug, Clone, Copy)]
pub enum ApplicableEvents {
    /// Every event (the `"*"` wildcard).
    All,
    /// Only the listed event names.
    Only(&'static [EventName]),
}

/// A stateless handler bound to a set of event names.
///
/// Processors run with at-least-once semantics and no ordering guarantees
/// relative to other processors of the same event, so they must tolerate
/// duplicate delivery: find-or-create writes, reconciling updates, and
/// naturally idempotent deletes.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Stable name, recorded in job props for per-processor dispatch.
    fn name(&self) -> &'static str;

    /// Event names this processor handles.
    fn applicable_events(&self) -> ApplicableEvents;

    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Transient errors requeue this processor's invocation only; other
    /// processors of the same event are unaffected.
    async fn perform(&self, event: &Event) -> Result<(), TaskError>;
}

/// Registry of processors with a per-event-name dispatch table.
#[derive(Default)]
pub struct ProcessorRegistry {
    by_name: HashMap<&'static str, Arc<dyn Processor>>,
    table: HashMap<EventName, Vec<&'static str>>,
    wildcard: Vec<&'static str>,
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a processor and indexes its applicable events.
    ///
    /// # Panics
    ///
    /// Panics on duplicate names; that is a wiring bug caught at startup.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        let name = processor.name();
        match processor.applicable_events() {
            ApplicableEvents::All => self.wildcard.push(name),
            ApplicableEvents::Only(events) => {
                for event in events {
                    self.table.entry(*event).or_default().push(name);
                }
            },
        }
        let replaced = self.by_name.insert(name, processor);
        assert!(replaced.is_none(), "processor {name} registered twice");
    }

    /// Names of processors that should receive the given event.
    pub fn matching(&self, event: EventName) -> Vec<&'static str> {
        let mut names = self.table.get(&event).cloned().unwrap_or_default();
        names.extend(self.wildcard.iter().copied());
        names
    }

    /// Looks up a processor by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.by_name.get(name).cloned()
    }

    /// All registered processor names, for startup logging.
    pub fn processor_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use quill_core::{TeamId, UserId};

    use super::*;

    struct StubProcessor {
        name: &'static str,
        events: ApplicableEvents,
    }

    #[async_trait]
    impl Processor for StubProcessor {
        fn name(&self) -> &'static str {
            self.name
        }

        fn applicable_events(&self) -> ApplicableEvents {
            self.events
        }

        async fn perform(&self, _event: &Event) -> Result<(), TaskError> {
            Ok(())
        }
    }

    fn registry() -> ProcessorRegistry {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(StubProcessor {
            name: "documents_only",
            events: ApplicableEvents::Only(&[
                EventName::DocumentsPublish,
                EventName::DocumentsDelete,
            ]),
        }));
        registry.register(Arc::new(StubProcessor {
            name: "everything",
            events: ApplicableEvents::All,
        }));
        registry
    }

    #[test]
    fn wildcard_processors_match_every_event() {
        let registry = registry();

        for event in EventName::ALL {
            assert!(registry.matching(*event).contains(&"everything"));
        }
    }

    #[test]
    fn listed_processors_match_their_events_only() {
        let registry = registry();

        assert!(registry.matching(EventName::DocumentsPublish).contains(&"documents_only"));
        assert!(!registry.matching(EventName::UsersSuspend).contains(&"documents_only"));
    }

    #[test]
    fn lookup_by_name() {
        let registry = registry();
        assert!(registry.get("everything").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[tokio::test]
    async fn registered_processor_performs() {
        let registry = registry();
        let processor = registry.get("documents_only").unwrap();
        let event = Event::new(
            EventName::DocumentsPublish,
            TeamId::new(),
            UserId::new(),
            Utc::now(),
        );
        processor.perform(&event).await.unwrap();
    }
}
