//! The event bus: events ride the task queue to reach processors.
//!
//! `publish` enqueues a dispatch job; the dispatch job fans out one
//! process job per matching processor. The two hops buy two properties:
//! events survive process restarts the same way any job does
//! (at-least-once), and a failing processor retries alone without
//! re-running its siblings. `publish_in` is the delayed-requeue primitive
//! the update debounce is built on.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use quill_core::Event;
use quill_queue::{
    QueueError, Task, TaskError, TaskOptions, TaskPriority, TaskScheduler,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatcher::ProcessorRegistry;

/// Publishes events into the worker subsystem.
#[derive(Clone)]
pub struct EventBus {
    scheduler: TaskScheduler,
}

impl EventBus {
    /// Creates a bus over the given scheduler.
    pub fn new(scheduler: TaskScheduler) -> Self {
        Self { scheduler }
    }

    /// Publishes an event for immediate dispatch.
    ///
    /// # Errors
    ///
    /// Returns error if the dispatch job cannot be enqueued.
    pub async fn publish(&self, event: Event) -> Result<(), QueueError> {
        self.publish_in(event, Duration::ZERO).await
    }

    /// The clock the underlying scheduler stamps jobs with.
    pub fn clock(&self) -> std::sync::Arc<dyn quill_core::Clock> {
        self.scheduler.clock()
    }

    /// Publishes an event that becomes visible after `delay`.
    ///
    /// # Errors
    ///
    /// Returns error if the dispatch job cannot be enqueued.
    pub async fn publish_in(&self, event: Event, delay: Duration) -> Result<(), QueueError> {
        debug!(event = %event.name, delay_secs = delay.as_secs(), "publishing event");
        self.scheduler
            .schedule_in::<DispatchEventTask>(DispatchEventProps { event }, delay)
            .await
            .map(|_| ())
    }
}

/// Props for [`DispatchEventTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEventProps {
    /// The event being dispatched.
    pub event: Event,
}

/// Fans an event out to one job per matching processor.
pub struct DispatchEventTask {
    registry: Arc<ProcessorRegistry>,
    scheduler: TaskScheduler,
}

impl DispatchEventTask {
    /// Creates the dispatch task with its wiring.
    pub fn new(registry: Arc<ProcessorRegistry>, scheduler: TaskScheduler) -> Self {
        Self { registry, scheduler }
    }
}

#[async_trait]
impl Task for DispatchEventTask {
    const NAME: &'static str = "events.dispatch";
    type Props = DispatchEventProps;

    fn options() -> TaskOptions {
        TaskOptions { priority: TaskPriority::High, ..TaskOptions::default() }
    }

    async fn perform(&self, props: Self::Props) -> Result<(), TaskError> {
        let names = self.registry.matching(props.event.name);
        debug!(event = %props.event.name, processors = names.len(), "dispatching event");

        // Re-enqueueing an already-dispatched processor is harmless: every
        // processor tolerates duplicate delivery by contract.
        for name in names {
            self.scheduler
                .schedule::<ProcessEventTask>(ProcessEventProps {
                    processor: name.to_string(),
                    event: props.event.clone(),
                })
                .await
                .map_err(|e| TaskError::transient(format!("failed to fan out {name}: {e}")))?;
        }

        Ok(())
    }
}

/// Props for [`ProcessEventTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEventProps {
    /// Name of the processor to invoke.
    pub processor: String,

    /// The event to hand it.
    pub event: Event,
}

/// Runs a single processor against a single event.
pub struct ProcessEventTask {
    registry: Arc<ProcessorRegistry>,
}

impl ProcessEventTask {
    /// Creates the process task with its registry.
    pub fn new(registry: Arc<ProcessorRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Task for ProcessEventTask {
    const NAME: &'static str = "events.process";
    type Props = ProcessEventProps;

    async fn perform(&self, props: Self::Props) -> Result<(), TaskError> {
        let processor = self.registry.get(&props.processor).ok_or_else(|| {
            TaskError::terminal(format!("processor not registered: {}", props.processor))
        })?;

        processor.perform(&props.event).await
    }
}
