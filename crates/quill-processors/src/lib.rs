//! Event dispatch and the stateless event processors.
//!
//! Events published on the [`EventBus`] ride the task queue: a dispatch job
//! fans each event out to one job per matching [`Processor`], giving every
//! processor independent at-least-once delivery and retry isolation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accounts;
pub mod backlinks;
pub mod bus;
pub mod dispatcher;
pub mod notifications;
pub mod revisions;
pub mod store;

pub use accounts::UserLifecycleProcessor;
pub use backlinks::BacklinksProcessor;
pub use bus::{DispatchEventTask, EventBus, ProcessEventTask};
pub use dispatcher::{ApplicableEvents, Processor, ProcessorRegistry};
pub use notifications::NotificationsProcessor;
pub use revisions::{RevisionsProcessor, DEFAULT_DEBOUNCE_DELAY};
pub use store::{PostgresWorkspaceStore, WorkspaceStore};
