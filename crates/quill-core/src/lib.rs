//! Core domain types for the Quill worker subsystem.
//!
//! Provides the event vocabulary, strongly-typed models, the UUID keyspace
//! partitioner, the clock abstraction, and the sqlx storage layer. All
//! other worker crates build on these foundations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod partition;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{Event, EventName};
pub use models::{
    CollectionId, DeliveryId, DeliveryStatus, DocumentId, FileOperationId, FileOperationState,
    ImportId, ImportState, SubscriptionId, TeamId, UserId,
};
pub use partition::{KeyRange, Partition};
pub use time::{Clock, RealClock, TestClock};
