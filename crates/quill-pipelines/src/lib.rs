//! Import/export pipelines and partitioned maintenance tasks.
//!
//! Long-running work is modeled as checkpointed state machines: each task
//! invocation performs one unit, persists it transactionally, and chains
//! the next step explicitly. Resumability comes from state checks and
//! external-id idempotence keys, never from replaying completed work.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod export;
pub mod import;
pub mod maintenance;
pub mod manifest;
pub mod store;

pub use export::{ExportProps, ExportTask, ExportsProcessor};
pub use import::{ImportCleanupProps, ImportCleanupTask, ImportProps, ImportTask, ImportsProcessor};
pub use maintenance::{
    CleanupDeletedDocumentsProps, CleanupDeletedDocumentsTask, DELETED_DOCUMENT_RETENTION_DAYS,
};
pub use manifest::{ImportManifest, parse_manifest, rewrite_source_links, substitute_placeholders};
pub use store::{FileStore, LocalFileStore, PipelineStore, PostgresPipelineStore};
