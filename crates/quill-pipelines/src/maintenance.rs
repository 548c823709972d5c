//! Partitioned maintenance: purging soft-deleted documents.
//!
//! The purge scans a large table, so it is split into `count` jobs, each
//! restricted to a disjoint slice of the UUID key space. No locks and no
//! coordination: correctness comes from the partition invariant that every
//! key belongs to exactly one slice.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use quill_core::{Clock, Partition};
use quill_queue::{
    QueueError, RetryPolicy, Task, TaskError, TaskOptions, TaskPriority, TaskScheduler,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::PipelineStore;

/// Days a soft-deleted document is retained before permanent removal.
pub const DELETED_DOCUMENT_RETENTION_DAYS: i64 = 30;

/// Props for [`CleanupDeletedDocumentsTask`].
///
/// Both partition fields absent means an unpartitioned full scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupDeletedDocumentsProps {
    /// Zero-based slice index.
    pub partition_index: Option<u32>,

    /// Total number of slices.
    pub partition_count: Option<u32>,
}

/// Permanently removes soft-deleted documents past the retention window.
pub struct CleanupDeletedDocumentsTask {
    store: Arc<dyn PipelineStore>,
    clock: Arc<dyn Clock>,
}

impl CleanupDeletedDocumentsTask {
    /// Creates the task with its wiring.
    pub fn new(store: Arc<dyn PipelineStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Fans the purge out as one job per partition.
    ///
    /// # Errors
    ///
    /// Returns error for a zero count or if enqueueing fails.
    pub async fn schedule_all(scheduler: &TaskScheduler, count: u32) -> Result<(), QueueError> {
        // Validates count up front; a bad value here is a configuration
        // bug, not something to discover job by job.
        Partition::new(0, count)
            .map_err(|e| QueueError::InvalidConfiguration(e.to_string()))?;

        for index in 0..count {
            scheduler
                .schedule::<CleanupDeletedDocumentsTask>(CleanupDeletedDocumentsProps {
                    partition_index: Some(index),
                    partition_count: Some(count),
                })
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Task for CleanupDeletedDocumentsTask {
    const NAME: &'static str = "documents.cleanup_deleted";
    type Props = CleanupDeletedDocumentsProps;

    fn options() -> TaskOptions {
        TaskOptions { priority: TaskPriority::Background, retry: RetryPolicy::default() }
    }

    async fn perform(&self, props: Self::Props) -> Result<(), TaskError> {
        let partition = match (props.partition_index, props.partition_count) {
            (Some(index), Some(count)) => Some(Partition { index, count }),
            (None, None) => None,
            _ => {
                return Err(TaskError::terminal(
                    "partition_index and partition_count must be given together",
                ))
            },
        };

        // Invalid bounds are a programming error: terminal, never retried.
        let range = Partition::range_for(partition)
            .map_err(|e| TaskError::terminal(e.to_string()))?;

        let cutoff = self.clock.now_utc() - Duration::days(DELETED_DOCUMENT_RETENTION_DAYS);
        let purged = self.store.purge_deleted_documents(range, cutoff).await?;

        info!(
            partition_index = ?props.partition_index,
            partition_count = ?props.partition_count,
            purged,
            "deleted document purge finished"
        );
        Ok(())
    }
}
