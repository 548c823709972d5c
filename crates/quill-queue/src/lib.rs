//! Durable, retryable background task queue.
//!
//! Provides the [`Task`] contract, the [`Queue`] persistence trait with
//! PostgreSQL and in-memory implementations, the type-erasing
//! [`TaskRegistry`], the injected [`TaskScheduler`] facade, and the worker
//! pool that claims and settles jobs with per-job retry policies.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod job;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod task;
pub mod worker;
pub mod worker_pool;

pub use error::{QueueError, Result, TaskError};
pub use job::{Job, JobHandle, JobId, JobSpec, JobState};
pub use queue::{BoxFuture, PostgresQueue, Queue};
pub use registry::TaskRegistry;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use scheduler::TaskScheduler;
pub use task::{Task, TaskOptions, TaskPriority};
pub use worker::{TaskEngine, WorkerConfig, WorkerStats};
pub use worker_pool::WorkerPool;
