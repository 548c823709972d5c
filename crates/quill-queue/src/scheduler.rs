//! The scheduling facade handed to processors and tasks.
//!
//! An explicit, injected dependency rather than a global: anything that
//! wants deferred work holds a `TaskScheduler` and calls
//! `schedule::<SomeTask>(props)`. Tests swap in the in-memory queue and a
//! test clock and observe exactly what was enqueued.

use std::{sync::Arc, time::Duration};

use quill_core::Clock;
use tracing::debug;

use crate::{
    error::Result,
    job::{JobHandle, JobSpec},
    queue::Queue,
    task::Task,
};

/// Schedules task invocations onto the queue.
#[derive(Clone)]
pub struct TaskScheduler {
    queue: Arc<dyn Queue>,
    clock: Arc<dyn Clock>,
}

impl TaskScheduler {
    /// Creates a scheduler over the given queue and clock.
    pub fn new(queue: Arc<dyn Queue>, clock: Arc<dyn Clock>) -> Self {
        Self { queue, clock }
    }

    /// Enqueues a task to run as soon as a worker is free.
    ///
    /// # Errors
    ///
    /// Returns error if props fail to serialize or the queue write fails.
    pub async fn schedule<T: Task>(&self, props: T::Props) -> Result<JobHandle> {
        self.schedule_in::<T>(props, Duration::ZERO).await
    }

    /// Enqueues a task to run no earlier than `delay` from now.
    ///
    /// The delayed-requeue primitive behind the update debounce.
    ///
    /// # Errors
    ///
    /// Returns error if props fail to serialize or the queue write fails.
    pub async fn schedule_in<T: Task>(&self, props: T::Props, delay: Duration) -> Result<JobHandle> {
        let props = serde_json::to_value(props)?;
        let scheduled_at = self.clock.now_utc()
            + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());

        let handle = self
            .queue
            .enqueue(JobSpec {
                task_name: T::NAME.to_string(),
                props,
                options: T::options(),
                scheduled_at,
            })
            .await?;

        debug!(
            task = T::NAME,
            job_id = %handle.id,
            scheduled_at = %handle.scheduled_at,
            "task scheduled"
        );

        Ok(handle)
    }

    /// The clock this scheduler stamps jobs with.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// The underlying queue.
    pub fn queue(&self) -> Arc<dyn Queue> {
        self.queue.clone()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use quill_core::TestClock;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        error::TaskError,
        queue::mock::InMemoryQueue,
        task::{TaskOptions, TaskPriority},
    };

    #[derive(Serialize, Deserialize)]
    struct NoProps {}

    struct HighPriorityTask;

    #[async_trait]
    impl Task for HighPriorityTask {
        const NAME: &'static str = "high_priority";
        type Props = NoProps;

        fn options() -> TaskOptions {
            TaskOptions { priority: TaskPriority::High, ..TaskOptions::default() }
        }

        async fn perform(&self, _props: Self::Props) -> std::result::Result<(), TaskError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn schedule_merges_task_options_into_job() {
        let queue = Arc::new(InMemoryQueue::new());
        let clock = Arc::new(TestClock::new());
        let scheduler = TaskScheduler::new(queue.clone(), clock);

        let handle = scheduler.schedule::<HighPriorityTask>(NoProps {}).await.unwrap();

        let job = queue.find_job(handle.id).await.unwrap().unwrap();
        assert_eq!(job.task_name, "high_priority");
        assert_eq!(job.priority, TaskPriority::High);
        assert_eq!(job.attempt, 0);
    }

    #[tokio::test]
    async fn schedule_in_offsets_from_injected_clock() {
        let queue = Arc::new(InMemoryQueue::new());
        let clock = Arc::new(TestClock::new());
        let scheduler = TaskScheduler::new(queue.clone(), clock.clone());

        let handle = scheduler
            .schedule_in::<HighPriorityTask>(NoProps {}, Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!((handle.scheduled_at - clock.now_utc()).num_seconds(), 300);
    }
}
