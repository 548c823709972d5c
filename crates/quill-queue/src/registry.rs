//! Task registry: resolves job rows back to typed task implementations.
//!
//! Tasks register once at process start. The registry erases the typed
//! props behind a JSON boundary so the worker can run any job from its
//! `task_name` column alone. Props that fail to deserialize are a terminal
//! failure; retrying cannot fix a malformed payload.

use std::{collections::HashMap, sync::Arc};

use tracing::warn;

use crate::{
    error::TaskError,
    queue::BoxFuture,
    task::{Task, TaskOptions},
};

trait ErasedTask: Send + Sync {
    fn perform(&self, props: serde_json::Value) -> BoxFuture<'_, Result<(), TaskError>>;
    fn on_failed(&self, props: serde_json::Value) -> BoxFuture<'_, ()>;
}

struct Adapter<T: Task> {
    task: Arc<T>,
}

impl<T: Task> ErasedTask for Adapter<T> {
    fn perform(&self, props: serde_json::Value) -> BoxFuture<'_, Result<(), TaskError>> {
        Box::pin(async move {
            let props: T::Props = serde_json::from_value(props).map_err(|e| {
                TaskError::terminal(format!("invalid props for task {}: {e}", T::NAME))
            })?;
            self.task.perform(props).await
        })
    }

    fn on_failed(&self, props: serde_json::Value) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match serde_json::from_value::<T::Props>(props) {
                Ok(props) => self.task.on_failed(props).await,
                Err(e) => {
                    warn!(task = T::NAME, error = %e, "skipping on_failed: props undecodable");
                },
            }
        })
    }
}

/// Maps task names to their registered implementations and options.
#[derive(Default)]
pub struct TaskRegistry {
    entries: HashMap<&'static str, (TaskOptions, Arc<dyn ErasedTask>)>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task instance under its static name.
    ///
    /// # Panics
    ///
    /// Panics if the name is already registered; duplicate names are a
    /// wiring bug caught at startup.
    pub fn register<T: Task>(&mut self, task: T) {
        let replaced =
            self.entries.insert(T::NAME, (T::options(), Arc::new(Adapter { task: Arc::new(task) })));
        assert!(replaced.is_none(), "task {} registered twice", T::NAME);
    }

    /// Whether a task name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered task names, for startup logging.
    pub fn task_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Runs the named task's `perform` with JSON props.
    ///
    /// # Errors
    ///
    /// Terminal error for unknown task names; otherwise whatever the task
    /// returns.
    pub async fn perform(&self, name: &str, props: serde_json::Value) -> Result<(), TaskError> {
        match self.entries.get(name) {
            Some((_, task)) => task.perform(props).await,
            None => Err(TaskError::terminal(format!("unknown task: {name}"))),
        }
    }

    /// Runs the named task's `on_failed` hook. Best-effort: unknown names
    /// are logged and ignored.
    pub async fn run_on_failed(&self, name: &str, props: serde_json::Value) {
        match self.entries.get(name) {
            Some((_, task)) => task.on_failed(props).await,
            None => warn!(task = name, "skipping on_failed: task not registered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize)]
    struct EchoProps {
        value: u32,
    }

    struct EchoTask {
        performed: Arc<AtomicUsize>,
        failed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Task for EchoTask {
        const NAME: &'static str = "echo";
        type Props = EchoProps;

        async fn perform(&self, props: Self::Props) -> Result<(), TaskError> {
            self.performed.fetch_add(props.value as usize, Ordering::SeqCst);
            Ok(())
        }

        async fn on_failed(&self, _props: Self::Props) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn registered_task_runs_with_typed_props() {
        let performed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let mut registry = TaskRegistry::new();
        registry.register(EchoTask { performed: performed.clone(), failed: failed.clone() });

        registry.perform("echo", serde_json::json!({"value": 7})).await.unwrap();
        assert_eq!(performed.load(Ordering::SeqCst), 7);

        registry.run_on_failed("echo", serde_json::json!({"value": 1})).await;
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_task_is_terminal() {
        let registry = TaskRegistry::new();
        let err = registry.perform("missing", serde_json::json!({})).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_props_are_terminal() {
        let mut registry = TaskRegistry::new();
        registry.register(EchoTask {
            performed: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
        });

        let err = registry.perform("echo", serde_json::json!({"nope": true})).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
