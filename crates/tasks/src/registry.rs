//! Task registry and dispatch.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::TaskError;
use crate::name::TaskName;

/// What the engine calls to run a task's external side effect.
///
/// Implementations are plain request/response calls. They must not retry
/// on their own; polling and failure routing belong to the workflow.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Invoke `task` with the projected request payload.
    async fn invoke(
        &self,
        task: TaskName,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError>;
}

/// Handler for a single task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task this handler implements.
    fn task(&self) -> TaskName;

    /// Run the task.
    async fn handle(&self, request: &serde_json::Value) -> Result<serde_json::Value, TaskError>;
}

/// Registry of task handlers, keyed by task name.
pub struct TaskRegistry {
    handlers: HashMap<TaskName, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler. Replaces any previous handler for the same task.
    pub fn register<H: TaskHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.task(), Arc::new(handler));
    }

    /// Get the handler for a task.
    pub fn get(&self, task: TaskName) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&task).cloned()
    }

    /// Check if a task has a handler.
    pub fn has(&self, task: TaskName) -> bool {
        self.handlers.contains_key(&task)
    }

    /// Tasks without a handler, in pipeline order.
    pub fn missing(&self) -> Vec<TaskName> {
        TaskName::ALL
            .iter()
            .copied()
            .filter(|task| !self.has(*task))
            .collect()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tasks: Vec<_> = self.handlers.keys().collect();
        tasks.sort();
        f.debug_struct("TaskRegistry").field("tasks", &tasks).finish()
    }
}

#[async_trait]
impl TaskExecutor for TaskRegistry {
    async fn invoke(
        &self,
        task: TaskName,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, TaskError> {
        let handler = self
            .get(task)
            .ok_or_else(|| TaskError::NotRegistered(task.to_string()))?;

        tracing::debug!(task = %task, "Invoking task handler");
        handler.handle(&request).await
    }
}
