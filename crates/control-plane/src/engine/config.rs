//! Deployment configuration handed to the engine at construction.

use cutover_tasks::TaskName;
use std::collections::HashMap;
use std::time::Duration;

/// Default whole-run deadline.
pub const DEFAULT_EXECUTION_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Default per-invocation task timeout.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// PostgreSQL URL for the history store. `None` selects the in-memory store.
    pub history_store_endpoint: Option<String>,

    /// Wall-clock budget per run, measured from start.
    pub execution_deadline: Duration,

    /// Endpoint per task.
    pub task_executor_endpoints: HashMap<TaskName, String>,

    /// Timeout for each task invocation.
    pub task_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_store_endpoint: None,
            execution_deadline: DEFAULT_EXECUTION_DEADLINE,
            task_executor_endpoints: HashMap::new(),
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}
