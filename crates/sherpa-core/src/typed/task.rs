use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{TaskId, TaskInvocation};
use crate::queue::RetryConfig;

/// Binds a payload type to a registered task name and its retry settings.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Resize { path: String }
///
/// impl Task for Resize {
///     const NAME: &'static str = "media.resize";
///     type Output = serde_json::Value;
/// }
/// ```
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    const NAME: &'static str;

    /// What a successful run produces. Stored as JSON in the result channel.
    type Output: Serialize + Send;

    fn retry_config() -> RetryConfig {
        RetryConfig::default()
    }
}

/// Per-delivery information handed to a handler alongside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskContext {
    pub task_id: TaskId,
    /// Prior retries of this task (0 on the first delivery).
    pub attempt_count: u32,
    pub max_retries: u32,
}

impl TaskContext {
    pub fn of(invocation: &TaskInvocation) -> Self {
        Self {
            task_id: invocation.task_id(),
            attempt_count: invocation.attempt_count(),
            max_retries: invocation.max_retries(),
        }
    }
}
