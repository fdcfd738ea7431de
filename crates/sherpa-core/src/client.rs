//! Submission side: turns typed tasks into invocations on the queue.

use std::sync::Arc;

use crate::domain::{TaskId, TaskInvocation};
use crate::error::{QueueError, SherpaError};
use crate::ports::IdGenerator;
use crate::queue::{TaskQueue, TaskResult};
use crate::typed::{Task, TaskRegistry};

/// Builds invocations with a fresh id and the registry's retry policy for
/// the task name, then submits them.
#[derive(Clone)]
pub struct TaskClient {
    queue: Arc<dyn TaskQueue>,
    registry: Arc<TaskRegistry>,
    ids: Arc<dyn IdGenerator>,
}

impl TaskClient {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        registry: Arc<TaskRegistry>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            queue,
            registry,
            ids,
        }
    }

    pub async fn submit<T: Task>(&self, task: &T) -> Result<TaskHandle, SherpaError> {
        let payload = serde_json::to_value(task)?;
        self.submit_json(T::NAME, payload).await
    }

    /// Submit by name. Fails with `RegistryError::UnknownTask` when no
    /// handler is registered under `name`.
    pub async fn submit_json(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<TaskHandle, SherpaError> {
        let policy = self.registry.policy(name)?;
        let invocation =
            TaskInvocation::new(self.ids.generate_task_id(), name, payload, policy);
        let task_id = self.queue.submit(invocation).await?;

        tracing::debug!(%task_id, task_name = name, "task submitted");
        Ok(TaskHandle {
            task_id,
            queue: Arc::clone(&self.queue),
        })
    }
}

/// Reference to a submitted task.
#[derive(Clone)]
pub struct TaskHandle {
    task_id: TaskId,
    queue: Arc<dyn TaskQueue>,
}

impl TaskHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Wait for the final result. Retries in between are not visible here.
    pub async fn wait(&self) -> Result<TaskResult, QueueError> {
        self.queue.wait_result(self.task_id).await
    }

    pub async fn cancel(&self) -> Result<bool, QueueError> {
        self.queue.cancel(self.task_id).await
    }
}
