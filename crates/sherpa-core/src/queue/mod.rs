//! Queue module: broker port, retry policy, and in-memory implementation.

mod memory;
mod record;
mod retry;
mod state;

pub use memory::{DEFAULT_RESULT_TTL, InMemoryTaskQueue};
pub use record::TaskRecord;
pub use retry::{RetryConfig, RetryPolicy};
pub use state::TaskState;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{TaskId, TaskInvocation};
use crate::error::QueueError;

/// Redelivery interface the executor hands retries to.
///
/// Synchronous: the executor never awaits and never sleeps; realizing the
/// delay is the queue's job.
pub trait RetryScheduler: Send + Sync {
    fn schedule_retry(&self, invocation: TaskInvocation, delay: Duration) -> Result<(), QueueError>;
}

/// Final result of a logical task, as seen on the result channel.
/// Intermediate retries never show up here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    Succeeded { value: serde_json::Value },
    Failed { cause: String, attempts: u32 },
    Cancelled,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Succeeded { .. })
    }
}

/// Task counts per queue state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub running: usize,
    pub retry_scheduled: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Broker port.
///
/// The in-memory queue is the only implementation; this trait is the seam
/// for a real broker later.
#[async_trait]
pub trait TaskQueue: RetryScheduler {
    /// Accept a new logical task.
    async fn submit(&self, invocation: TaskInvocation) -> Result<TaskId, QueueError>;

    /// Wait for the next deliverable invocation. `None` once the queue is
    /// closed.
    async fn lease(&self) -> Option<TaskInvocation>;

    /// Record the terminal result of a task and publish it to waiters.
    async fn complete(&self, task_id: TaskId, result: TaskResult) -> Result<(), QueueError>;

    /// Best-effort cancellation. Returns `true` if no further delivery of the
    /// task will happen.
    async fn cancel(&self, task_id: TaskId) -> Result<bool, QueueError>;

    /// Wait for the final result of a task.
    async fn wait_result(&self, task_id: TaskId) -> Result<TaskResult, QueueError>;

    async fn counts(&self) -> Result<QueueCounts, QueueError>;

    /// Stop handing out leases. Queued and retry-scheduled tasks resolve as
    /// cancelled; running ones may still complete.
    fn close(&self);
}
