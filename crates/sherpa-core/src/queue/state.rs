//! Queue-side delivery state of a task.

use serde::{Deserialize, Serialize};

/// Delivery state tracked by the queue.
///
/// State transitions:
/// - Queued -> Running -> Succeeded
/// - Queued -> Running -> RetryScheduled -> Queued (until retries run out)
/// - Queued -> Running -> Failed
/// - Queued | RetryScheduled -> Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Ready to be leased.
    Queued,

    /// Leased by a worker.
    Running,

    /// Waiting out a backoff delay.
    RetryScheduled,

    Succeeded,

    /// Retries exhausted.
    Failed,

    Cancelled,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Can a task in this state be dropped without touching a worker?
    pub fn is_cancellable(self) -> bool {
        matches!(self, TaskState::Queued | TaskState::RetryScheduled)
    }
}
