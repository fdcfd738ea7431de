use thiserror::Error;

use crate::domain::{InvalidTransition, TaskId, TaskOutcome};
use crate::typed::RegistryError;

/// Rejected configuration. Raised when a policy or config is built, never
/// mid-retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite, non-negative number of seconds (got {value})")]
    InvalidDelay { field: &'static str, value: f64 },

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("task {0} was already submitted")]
    Duplicate(TaskId),

    #[error("task {0} is unknown to the queue")]
    UnknownTask(TaskId),

    #[error("queue state lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("task {task_id} already reached terminal outcome {outcome:?}")]
    AlreadyTerminal {
        task_id: TaskId,
        outcome: TaskOutcome,
    },

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("failed to schedule retry: {0}")]
    Schedule(#[from] QueueError),
}

/// Umbrella error for the submission surface.
#[derive(Debug, Error)]
pub enum SherpaError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("payload encode: {0}")]
    Encode(#[from] serde_json::Error),
}
