//! Outcome state machine for a task invocation.

use serde::{Deserialize, Serialize};

/// Outcome of a task invocation.
///
/// Transitions:
/// - Pending -> Succeeded | Retrying | Failed
/// - Retrying -> Succeeded | Retrying | Failed
///
/// `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Submitted, not attempted yet.
    #[default]
    Pending,

    /// Completed successfully.
    Succeeded,

    /// Failed at least once, redelivery scheduled.
    Retrying,

    /// Retries exhausted.
    Failed,
}

/// Rejected outcome transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid outcome transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: TaskOutcome,
    pub to: TaskOutcome,
}

impl TaskOutcome {
    /// Is this a terminal outcome (no further attempts)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskOutcome::Succeeded | TaskOutcome::Failed)
    }

    pub fn can_transition_to(self, next: TaskOutcome) -> bool {
        match (self, next) {
            (TaskOutcome::Pending | TaskOutcome::Retrying, TaskOutcome::Succeeded)
            | (TaskOutcome::Pending | TaskOutcome::Retrying, TaskOutcome::Retrying)
            | (TaskOutcome::Pending | TaskOutcome::Retrying, TaskOutcome::Failed) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: TaskOutcome) -> Result<TaskOutcome, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}
