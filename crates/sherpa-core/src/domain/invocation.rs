//! Task invocation: the unit a broker carries and a worker executes.

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::outcome::{InvalidTransition, TaskOutcome};
use crate::error::ConfigError;
use crate::queue::{RetryConfig, RetryPolicy};

/// One delivery of a logical task.
///
/// Design:
/// - `task_id`, `task_name`, `policy` and `payload` never change after
///   submission; redeliveries copy them verbatim.
/// - `attempt_count` and `outcome` are only advanced by the executor
///   (crate-private mutators), so callers cannot rewind retry state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    task_id: TaskId,
    task_name: String,
    attempt_count: u32,
    policy: RetryPolicy,
    payload: serde_json::Value,
    outcome: TaskOutcome,
}

impl TaskInvocation {
    pub fn new(
        task_id: TaskId,
        task_name: impl Into<String>,
        payload: serde_json::Value,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            task_id,
            task_name: task_name.into(),
            attempt_count: 0,
            policy,
            payload,
            outcome: TaskOutcome::Pending,
        }
    }

    /// Build from raw retry settings, rejecting bad delays up front.
    pub fn from_config(
        task_id: TaskId,
        task_name: impl Into<String>,
        payload: serde_json::Value,
        config: RetryConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(task_id, task_name, payload, config.validate()?))
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Number of prior retries (0 on the first delivery).
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_retries(&self) -> u32 {
        self.policy.max_retries()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn outcome(&self) -> TaskOutcome {
        self.outcome
    }

    pub(crate) fn advance(&mut self, next: TaskOutcome) -> Result<(), InvalidTransition> {
        self.outcome = self.outcome.transition(next)?;
        Ok(())
    }

    /// The invocation to hand back to the queue: same task, next attempt.
    pub(crate) fn redelivery(&self) -> Self {
        Self {
            attempt_count: self.attempt_count.saturating_add(1),
            ..self.clone()
        }
    }

    #[cfg(test)]
    pub(crate) fn at_attempt(mut self, attempt_count: u32) -> Self {
        self.attempt_count = attempt_count;
        if attempt_count > 0 {
            self.outcome = TaskOutcome::Retrying;
        }
        self
    }
}
