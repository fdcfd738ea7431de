//! Lifecycle events emitted by the executor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::invocation::TaskInvocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Retrying,
    Succeeded,
    Failed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Retrying => "retrying",
            EventKind::Succeeded => "succeeded",
            EventKind::Failed => "failed",
        }
    }
}

/// A lifecycle event with a fixed field set.
///
/// `attempt_count` is the attempt the event is about: the current one for
/// `started`/`succeeded`/`failed`, the upcoming one for `retrying`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub task_id: TaskId,
    pub task_name: String,
    pub kind: EventKind,
    pub attempt_count: u32,
    pub max_retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,

    pub at: DateTime<Utc>,
}

impl LifecycleEvent {
    fn base(kind: EventKind, invocation: &TaskInvocation, at: DateTime<Utc>) -> Self {
        Self {
            task_id: invocation.task_id(),
            task_name: invocation.task_name().to_string(),
            kind,
            attempt_count: invocation.attempt_count(),
            max_retries: invocation.max_retries(),
            delay: None,
            cause: None,
            at,
        }
    }

    pub fn started(invocation: &TaskInvocation, at: DateTime<Utc>) -> Self {
        Self::base(EventKind::Started, invocation, at)
    }

    pub fn succeeded(invocation: &TaskInvocation, at: DateTime<Utc>) -> Self {
        Self::base(EventKind::Succeeded, invocation, at)
    }

    pub fn retrying(
        invocation: &TaskInvocation,
        delay: Duration,
        cause: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_count: invocation.attempt_count().saturating_add(1),
            delay: Some(delay),
            cause: Some(cause.into()),
            ..Self::base(EventKind::Retrying, invocation, at)
        }
    }

    pub fn failed(
        invocation: &TaskInvocation,
        cause: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            cause: Some(cause.into()),
            ..Self::base(EventKind::Failed, invocation, at)
        }
    }
}
