//! Task record: latest invocation + delivery bookkeeping.

use tokio::sync::watch;
use tokio::time::Instant;

use super::{TaskResult, TaskState};
use crate::domain::TaskInvocation;

/// Single source of truth for one task inside the in-memory queue.
/// Ready/scheduled structures hold `TaskId`s only.
#[derive(Debug)]
pub struct TaskRecord {
    /// Invocation to deliver next (attempt count already advanced on retry).
    pub invocation: TaskInvocation,
    pub state: TaskState,

    /// Set when a cancel arrives while the task is running.
    pub cancel_requested: bool,

    /// When to redeliver (RetryScheduled only).
    pub next_run_at: Option<Instant>,

    pub created_at: Instant,
    pub updated_at: Instant,

    result_tx: watch::Sender<Option<TaskResult>>,
}

impl TaskRecord {
    pub fn new(invocation: TaskInvocation) -> Self {
        let now = Instant::now();
        let (result_tx, _) = watch::channel(None);
        Self {
            invocation,
            state: TaskState::Queued,
            cancel_requested: false,
            next_run_at: None,
            created_at: now,
            updated_at: now,
            result_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TaskResult>> {
        self.result_tx.subscribe()
    }

    pub fn start_attempt(&mut self) {
        self.state = TaskState::Running;
        self.updated_at = Instant::now();
    }

    pub fn schedule_retry(&mut self, invocation: TaskInvocation, next_run_at: Instant) {
        self.invocation = invocation;
        self.state = TaskState::RetryScheduled;
        self.next_run_at = Some(next_run_at);
        self.updated_at = Instant::now();
    }

    /// Move from RetryScheduled back to Queued.
    pub fn requeue(&mut self) {
        self.state = TaskState::Queued;
        self.next_run_at = None;
        self.updated_at = Instant::now();
    }

    /// Enter a terminal state and publish the result.
    pub fn finish(&mut self, result: TaskResult) {
        self.state = match &result {
            TaskResult::Succeeded { .. } => TaskState::Succeeded,
            TaskResult::Failed { .. } => TaskState::Failed,
            TaskResult::Cancelled => TaskState::Cancelled,
        };
        self.next_run_at = None;
        self.updated_at = Instant::now();
        self.result_tx.send_replace(Some(result));
    }
}
