//! In-memory queue implementation.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{QueueCounts, RetryScheduler, TaskQueue, TaskRecord, TaskResult, TaskState};
use crate::domain::{TaskId, TaskInvocation};
use crate::error::QueueError;

/// Upper bound on how far out a redelivery is parked.
const MAX_PARK: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// How long a finished task's record and result stay queryable.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Scheduled task entry for the retry heap.
///
/// Reverse ordering so `BinaryHeap` acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledTask {
    next_run_at: Instant,
    task_id: TaskId,
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

#[derive(Default)]
struct QueueState {
    /// All task records (single source of truth).
    records: HashMap<TaskId, TaskRecord>,

    /// Ready queue (TaskIds only).
    ready: VecDeque<TaskId>,

    /// Retry backoff heap.
    scheduled: BinaryHeap<ScheduledTask>,

    closed: bool,
}

impl QueueState {
    /// Move tasks from scheduled to ready once their time has come.
    fn promote_scheduled_tasks(&mut self, now: Instant) {
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            // cancelled entries stay in the heap until they surface here
            if let Some(record) = self.records.get_mut(&entry.task_id)
                && record.state == TaskState::RetryScheduled
            {
                record.requeue();
                self.ready.push_back(entry.task_id);
            }
        }
    }

    /// Drop finished records older than `ttl`. Ready/scheduled entries that
    /// point at a dropped id are skipped when they surface.
    fn purge_expired(&mut self, now: Instant, ttl: Duration) {
        let before = self.records.len();
        self.records.retain(|_, record| {
            !(record.state.is_terminal()
                && now.saturating_duration_since(record.updated_at) >= ttl)
        });
        let purged = before - self.records.len();
        if purged > 0 {
            tracing::debug!(purged, "expired finished task records");
        }
    }

    /// Pop the next queued task and mark it running.
    fn next_ready(&mut self) -> Option<TaskInvocation> {
        while let Some(task_id) = self.ready.pop_front() {
            if let Some(record) = self.records.get_mut(&task_id)
                && record.state == TaskState::Queued
            {
                record.start_attempt();
                return Some(record.invocation.clone());
            }
        }
        None
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.records.values() {
            match record.state {
                TaskState::Queued => counts.queued += 1,
                TaskState::Running => counts.running += 1,
                TaskState::RetryScheduled => counts.retry_scheduled += 1,
                TaskState::Succeeded => counts.succeeded += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}

/// In-memory broker with a result backend.
///
/// State sits behind a std `Mutex` that is never held across an await, so
/// the synchronous [`RetryScheduler`] path and the async paths share it.
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    result_ttl: Duration,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            notify: Notify::new(),
            result_ttl: DEFAULT_RESULT_TTL,
        }
    }
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep finished records for `ttl` after they finish.
    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Current state of one task (for status queries and tests).
    pub fn state_of(&self, task_id: TaskId) -> Option<TaskState> {
        let state = self.lock().ok()?;
        state.records.get(&task_id).map(|r| r.state)
    }
}

impl RetryScheduler for InMemoryTaskQueue {
    fn schedule_retry(
        &self,
        invocation: TaskInvocation,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let scheduled = {
            let mut state = self.lock()?;
            if state.closed {
                return Err(QueueError::Closed);
            }
            let task_id = invocation.task_id();
            let Some(record) = state.records.get_mut(&task_id) else {
                return Err(QueueError::UnknownTask(task_id));
            };
            if record.cancel_requested {
                tracing::info!(%task_id, "dropping redelivery of cancelled task");
                record.finish(TaskResult::Cancelled);
                false
            } else {
                let now = Instant::now();
                let next_run_at = now
                    .checked_add(delay.min(MAX_PARK))
                    .unwrap_or(now);
                record.schedule_retry(invocation, next_run_at);
                state.scheduled.push(ScheduledTask {
                    next_run_at,
                    task_id,
                });
                true
            }
        }; // Lock released here

        // Wake an idle worker so it re-arms its timer.
        if scheduled {
            self.notify.notify_one();
        }
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn submit(&self, invocation: TaskInvocation) -> Result<TaskId, QueueError> {
        let task_id = invocation.task_id();
        {
            let mut state = self.lock()?;
            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.records.contains_key(&task_id) {
                return Err(QueueError::Duplicate(task_id));
            }
            state.purge_expired(Instant::now(), self.result_ttl);
            state.records.insert(task_id, TaskRecord::new(invocation));
            state.ready.push_back(task_id);
        }
        self.notify.notify_one();
        Ok(task_id)
    }

    async fn lease(&self) -> Option<TaskInvocation> {
        loop {
            // Register interest before inspecting state so a submit between
            // the check and the wait is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_wake = {
                let mut state = match self.lock() {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::error!(error = %e, "lease aborted");
                        return None;
                    }
                };
                if state.closed {
                    return None;
                }
                let now = Instant::now();
                state.purge_expired(now, self.result_ttl);
                state.promote_scheduled_tasks(now);
                if let Some(invocation) = state.next_ready() {
                    return Some(invocation);
                }
                state.scheduled.peek().map(|entry| entry.next_run_at)
            };

            // Wait for a notification OR the next scheduled redelivery.
            if let Some(wake_time) = next_wake {
                tokio::select! {
                    _ = &mut notified => {},
                    _ = tokio::time::sleep_until(wake_time) => {},
                }
            } else {
                notified.await;
            }
        }
    }

    async fn complete(&self, task_id: TaskId, result: TaskResult) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        let record = state
            .records
            .get_mut(&task_id)
            .ok_or(QueueError::UnknownTask(task_id))?;
        if record.state.is_terminal() {
            tracing::debug!(%task_id, state = ?record.state, "ignoring result for finished task");
            return Ok(());
        }
        record.finish(result);
        Ok(())
    }

    async fn cancel(&self, task_id: TaskId) -> Result<bool, QueueError> {
        let mut state = self.lock()?;
        let record = state
            .records
            .get_mut(&task_id)
            .ok_or(QueueError::UnknownTask(task_id))?;
        if record.state.is_cancellable() {
            record.finish(TaskResult::Cancelled);
            Ok(true)
        } else if record.state == TaskState::Running {
            record.cancel_requested = true;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn wait_result(&self, task_id: TaskId) -> Result<TaskResult, QueueError> {
        let mut rx = {
            let state = self.lock()?;
            state
                .records
                .get(&task_id)
                .ok_or(QueueError::UnknownTask(task_id))?
                .subscribe()
        };
        let result = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| QueueError::Closed)?;
        result.clone().ok_or(QueueError::Closed)
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let state = self.lock()?;
        Ok(state.counts())
    }

    fn close(&self) {
        match self.lock() {
            Ok(mut state) => {
                state.closed = true;
                let mut abandoned = 0usize;
                for record in state.records.values_mut() {
                    if record.state.is_cancellable() {
                        record.finish(TaskResult::Cancelled);
                        abandoned += 1;
                    }
                }
                state.ready.clear();
                state.scheduled.clear();
                if abandoned > 0 {
                    tracing::warn!(abandoned, "queue closed with undelivered tasks");
                }
            }
            Err(e) => tracing::error!(error = %e, "close could not mark queue closed"),
        }
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::queue::RetryPolicy;
    use ulid::Ulid;

    fn invocation() -> TaskInvocation {
        TaskInvocation::new(
            TaskId::from_ulid(Ulid::new()),
            "test",
            serde_json::json!({"key": "value"}),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn submit_and_counts() {
        let queue = InMemoryTaskQueue::new();
        queue.submit(invocation()).await.unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.running, 0);
    }

    #[tokio::test]
    async fn duplicate_submit_is_rejected() {
        let queue = InMemoryTaskQueue::new();
        let inv = invocation();
        queue.submit(inv.clone()).await.unwrap();
        let err = queue.submit(inv).await.unwrap_err();
        assert!(matches!(err, QueueError::Duplicate(_)));
    }

    #[tokio::test]
    async fn lease_transitions_to_running() {
        let queue = InMemoryTaskQueue::new();
        let id = queue.submit(invocation()).await.unwrap();

        let leased = tokio::time::timeout(Duration::from_millis(100), queue.lease())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leased.task_id(), id);
        assert_eq!(leased.task_name(), "test");
        assert_eq!(queue.state_of(id), Some(TaskState::Running));
    }

    #[tokio::test]
    async fn lease_waits_for_submit() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.lease().await }
        });
        tokio::task::yield_now().await;

        let id = queue.submit(invocation()).await.unwrap();
        let leased = waiter.await.unwrap().unwrap();
        assert_eq!(leased.task_id(), id);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_is_redelivered_after_delay() {
        let queue = InMemoryTaskQueue::new();
        queue.submit(invocation()).await.unwrap();
        let first = queue.lease().await.unwrap();

        let start = tokio::time::Instant::now();
        queue
            .schedule_retry(first.redelivery(), Duration::from_secs(4))
            .unwrap();
        assert_eq!(queue.counts().await.unwrap().retry_scheduled, 1);

        let second = queue.lease().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert_eq!(second.task_id(), first.task_id());
        assert_eq!(second.attempt_count(), 1);
    }

    #[tokio::test]
    async fn complete_publishes_result_to_waiters() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let id = queue.submit(invocation()).await.unwrap();
        let _ = queue.lease().await.unwrap();

        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.wait_result(id).await }
        });
        queue
            .complete(id, TaskResult::Succeeded { value: serde_json::json!(1) })
            .await
            .unwrap();

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result, TaskResult::Succeeded { value: serde_json::json!(1) });
        assert_eq!(queue.counts().await.unwrap().succeeded, 1);
    }

    #[tokio::test]
    async fn cancel_queued_task_resolves_cancelled() {
        let queue = InMemoryTaskQueue::new();
        let id = queue.submit(invocation()).await.unwrap();

        assert!(queue.cancel(id).await.unwrap());
        assert_eq!(queue.wait_result(id).await.unwrap(), TaskResult::Cancelled);

        // the cancelled id is skipped by lease
        let other = queue.submit(invocation()).await.unwrap();
        assert_eq!(queue.lease().await.unwrap().task_id(), other);
    }

    #[tokio::test]
    async fn cancel_running_task_drops_its_redelivery() {
        let queue = InMemoryTaskQueue::new();
        let id = queue.submit(invocation()).await.unwrap();
        let leased = queue.lease().await.unwrap();

        assert!(queue.cancel(id).await.unwrap());
        queue
            .schedule_retry(leased.redelivery(), Duration::ZERO)
            .unwrap();

        assert_eq!(queue.state_of(id), Some(TaskState::Cancelled));
        assert_eq!(queue.wait_result(id).await.unwrap(), TaskResult::Cancelled);
    }

    #[tokio::test]
    async fn cancel_finished_task_reports_false() {
        let queue = InMemoryTaskQueue::new();
        let id = queue.submit(invocation()).await.unwrap();
        let _ = queue.lease().await.unwrap();
        queue
            .complete(
                id,
                TaskResult::Failed {
                    cause: "boom".into(),
                    attempts: 0,
                },
            )
            .await
            .unwrap();
        assert!(!queue.cancel(id).await.unwrap());
    }

    #[tokio::test]
    async fn close_releases_waiting_workers() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.lease().await }
        });
        tokio::task::yield_now().await;

        queue.close();
        assert!(waiter.await.unwrap().is_none());
        assert!(matches!(
            queue.submit(invocation()).await,
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn close_resolves_undelivered_tasks_as_cancelled() {
        let queue = InMemoryTaskQueue::new();
        let running = queue.submit(invocation()).await.unwrap();
        let leased = queue.lease().await.unwrap();
        let queued = queue.submit(invocation()).await.unwrap();

        queue.close();

        assert_eq!(queue.wait_result(queued).await.unwrap(), TaskResult::Cancelled);
        assert_eq!(queue.state_of(running), Some(TaskState::Running));
        assert!(matches!(
            queue.schedule_retry(leased.redelivery(), Duration::ZERO),
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_retry_scheduled_task_skips_stale_entry() {
        let queue = InMemoryTaskQueue::new();
        let id = queue.submit(invocation()).await.unwrap();
        let leased = queue.lease().await.unwrap();
        queue
            .schedule_retry(leased.redelivery(), Duration::from_secs(10))
            .unwrap();
        assert_eq!(queue.state_of(id), Some(TaskState::RetryScheduled));

        assert!(queue.cancel(id).await.unwrap());
        assert_eq!(queue.wait_result(id).await.unwrap(), TaskResult::Cancelled);

        // the heap entry for `id` comes due first but must not be delivered
        let other = queue.submit(invocation()).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        let next = queue.lease().await.unwrap();
        assert_eq!(next.task_id(), other);
        assert_eq!(queue.state_of(id), Some(TaskState::Cancelled));
        assert_eq!(queue.counts().await.unwrap().queued, 0);
        assert!(
            tokio::time::timeout(Duration::from_secs(1), queue.lease())
                .await
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn finished_records_expire_after_result_ttl() {
        let queue = InMemoryTaskQueue::new().with_result_ttl(Duration::from_secs(60));
        let id = queue.submit(invocation()).await.unwrap();
        let _ = queue.lease().await.unwrap();
        let done = TaskResult::Succeeded {
            value: serde_json::json!(1),
        };
        queue.complete(id, done.clone()).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        queue.submit(invocation()).await.unwrap();
        assert_eq!(queue.state_of(id), Some(TaskState::Succeeded));
        assert_eq!(queue.wait_result(id).await.unwrap(), done);

        tokio::time::advance(Duration::from_secs(31)).await;
        queue.submit(invocation()).await.unwrap();
        assert_eq!(queue.state_of(id), None);
        assert!(matches!(
            queue.wait_result(id).await,
            Err(QueueError::UnknownTask(_))
        ));
        assert_eq!(queue.counts().await.unwrap().succeeded, 0);
    }

    #[tokio::test]
    async fn unknown_task_is_reported() {
        let queue = InMemoryTaskQueue::new();
        let id = TaskId::from_ulid(Ulid::new());
        assert!(matches!(
            queue.wait_result(id).await,
            Err(QueueError::UnknownTask(_))
        ));
        assert!(matches!(
            queue.schedule_retry(invocation(), Duration::ZERO),
            Err(QueueError::UnknownTask(_))
        ));
    }
}
