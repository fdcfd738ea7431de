//! Worker pool: leases invocations, runs them through the executor and
//! reports terminal results back to the queue.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::TaskInvocation;
use crate::executor::{Execution, Executor};
use crate::queue::{TaskQueue, TaskResult};
use crate::typed::{TaskContext, TaskRegistry};

/// Worker group handle.
/// - `request_shutdown` stops every worker from taking new leases
/// - `shutdown_and_join` also waits for in-flight runs to finish
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers on the current runtime.
    pub fn spawn(
        n: usize,
        queue: Arc<dyn TaskQueue>,
        registry: Arc<TaskRegistry>,
        executor: Arc<Executor>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    queue: Arc::clone(&queue),
                    registry: Arc::clone(&registry),
                    executor: Arc::clone(&executor),
                };
                let rx = shutdown_rx.clone();
                tokio::spawn(async move { worker.run(rx).await })
            })
            .collect();

        tracing::info!(workers = n, "worker group started");
        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Does not cancel in-flight handlers; workers stop after their current run.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
        tracing::info!("worker group stopped");
    }
}

struct Worker {
    id: usize,
    queue: Arc<dyn TaskQueue>,
    registry: Arc<TaskRegistry>,
    executor: Arc<Executor>,
}

impl Worker {
    async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let leased = tokio::select! {
                changed = shutdown_rx.changed() => {
                    // sender dropped counts as shutdown
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                leased = self.queue.lease() => leased,
            };

            // None: the queue was closed.
            let Some(invocation) = leased else {
                break;
            };
            self.run_one(invocation).await;
        }
        tracing::debug!(worker = self.id, "worker exiting");
    }

    async fn run_one(&self, mut invocation: TaskInvocation) {
        let task_id = invocation.task_id();

        let Some(handler) = self.registry.get(invocation.task_name()) else {
            tracing::error!(
                worker = self.id,
                %task_id,
                task_name = invocation.task_name(),
                "no handler registered"
            );
            let result = TaskResult::Failed {
                cause: format!("no handler registered for '{}'", invocation.task_name()),
                attempts: invocation.attempt_count(),
            };
            self.report(invocation, result).await;
            return;
        };

        let ctx = TaskContext::of(&invocation);
        let execution = self
            .executor
            .execute_async(&mut invocation, |payload| handler.handle_dyn(payload, ctx))
            .await;

        let result = match execution {
            Ok(Execution::Succeeded(value)) => TaskResult::Succeeded { value },
            Ok(Execution::Failed(cause)) => TaskResult::Failed {
                cause: cause.to_string(),
                attempts: invocation.attempt_count(),
            },
            Ok(Execution::RetryScheduled { .. }) => return,
            Err(e) => {
                tracing::error!(worker = self.id, %task_id, error = %e, "execution error");
                TaskResult::Failed {
                    cause: e.to_string(),
                    attempts: invocation.attempt_count(),
                }
            }
        };
        self.report(invocation, result).await;
    }

    async fn report(&self, invocation: TaskInvocation, result: TaskResult) {
        let task_id = invocation.task_id();
        if let Err(e) = self.queue.complete(task_id, result).await {
            tracing::error!(worker = self.id, %task_id, error = %e, "complete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::TaskClient;
    use crate::domain::{EventKind, TaskId};
    use crate::observer::RecordingObserver;
    use crate::ports::{SystemClock, UlidGenerator};
    use crate::queue::{InMemoryTaskQueue, RetryConfig, RetryPolicy};
    use crate::typed::{Handler, Task, TaskError};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use ulid::Ulid;

    /// Fails while `attempt_count < succeed_at`.
    #[derive(Serialize, Deserialize)]
    struct Flaky {
        succeed_at: u32,
    }

    impl Task for Flaky {
        const NAME: &'static str = "test.flaky";
        type Output = u32;

        fn retry_config() -> RetryConfig {
            RetryConfig::new(3, 1.0, 60.0).with_jitter(false)
        }
    }

    struct FlakyHandler;

    #[async_trait]
    impl Handler<Flaky> for FlakyHandler {
        async fn handle(&self, task: Flaky, ctx: TaskContext) -> Result<u32, TaskError> {
            if ctx.attempt_count < task.succeed_at {
                return Err(TaskError::failed(format!("attempt {} failed", ctx.attempt_count)));
            }
            Ok(ctx.attempt_count)
        }
    }

    struct Setup {
        queue: Arc<InMemoryTaskQueue>,
        client: TaskClient,
        observer: Arc<RecordingObserver>,
        workers: WorkerGroup,
    }

    fn setup(n: usize) -> Setup {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let observer = Arc::new(RecordingObserver::new());
        let executor = Arc::new(Executor::new(queue.clone(), observer.clone()));

        let mut registry = TaskRegistry::new();
        registry.register::<Flaky, _>(FlakyHandler).unwrap();
        let registry = Arc::new(registry);

        let client = TaskClient::new(
            queue.clone(),
            Arc::clone(&registry),
            Arc::new(UlidGenerator::new(SystemClock)),
        );
        let workers = WorkerGroup::spawn(n, queue.clone(), registry, executor);
        Setup {
            queue,
            client,
            observer,
            workers,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success_with_backoff() {
        let s = setup(2);
        let started = tokio::time::Instant::now();

        let handle = s.client.submit(&Flaky { succeed_at: 2 }).await.unwrap();
        let result = handle.wait().await.unwrap();

        assert_eq!(result, TaskResult::Succeeded { value: json!(2) });
        // 1s + 2s of backoff on the paused clock.
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(
            s.observer.kinds(),
            vec![
                EventKind::Started,
                EventKind::Retrying,
                EventKind::Started,
                EventKind::Retrying,
                EventKind::Started,
                EventKind::Succeeded,
            ]
        );
        let counts = s.queue.counts().await.unwrap();
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.retry_scheduled, 0);

        s.workers.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn three_redeliveries_follow_the_backoff_schedule() {
        let s = setup(2);

        let handle = s.client.submit(&Flaky { succeed_at: 3 }).await.unwrap();
        let result = handle.wait().await.unwrap();

        assert_eq!(result, TaskResult::Succeeded { value: json!(3) });
        let delays: Vec<_> = s
            .observer
            .events()
            .into_iter()
            .filter(|e| e.kind == EventKind::Retrying)
            .map(|e| e.delay)
            .collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
            ]
        );
        assert_eq!(s.observer.kinds().last(), Some(&EventKind::Succeeded));

        s.workers.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_publish_one_failure() {
        let s = setup(1);

        let handle = s.client.submit(&Flaky { succeed_at: 10 }).await.unwrap();
        let result = handle.wait().await.unwrap();

        assert_eq!(
            result,
            TaskResult::Failed {
                cause: "attempt 3 failed".to_string(),
                attempts: 3
            }
        );
        let kinds = s.observer.kinds();
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::Started).count(), 4);
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::Retrying).count(), 3);
        assert_eq!(kinds.last(), Some(&EventKind::Failed));

        s.workers.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn unknown_task_name_fails_without_events() {
        let s = setup(1);
        let task_id = TaskId::from_ulid(Ulid::new());
        s.queue
            .submit(TaskInvocation::new(
                task_id,
                "ghost",
                json!({}),
                RetryPolicy::default(),
            ))
            .await
            .unwrap();

        let result = s.queue.wait_result(task_id).await.unwrap();

        assert!(matches!(result, TaskResult::Failed { attempts: 0, .. }));
        assert!(s.observer.events().is_empty());
        s.workers.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let s = setup(3);
        assert_eq!(s.workers.len(), 3);
        tokio::time::timeout(Duration::from_secs(1), s.workers.shutdown_and_join())
            .await
            .expect("workers did not stop");
    }

    #[tokio::test]
    async fn closing_the_queue_stops_workers() {
        let s = setup(2);
        s.queue.close();
        tokio::time::timeout(Duration::from_secs(1), s.workers.shutdown_and_join())
            .await
            .expect("workers did not stop");
    }
}
