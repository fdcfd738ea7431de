//! Retryable task executor.
//!
//! Runs one delivery of a task and turns its result into exactly one of:
//! success, terminal failure, or a redelivery handed to the queue.
//!
//! The executor never sleeps. On a retryable failure it computes the
//! backoff, emits the `retrying` event and gives the next invocation to the
//! [`RetryScheduler`], which is responsible for waiting out the delay.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{LifecycleEvent, TaskInvocation, TaskOutcome};
use crate::error::ExecuteError;
use crate::observer::{self, Observer};
use crate::ports::{Clock, SystemClock};
use crate::queue::RetryScheduler;

/// What one `execute` call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution<T, E> {
    /// Terminal success with the work's value.
    Succeeded(T),

    /// Transient failure; the queue will redeliver after `delay`.
    RetryScheduled { next_attempt: u32, delay: Duration },

    /// Terminal failure carrying the original cause.
    Failed(E),
}

impl<T, E> Execution<T, E> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Execution::RetryScheduled { .. })
    }
}

pub struct Executor {
    scheduler: Arc<dyn RetryScheduler>,
    observer: Arc<dyn Observer>,
    clock: Arc<dyn Clock>,
}

impl Executor {
    pub fn new(scheduler: Arc<dyn RetryScheduler>, observer: Arc<dyn Observer>) -> Self {
        Self {
            scheduler,
            observer,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for event timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run synchronous `work` against the invocation's payload.
    pub fn execute<T, E, F>(
        &self,
        invocation: &mut TaskInvocation,
        work: F,
    ) -> Result<Execution<T, E>, ExecuteError>
    where
        F: FnOnce(&serde_json::Value) -> Result<T, E>,
        E: Display,
    {
        self.begin(invocation)?;
        let result = work(invocation.payload());
        self.settle(invocation, result)
    }

    /// Same policy as [`execute`](Self::execute) for work that returns a
    /// future. The payload is cloned into the work.
    pub async fn execute_async<T, E, F, Fut>(
        &self,
        invocation: &mut TaskInvocation,
        work: F,
    ) -> Result<Execution<T, E>, ExecuteError>
    where
        F: FnOnce(serde_json::Value) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.begin(invocation)?;
        let result = work(invocation.payload().clone()).await;
        self.settle(invocation, result)
    }

    fn begin(&self, invocation: &TaskInvocation) -> Result<(), ExecuteError> {
        if invocation.outcome().is_terminal() {
            return Err(ExecuteError::AlreadyTerminal {
                task_id: invocation.task_id(),
                outcome: invocation.outcome(),
            });
        }
        self.emit(&LifecycleEvent::started(invocation, self.clock.now()));
        Ok(())
    }

    fn settle<T, E: Display>(
        &self,
        invocation: &mut TaskInvocation,
        result: Result<T, E>,
    ) -> Result<Execution<T, E>, ExecuteError> {
        let cause = match result {
            Ok(value) => {
                invocation.advance(TaskOutcome::Succeeded)?;
                self.emit(&LifecycleEvent::succeeded(invocation, self.clock.now()));
                return Ok(Execution::Succeeded(value));
            }
            Err(cause) => cause,
        };

        let attempt = invocation.attempt_count();
        if !invocation.policy().should_retry(attempt) {
            invocation.advance(TaskOutcome::Failed)?;
            self.emit(&LifecycleEvent::failed(
                invocation,
                cause.to_string(),
                self.clock.now(),
            ));
            return Ok(Execution::Failed(cause));
        }

        let delay = invocation.policy().next_delay(attempt);
        invocation.advance(TaskOutcome::Retrying)?;
        self.emit(&LifecycleEvent::retrying(
            invocation,
            delay,
            cause.to_string(),
            self.clock.now(),
        ));

        let next = invocation.redelivery();
        let next_attempt = next.attempt_count();
        self.scheduler.schedule_retry(next, delay)?;
        Ok(Execution::RetryScheduled {
            next_attempt,
            delay,
        })
    }

    fn emit(&self, event: &LifecycleEvent) {
        observer::dispatch(self.observer.as_ref(), event);
    }
}
