//! Built-in example tasks. Both simulate work and fail at random on early
//! attempts so the retry path gets exercised.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::TaskId;
use crate::ports::{Clock, SystemClock};
use crate::queue::RetryConfig;
use crate::typed::{Handler, RegistryError, Task, TaskContext, TaskError, TaskRegistry};

/// Random failure on early attempts: fails with probability `rate` while
/// `attempt_count < below_attempt`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureInjector {
    pub rate: f64,
    pub below_attempt: u32,
}

impl FailureInjector {
    pub const fn new(rate: f64, below_attempt: u32) -> Self {
        Self {
            rate,
            below_attempt,
        }
    }

    pub const fn never() -> Self {
        Self::new(0.0, 0)
    }

    pub fn should_fail(&self, attempt_count: u32) -> bool {
        attempt_count < self.below_attempt && rand::random::<f64>() < self.rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoTask {
    #[serde(default = "DemoTask::default_message")]
    pub message: String,
}

impl DemoTask {
    fn default_message() -> String {
        "Hello from Sherpa!".to_string()
    }
}

impl Default for DemoTask {
    fn default() -> Self {
        Self {
            message: Self::default_message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoOutput {
    pub message: String,
    pub task_id: TaskId,
    pub retries: u32,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

impl Task for DemoTask {
    const NAME: &'static str = "tasks.example.demo_task";
    type Output = DemoOutput;

    fn retry_config() -> RetryConfig {
        RetryConfig::new(3, 1.0, 60.0)
    }
}

pub struct DemoTaskHandler {
    failures: FailureInjector,
    work: Duration,
    clock: Arc<dyn Clock>,
}

impl DemoTaskHandler {
    pub fn new(failures: FailureInjector, work: Duration) -> Self {
        Self {
            failures,
            work,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for DemoTaskHandler {
    fn default() -> Self {
        Self::new(FailureInjector::new(0.3, 2), Duration::from_millis(100))
    }
}

#[async_trait]
impl Handler<DemoTask> for DemoTaskHandler {
    async fn handle(&self, task: DemoTask, ctx: TaskContext) -> Result<DemoOutput, TaskError> {
        tracing::info!(task_id = %ctx.task_id, message = %task.message, "executing demo_task");
        tokio::time::sleep(self.work).await;

        if self.failures.should_fail(ctx.attempt_count) {
            return Err(TaskError::failed(format!(
                "simulated failure on attempt {}",
                ctx.attempt_count + 1
            )));
        }

        Ok(DemoOutput {
            message: task.message,
            task_id: ctx.task_id,
            retries: ctx.attempt_count,
            timestamp: self.clock.now(),
            status: "completed".to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDataTask {
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedData {
    pub original: serde_json::Value,
    pub processed_at: DateTime<Utc>,
    pub task_id: TaskId,
    pub retries: u32,
    pub status: String,
}

impl Task for ProcessDataTask {
    const NAME: &'static str = "tasks.example.process_data_task";
    type Output = ProcessedData;

    fn retry_config() -> RetryConfig {
        RetryConfig::new(5, 2.0, 120.0)
    }
}

pub struct ProcessDataHandler {
    failures: FailureInjector,
    work: Duration,
    clock: Arc<dyn Clock>,
}

impl ProcessDataHandler {
    pub fn new(failures: FailureInjector, work: Duration) -> Self {
        Self {
            failures,
            work,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for ProcessDataHandler {
    fn default() -> Self {
        Self::new(FailureInjector::new(0.2, 4), Duration::from_millis(200))
    }
}

#[async_trait]
impl Handler<ProcessDataTask> for ProcessDataHandler {
    async fn handle(
        &self,
        task: ProcessDataTask,
        ctx: TaskContext,
    ) -> Result<ProcessedData, TaskError> {
        tracing::info!(task_id = %ctx.task_id, data = %task.data, "processing data");
        tokio::time::sleep(self.work).await;

        if self.failures.should_fail(ctx.attempt_count) {
            return Err(TaskError::failed(format!(
                "data processing failed on attempt {}",
                ctx.attempt_count + 1
            )));
        }

        Ok(ProcessedData {
            original: task.data,
            processed_at: self.clock.now(),
            task_id: ctx.task_id,
            retries: ctx.attempt_count,
            status: "processed".to_string(),
        })
    }
}

/// Register both example tasks with their default behaviour.
pub fn register_examples(registry: &mut TaskRegistry) -> Result<(), RegistryError> {
    registry.register::<DemoTask, _>(DemoTaskHandler::default())?;
    registry.register::<ProcessDataTask, _>(ProcessDataHandler::default())?;
    Ok(())
}
