use std::marker::PhantomData;

use async_trait::async_trait;
use thiserror::Error;

use super::task::{Task, TaskContext};

/// Why a handler run failed. Every variant counts as a failed attempt and
/// goes through the retry policy.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("payload decode: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("output encode: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    pub fn failed(cause: impl Into<String>) -> Self {
        TaskError::Failed(cause.into())
    }
}

/// Runs one task type.
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T, ctx: TaskContext) -> Result<T::Output, TaskError>;
}

/// Object-safe handler over JSON payloads, so handlers for different task
/// types can share one map.
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: TaskContext,
    ) -> Result<serde_json::Value, TaskError>;

    fn task_name(&self) -> &'static str;
}

/// Adapter from `Handler<T>` to `DynHandler`.
pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: TaskContext,
    ) -> Result<serde_json::Value, TaskError> {
        let task: T = serde_json::from_value(payload).map_err(TaskError::Decode)?;
        let output = self.handler.handle(task, ctx).await?;
        serde_json::to_value(output).map_err(TaskError::Encode)
    }

    fn task_name(&self) -> &'static str {
        T::NAME
    }
}
