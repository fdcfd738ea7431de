//! sherpa-core
//!
//! Retrying background task execution.
//!
//! # Modules
//! - **domain**: ids, invocations, outcome state machine, lifecycle events
//! - **queue**: retry policy, broker port, in-memory broker
//! - **executor**: runs one delivery and decides success, retry or failure
//! - **observer**: lifecycle hooks (tracing, recording, channel)
//! - **typed**: `Task` / `Handler<T>` API and the task registry
//! - **client** / **worker**: submission side and worker pool
//! - **tasks**: built-in example tasks

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod observer;
pub mod ports;
pub mod queue;
pub mod tasks;
pub mod typed;
pub mod worker;

pub use client::{TaskClient, TaskHandle};
pub use config::{AppConfig, LogFormat};
pub use domain::{EventKind, LifecycleEvent, TaskId, TaskInvocation, TaskOutcome};
pub use error::{ConfigError, ExecuteError, QueueError, SherpaError};
pub use executor::{Execution, Executor};
pub use observer::{Observer, TracingObserver};
pub use queue::{InMemoryTaskQueue, RetryConfig, RetryPolicy, RetryScheduler, TaskQueue, TaskResult};
pub use typed::{Handler, Task, TaskContext, TaskError, TaskRegistry};
pub use worker::WorkerGroup;
