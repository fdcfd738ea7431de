//! Typed task API.
//!
//! Two layers:
//! - **typed**: [`Task`] and [`Handler<T>`], checked at compile time.
//! - **dyn**: [`DynHandler`], object-safe, keyed by task name in the registry.

mod handler;
mod registry;
mod task;

pub use handler::{DynHandler, Handler, TaskError, TypedHandler};
pub use registry::{RegistryError, TaskRegistry};
pub use task::{Task, TaskContext};
