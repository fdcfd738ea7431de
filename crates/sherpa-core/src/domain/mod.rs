//! Domain model (ids, invocations, outcomes, lifecycle events).

pub mod events;
pub mod ids;
pub mod invocation;
pub mod outcome;

pub use events::{EventKind, LifecycleEvent};
pub use ids::TaskId;
pub use invocation::TaskInvocation;
pub use outcome::{InvalidTransition, TaskOutcome};
