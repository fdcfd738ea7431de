//! Observers: receivers of lifecycle events.
//!
//! Observers are shared across every in-flight invocation, so they must be
//! `Send + Sync` and must not block the caller.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::domain::{EventKind, LifecycleEvent};

/// Lifecycle hooks supplied by the caller of the executor.
///
/// Each hook defaults to a no-op so an observer only implements what it
/// cares about.
pub trait Observer: Send + Sync {
    fn on_started(&self, _event: &LifecycleEvent) {}
    fn on_retrying(&self, _event: &LifecycleEvent) {}
    fn on_succeeded(&self, _event: &LifecycleEvent) {}
    fn on_failed(&self, _event: &LifecycleEvent) {}
}

/// Route an event to the hook matching its kind.
pub fn dispatch(observer: &dyn Observer, event: &LifecycleEvent) {
    match event.kind {
        EventKind::Started => observer.on_started(event),
        EventKind::Retrying => observer.on_retrying(event),
        EventKind::Succeeded => observer.on_succeeded(event),
        EventKind::Failed => observer.on_failed(event),
    }
}

/// Emits every event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_started(&self, event: &LifecycleEvent) {
        tracing::info!(
            task_id = %event.task_id,
            task_name = %event.task_name,
            attempt = event.attempt_count,
            "task {} started",
            event.task_name
        );
    }

    fn on_retrying(&self, event: &LifecycleEvent) {
        tracing::warn!(
            task_id = %event.task_id,
            task_name = %event.task_name,
            retries = event.attempt_count,
            max_retries = event.max_retries,
            delay_secs = event.delay.map(|d| d.as_secs_f64()).unwrap_or_default(),
            cause = event.cause.as_deref().unwrap_or_default(),
            "task {} retry {}/{}",
            event.task_name,
            event.attempt_count,
            event.max_retries
        );
    }

    fn on_succeeded(&self, event: &LifecycleEvent) {
        tracing::info!(
            task_id = %event.task_id,
            task_name = %event.task_name,
            retries = event.attempt_count,
            "task {} completed successfully",
            event.task_name
        );
    }

    fn on_failed(&self, event: &LifecycleEvent) {
        tracing::error!(
            task_id = %event.task_id,
            task_name = %event.task_name,
            retries = event.attempt_count,
            cause = event.cause.as_deref().unwrap_or_default(),
            "task {} failed after {} retries",
            event.task_name,
            event.attempt_count
        );
    }
}

/// Keeps every event in memory, for inspecting the event stream after a run.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: &LifecycleEvent) {
        // A poisoned lock still holds valid events.
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push(event.clone());
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }
}

impl Observer for RecordingObserver {
    fn on_started(&self, event: &LifecycleEvent) {
        self.record(event);
    }

    fn on_retrying(&self, event: &LifecycleEvent) {
        self.record(event);
    }

    fn on_succeeded(&self, event: &LifecycleEvent) {
        self.record(event);
    }

    fn on_failed(&self, event: &LifecycleEvent) {
        self.record(event);
    }
}

/// Forwards events into an unbounded channel. Sending never blocks; events
/// are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: &LifecycleEvent) {
        // ignore send error: the receiver may already be dropped
        let _ = self.tx.send(event.clone());
    }
}

impl Observer for ChannelObserver {
    fn on_started(&self, event: &LifecycleEvent) {
        self.forward(event);
    }

    fn on_retrying(&self, event: &LifecycleEvent) {
        self.forward(event);
    }

    fn on_succeeded(&self, event: &LifecycleEvent) {
        self.forward(event);
    }

    fn on_failed(&self, event: &LifecycleEvent) {
        self.forward(event);
    }
}

/// Fans one event out to several observers, in order.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn Observer>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl Observer for ObserverSet {
    fn on_started(&self, event: &LifecycleEvent) {
        self.observers.iter().for_each(|o| o.on_started(event));
    }

    fn on_retrying(&self, event: &LifecycleEvent) {
        self.observers.iter().for_each(|o| o.on_retrying(event));
    }

    fn on_succeeded(&self, event: &LifecycleEvent) {
        self.observers.iter().for_each(|o| o.on_succeeded(event));
    }

    fn on_failed(&self, event: &LifecycleEvent) {
        self.observers.iter().for_each(|o| o.on_failed(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskInvocation};
    use crate::queue::RetryPolicy;
    use chrono::Utc;
    use std::time::Duration;
    use ulid::Ulid;

    fn invocation() -> TaskInvocation {
        TaskInvocation::new(
            TaskId::from_ulid(Ulid::new()),
            "t",
            serde_json::Value::Null,
            RetryPolicy::default(),
        )
    }

    #[test]
    fn dispatch_routes_by_kind() {
        let rec = RecordingObserver::new();
        let inv = invocation();
        dispatch(&rec, &LifecycleEvent::started(&inv, Utc::now()));
        dispatch(
            &rec,
            &LifecycleEvent::retrying(&inv, Duration::from_secs(1), "x", Utc::now()),
        );
        dispatch(&rec, &LifecycleEvent::failed(&inv, "x", Utc::now()));
        assert_eq!(
            rec.kinds(),
            vec![EventKind::Started, EventKind::Retrying, EventKind::Failed]
        );
    }

    #[tokio::test]
    async fn channel_observer_forwards_without_blocking() {
        let (obs, mut rx) = ChannelObserver::new();
        let inv = invocation();
        dispatch(&obs, &LifecycleEvent::succeeded(&inv, Utc::now()));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::Succeeded);
        assert_eq!(ev.task_id, inv.task_id());

        drop(rx);
        // receiver gone: must not panic
        dispatch(&obs, &LifecycleEvent::started(&inv, Utc::now()));
    }

    #[test]
    fn observer_set_fans_out() {
        let a = Arc::new(RecordingObserver::new());
        let b = Arc::new(RecordingObserver::new());
        let set = ObserverSet::new().with(a.clone()).with(b.clone());
        assert_eq!(set.len(), 2);

        dispatch(&set, &LifecycleEvent::started(&invocation(), Utc::now()));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }

    #[test]
    fn default_hooks_are_noops() {
        struct OnlyFailures(Mutex<u32>);
        impl Observer for OnlyFailures {
            fn on_failed(&self, _event: &LifecycleEvent) {
                *self.0.lock().unwrap() += 1;
            }
        }
        let obs = OnlyFailures(Mutex::new(0));
        let inv = invocation();
        dispatch(&obs, &LifecycleEvent::started(&inv, Utc::now()));
        dispatch(&obs, &LifecycleEvent::failed(&inv, "x", Utc::now()));
        assert_eq!(*obs.0.lock().unwrap(), 1);
    }
}
