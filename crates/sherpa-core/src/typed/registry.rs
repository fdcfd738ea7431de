use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::Task;
use crate::error::ConfigError;
use crate::queue::RetryPolicy;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("handler for task '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("no handler registered for task '{0}'")]
    UnknownTask(String),

    #[error("task '{name}' has an invalid retry config: {source}")]
    InvalidRetry {
        name: String,
        #[source]
        source: ConfigError,
    },
}

struct Entry {
    handler: Arc<dyn DynHandler>,
    policy: RetryPolicy,
}

/// Task name to handler and retry policy.
///
/// Filled during startup, then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct TaskRegistry {
    entries: HashMap<&'static str, Entry>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `T`. The task's retry config is validated here,
    /// so a bad config fails at startup instead of on the first retry.
    pub fn register<T, H>(&mut self, handler: H) -> Result<(), RegistryError>
    where
        T: Task,
        H: Handler<T> + 'static,
    {
        if self.entries.contains_key(T::NAME) {
            return Err(RegistryError::AlreadyRegistered(T::NAME.to_string()));
        }
        let policy = T::retry_config()
            .validate()
            .map_err(|source| RegistryError::InvalidRetry {
                name: T::NAME.to_string(),
                source,
            })?;
        self.entries.insert(
            T::NAME,
            Entry {
                handler: Arc::new(TypedHandler::<T, H>::new(handler)),
                policy,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DynHandler>> {
        self.entries.get(name).map(|e| Arc::clone(&e.handler))
    }

    pub fn policy(&self, name: &str) -> Result<RetryPolicy, RegistryError> {
        self.entries
            .get(name)
            .map(|e| e.policy)
            .ok_or_else(|| RegistryError::UnknownTask(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn registered_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
