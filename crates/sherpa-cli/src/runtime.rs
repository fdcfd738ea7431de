//! Wires queue, executor, registry, client and workers into one process.

use std::sync::Arc;

use sherpa_core::ports::{SystemClock, UlidGenerator};
use sherpa_core::{
    Executor, InMemoryTaskQueue, TaskClient, TaskQueue, TaskRegistry, TracingObserver, WorkerGroup,
};

pub struct Runtime {
    pub client: TaskClient,
    queue: Arc<InMemoryTaskQueue>,
    workers: WorkerGroup,
}

impl Runtime {
    pub fn start(workers: usize, registry: TaskRegistry) -> Self {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let registry = Arc::new(registry);
        let executor = Arc::new(Executor::new(queue.clone(), Arc::new(TracingObserver)));

        let client = TaskClient::new(
            queue.clone(),
            Arc::clone(&registry),
            Arc::new(UlidGenerator::new(SystemClock)),
        );
        let workers = WorkerGroup::spawn(workers, queue.clone(), registry, executor);

        Self {
            client,
            queue,
            workers,
        }
    }

    pub async fn shutdown(self) {
        match self.queue.counts().await {
            Ok(counts) => tracing::info!(?counts, "shutting down"),
            Err(e) => tracing::warn!(error = %e, "could not read queue counts"),
        }
        self.queue.close();
        self.workers.shutdown_and_join().await;
    }
}
