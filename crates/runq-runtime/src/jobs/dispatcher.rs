use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use runq_core::job::{EnqueueOptions, JobArgs, JobId, Task};
use runq_core::Result;
use serde::Serialize;

use super::queue::JobQueue;
use super::registry::JobRegistry;

/// Owns the named queues of an engine and routes new jobs to them.
///
/// Queues are created on first use and live as long as the dispatcher.
#[derive(Clone)]
pub struct JobDispatcher {
    registry: JobRegistry,
    queues: Arc<RwLock<BTreeMap<String, Arc<JobQueue>>>>,
}

impl JobDispatcher {
    /// Create a new job dispatcher.
    pub fn new(registry: JobRegistry) -> Self {
        Self {
            registry,
            queues: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// The shared job registry.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Get the queue called `name`, creating it if needed.
    pub fn queue(&self, name: &str) -> Arc<JobQueue> {
        if let Some(queue) = self.get_queue(name) {
            return queue;
        }

        let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(queue = %name, "Queue created");
                Arc::new(JobQueue::new(name, self.registry.clone()))
            })
            .clone()
    }

    /// Get an existing queue.
    pub fn get_queue(&self, name: &str) -> Option<Arc<JobQueue>> {
        self.queues
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// All queues, ordered by name.
    pub fn queues(&self) -> Vec<Arc<JobQueue>> {
        self.queues
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Enqueue a call to `function` on `queue`.
    pub fn enqueue(
        &self,
        queue: &str,
        function: impl Into<String>,
        args: JobArgs,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        self.queue(queue).enqueue_call(function, args, options)
    }

    /// Enqueue a call that becomes ready after `delay`.
    pub fn enqueue_in(
        &self,
        queue: &str,
        delay: Duration,
        function: impl Into<String>,
        args: JobArgs,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        self.queue(queue).enqueue_in(delay, function, args, options)
    }

    /// Enqueue a call that becomes ready at `due`.
    pub fn enqueue_at(
        &self,
        queue: &str,
        due: DateTime<Utc>,
        function: impl Into<String>,
        args: JobArgs,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        self.queue(queue).enqueue_at(due, function, args, options)
    }

    /// Enqueue a typed task. Its default timeout is applied by the handler
    /// registry when the job runs.
    pub fn dispatch<T: Task>(
        &self,
        queue: &str,
        args: T::Args,
        options: EnqueueOptions,
    ) -> Result<JobId>
    where
        T::Args: Serialize,
    {
        self.enqueue(queue, T::info().name, JobArgs::encode(&args)?, options)
    }

    /// Promote due scheduled jobs on every queue.
    pub fn promote_due(&self, now: DateTime<Utc>) -> Vec<JobId> {
        self.queues()
            .iter()
            .flat_map(|queue| queue.promote_due(now))
            .collect()
    }
}
