//! The `Runq` engine.
//!
//! Owns the job registry, the named queues, the handler registry and the
//! scheduler. Workers are created from the engine and share its state.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use runq_core::config::RunqConfig;
use runq_core::error::{Result, RunqError};
use runq_core::job::{
    EnqueueOptions, Job, JobArgs, JobContext, JobId, JobSnapshot, JobStatus, Task,
};
use runq_runtime::jobs::{
    HandlerRegistry, JobDispatcher, JobQueue, JobRegistry, Worker, WorkerConfig,
};
use runq_runtime::scheduler::{Scheduler, SchedulerConfig};

/// Prelude module for common imports.
pub mod prelude {
    pub use chrono::{DateTime, Utc};
    pub use serde_json::{json, Map, Value};
    pub use uuid::Uuid;

    pub use runq_core::config::RunqConfig;
    pub use runq_core::error::{Result, RunqError};
    pub use runq_core::job::{
        EnqueueOptions, Job, JobArgs, JobContext, JobId, JobSnapshot, JobStatus, Task, TaskInfo,
    };
    pub use runq_runtime::jobs::{Worker, WorkerConfig, WorkerHandle, WorkerMode, WorkerStats};

    pub use crate::{Runq, RunqBuilder};
}

/// An in-process job queue engine.
pub struct Runq {
    config: RunqConfig,
    handlers: Arc<HandlerRegistry>,
    dispatcher: JobDispatcher,
    scheduler: Scheduler,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl Runq {
    /// Create a new builder for configuring the engine.
    pub fn builder() -> RunqBuilder {
        RunqBuilder::new()
    }

    /// Get the configuration.
    pub fn config(&self) -> &RunqConfig {
        &self.config
    }

    /// Get the job registry.
    pub fn registry(&self) -> &JobRegistry {
        self.dispatcher.registry()
    }

    /// Get the handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Get the dispatcher that owns the queues.
    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    /// Get the queue called `name`, creating it if needed.
    pub fn queue(&self, name: &str) -> Arc<JobQueue> {
        self.dispatcher.queue(name)
    }

    /// Enqueue a call to `function` with positional and keyword arguments.
    pub fn enqueue(
        &self,
        queue: &str,
        function: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        description: Option<&str>,
    ) -> Result<JobId> {
        let mut options = EnqueueOptions::new();
        if let Some(description) = description {
            options = options.description(description);
        }
        self.enqueue_with(queue, function, call_args(args, kwargs), options)
    }

    /// Enqueue a call with full control over its options.
    pub fn enqueue_with(
        &self,
        queue: &str,
        function: &str,
        args: JobArgs,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        self.warn_if_unknown(function);
        self.dispatcher.enqueue(queue, function, args, options)
    }

    /// Enqueue a call that becomes ready once `delay` has elapsed.
    pub fn enqueue_in(
        &self,
        queue: &str,
        delay: Duration,
        function: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<JobId> {
        self.warn_if_unknown(function);
        self.dispatcher.enqueue_in(
            queue,
            delay,
            function,
            call_args(args, kwargs),
            EnqueueOptions::new(),
        )
    }

    /// Enqueue a call that becomes ready at `due`.
    pub fn enqueue_at(
        &self,
        queue: &str,
        due: DateTime<Utc>,
        function: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<JobId> {
        self.warn_if_unknown(function);
        self.dispatcher.enqueue_at(
            queue,
            due,
            function,
            call_args(args, kwargs),
            EnqueueOptions::new(),
        )
    }

    /// Enqueue a typed task.
    pub fn dispatch<T: Task>(&self, queue: &str, args: T::Args) -> Result<JobId>
    where
        T::Args: Serialize,
    {
        self.dispatcher
            .dispatch::<T>(queue, args, EnqueueOptions::new())
    }

    fn warn_if_unknown(&self, function: &str) {
        // Still enqueued: the job fails when a worker picks it up.
        if !self.handlers.exists(function) {
            tracing::warn!(function = %function, "Enqueueing job for unregistered function");
        }
    }

    /// Get a copy of a job.
    pub fn fetch(&self, id: JobId) -> Option<Job> {
        self.registry().get(id)
    }

    /// Get a serializable snapshot of a job.
    pub fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.fetch(id).map(|job| JobSnapshot::from(&job))
    }

    /// Get the current status of a job.
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.registry().status(id)
    }

    /// Number of pending jobs in `queue`. Unknown queues are empty.
    pub fn count(&self, queue: &str) -> usize {
        self.dispatcher
            .get_queue(queue)
            .map(|q| q.count())
            .unwrap_or(0)
    }

    /// Wait for a job's result. See [`JobRegistry::wait_for`].
    pub async fn get_result(&self, id: JobId, timeout: Option<Duration>) -> Result<Value> {
        self.registry().wait_for(id, timeout).await
    }

    /// Create a worker polling `queues` in priority order, configured from the
    /// engine's `[worker]` section.
    pub fn worker(&self, queues: &[&str]) -> Worker {
        self.worker_with(queues, WorkerConfig::from(&self.config.worker))
    }

    /// Create a worker with an explicit configuration.
    ///
    /// The worker's stop flag is a child of the engine's, so `shutdown` stops
    /// it. Workers created after `shutdown` start out stopped.
    pub fn worker_with(&self, queues: &[&str], config: WorkerConfig) -> Worker {
        let queues = queues.iter().map(|name| self.queue(name)).collect();
        Worker::new(
            queues,
            self.registry().clone(),
            self.handlers.clone(),
            config,
        )
        .with_parent(&self.shutdown)
    }

    /// Start the scheduler on a background task. Calling it again while it
    /// runs has no effect. Must be called from within a tokio runtime.
    pub fn start_scheduler(&self) {
        let mut task = self.scheduler_task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let scheduler = self.scheduler.clone();
        *task = Some(tokio::spawn(async move { scheduler.run().await }));
    }

    /// Promote due scheduled jobs once, without a background scheduler.
    pub fn promote_due(&self) -> Vec<JobId> {
        self.scheduler.tick()
    }

    /// Stop the scheduler and every worker created from this engine.
    ///
    /// Running job bodies are not interrupted. Jobs that were never claimed
    /// stay in their queues.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down");

        self.scheduler.stop();
        self.shutdown.cancel();

        let task = self
            .scheduler_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            let limit = self.config.worker.stop_timeout();
            match tokio::time::timeout(limit, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Scheduler task failed"),
                Err(_) => tracing::warn!("Scheduler did not stop within {:?}", limit),
            }
        }
    }
}

fn call_args(args: Vec<Value>, kwargs: Map<String, Value>) -> JobArgs {
    JobArgs::positional(args).with_kwargs(kwargs)
}

/// Builder for configuring the engine.
pub struct RunqBuilder {
    config: Option<RunqConfig>,
    handlers: HandlerRegistry,
}

impl RunqBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            handlers: HandlerRegistry::new(),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: RunqConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register a typed task.
    pub fn register<T: Task>(mut self) -> Self {
        self.handlers.register::<T>();
        self
    }

    /// Register an async closure under `name`.
    pub fn register_fn<F, Fut, O>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(JobContext, JobArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Serialize,
    {
        self.handlers.register_fn(name, f);
        self
    }

    /// Get the handler registry mutably.
    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// Build the engine.
    pub fn build(self) -> Result<Runq> {
        let config = self.config.unwrap_or_default();

        if config.scheduler.poll_interval_ms == 0 {
            return Err(RunqError::Config(
                "scheduler.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if config.worker.poll_interval_ms == 0 {
            return Err(RunqError::Config(
                "worker.poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        let dispatcher = JobDispatcher::new(JobRegistry::new());
        let scheduler = Scheduler::new(
            dispatcher.clone(),
            SchedulerConfig::from(&config.scheduler),
        );

        tracing::debug!(handlers = self.handlers.len(), "Engine built");

        Ok(Runq {
            config,
            handlers: Arc::new(self.handlers),
            dispatcher,
            scheduler,
            scheduler_task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }
}

impl Default for RunqBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runq_runtime::jobs::WorkerMode;
    use serde_json::json;

    fn engine() -> Runq {
        Runq::builder()
            .register_fn("add", |_ctx, args: JobArgs| async move {
                let (a, b): (i64, i64) = args.decode()?;
                Ok::<_, RunqError>(a + b)
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_default() {
        let runq = Runq::builder().build().unwrap();
        assert!(runq.handlers().is_empty());
        assert_eq!(runq.config().scheduler.poll_interval_ms, 100);
    }

    #[test]
    fn test_builder_rejects_zero_intervals() {
        let mut config = RunqConfig::default();
        config.worker.poll_interval_ms = 0;
        let err = Runq::builder().config(config).build().err().unwrap();
        assert!(matches!(err, RunqError::Config(_)));
    }

    #[test]
    fn test_enqueue_sets_description() {
        let runq = engine();
        let plain = runq
            .enqueue("q", "add", vec![json!(1), json!(2)], Map::new(), None)
            .unwrap();
        let described = runq
            .enqueue("q", "add", vec![], Map::new(), Some("nightly sum"))
            .unwrap();

        assert_eq!(runq.fetch(plain).unwrap().description, "add");
        assert_eq!(runq.fetch(described).unwrap().description, "nightly sum");
        assert_eq!(runq.count("q"), 2);
        assert_eq!(runq.count("missing"), 0);
    }

    #[test]
    fn test_fetch_unknown_is_none() {
        let runq = engine();
        assert!(runq.fetch(JobId::new()).is_none());
        assert!(runq.snapshot(JobId::new()).is_none());
    }

    #[test]
    fn test_enqueue_unknown_function_still_enqueues() {
        let runq = engine();
        let id = runq
            .enqueue("q", "nope", vec![], Map::new(), None)
            .unwrap();
        assert_eq!(runq.status(id), Some(JobStatus::Queued));
    }

    #[tokio::test]
    async fn test_worker_runs_engine_jobs() {
        let runq = engine();
        let id = runq
            .enqueue("q", "add", vec![json!(2), json!(2)], Map::new(), None)
            .unwrap();

        runq.worker(&["q"]).start(WorkerMode::Burst).await;

        let snapshot = runq.snapshot(id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Finished);
        assert_eq!(snapshot.result, Some(json!(4)));
    }

    #[tokio::test]
    async fn test_start_scheduler_is_idempotent() {
        let runq = engine();
        runq.start_scheduler();
        runq.start_scheduler();
        runq.shutdown().await;
        assert!(runq.scheduler_task.lock().unwrap().is_none());
    }

    #[test]
    fn test_engine_does_not_retain_workers() {
        let runq = engine();
        let queue = runq.queue("q");
        let baseline = Arc::strong_count(&queue);

        for _ in 0..10 {
            drop(runq.worker(&["q"]));
        }
        assert_eq!(Arc::strong_count(&queue), baseline);
    }

    #[tokio::test]
    async fn test_worker_after_shutdown_is_stopped() {
        let runq = engine();
        runq.shutdown().await;
        assert!(runq.worker(&["q"]).is_stopped());
    }

    #[tokio::test]
    async fn test_shutdown_stops_workers() {
        let runq = engine();
        let handle = runq.worker(&["q"]).spawn(WorkerMode::Continuous);
        runq.shutdown().await;
        assert!(handle.worker().is_stopped());
        handle.join(Duration::from_secs(1)).await.unwrap();
    }
}
