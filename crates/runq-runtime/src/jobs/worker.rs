use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use runq_core::job::{Job, JobId};
use runq_core::{Result, RunqError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::executor::{ExecutionResult, JobExecutor};
use super::handlers::HandlerRegistry;
use super::queue::JobQueue;
use super::registry::JobRegistry;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker name (auto-generated if not provided).
    pub name: Option<String>,
    /// Idle backoff when every queue is empty.
    pub poll_interval: Duration,
    /// Time limit for jobs that set none themselves.
    pub job_timeout: Option<Duration>,
    /// How long `WorkerHandle::shutdown` waits for the loop to exit.
    pub stop_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: None,
            poll_interval: Duration::from_millis(100),
            job_timeout: None,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&runq_core::config::WorkerConfig> for WorkerConfig {
    fn from(config: &runq_core::config::WorkerConfig) -> Self {
        Self {
            name: None,
            poll_interval: config.poll_interval(),
            job_timeout: config.job_timeout(),
            stop_timeout: config.stop_timeout(),
        }
    }
}

/// How long a worker keeps polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Return once every assigned queue is empty.
    Burst,
    /// Poll until stopped.
    Continuous,
}

/// Counters for one worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs claimed and executed.
    pub processed: u64,
    /// Jobs that finished.
    pub finished: u64,
    /// Jobs that failed or timed out.
    pub failed: u64,
}

impl WorkerStats {
    fn record(&mut self, result: &ExecutionResult) {
        match result {
            ExecutionResult::Completed { .. } => {
                self.processed += 1;
                self.finished += 1;
            }
            ExecutionResult::Failed { .. } | ExecutionResult::TimedOut { .. } => {
                self.processed += 1;
                self.failed += 1;
            }
            ExecutionResult::Skipped { .. } => {}
        }
    }
}

/// Polls an ordered list of queues and runs what it claims, one job at a time.
///
/// The first queue is always checked before the next, so earlier queues have
/// priority. Clones share the same stop flag. A stopped worker cannot be
/// restarted.
#[derive(Clone)]
pub struct Worker {
    name: String,
    queues: Vec<Arc<JobQueue>>,
    executor: Arc<JobExecutor>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl Worker {
    /// Create a new worker.
    pub fn new(
        queues: Vec<Arc<JobQueue>>,
        registry: JobRegistry,
        handlers: Arc<HandlerRegistry>,
        config: WorkerConfig,
    ) -> Self {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));
        let executor = Arc::new(JobExecutor::new(registry, handlers, config.job_timeout));

        Self {
            name,
            queues,
            executor,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie this worker's stop flag to `parent`: cancelling the parent stops
    /// the worker, stopping the worker leaves the parent alone.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = parent.child_token();
        self
    }

    /// Get worker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the polled queues, in priority order.
    pub fn queue_names(&self) -> Vec<&str> {
        self.queues.iter().map(|q| q.name()).collect()
    }

    /// Whether `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run the polling loop until it ends according to `mode` or `stop` is called.
    pub async fn start(&self, mode: WorkerMode) -> WorkerStats {
        let mut stats = WorkerStats::default();

        tracing::info!(
            worker = %self.name,
            queues = ?self.queue_names(),
            mode = ?mode,
            "Worker started"
        );

        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!(worker = %self.name, "Worker shutting down");
                break;
            }

            if let Some(job) = self.claim() {
                let job_id = job.id;
                let queue = job.queue.clone();
                tracing::debug!(worker = %self.name, job_id = %job_id, queue = %queue, "Processing job");

                let result = self.executor.run(job, &self.name).await;
                log_result(&self.name, &queue, job_id, &result);
                stats.record(&result);
                continue;
            }

            if mode == WorkerMode::Burst {
                break;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(
            worker = %self.name,
            processed = stats.processed,
            finished = stats.finished,
            failed = stats.failed,
            "Worker stopped"
        );

        stats
    }

    /// Run the loop on a background task.
    pub fn spawn(&self, mode: WorkerMode) -> WorkerHandle {
        let worker = self.clone();
        let task = tokio::spawn(async move { worker.start(mode).await });

        WorkerHandle {
            worker: self.clone(),
            task,
        }
    }

    /// Request a cooperative stop. A job already running finishes first.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    fn claim(&self) -> Option<Job> {
        let now = Utc::now();
        self.queues.iter().find_map(|q| q.claim_next(now))
    }
}

fn log_result(worker: &str, queue: &str, job_id: JobId, result: &ExecutionResult) {
    match result {
        ExecutionResult::Completed { .. } => {
            tracing::info!(worker = %worker, job_id = %job_id, queue = %queue, "Job finished");
        }
        ExecutionResult::Failed { error } => {
            tracing::warn!(
                worker = %worker,
                job_id = %job_id,
                queue = %queue,
                error = %error,
                "Job failed"
            );
        }
        ExecutionResult::TimedOut { after } => {
            tracing::warn!(
                worker = %worker,
                job_id = %job_id,
                queue = %queue,
                after = ?after,
                "Job timed out"
            );
        }
        ExecutionResult::Skipped { reason } => {
            tracing::error!(
                worker = %worker,
                job_id = %job_id,
                queue = %queue,
                reason = %reason,
                "Claimed job could not be started"
            );
        }
    }
}

/// Handle to a worker running on a background task.
pub struct WorkerHandle {
    worker: Worker,
    task: JoinHandle<WorkerStats>,
}

impl WorkerHandle {
    /// The running worker.
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Request a cooperative stop.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Check if the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit, up to `limit`.
    pub async fn join(self, limit: Duration) -> Result<WorkerStats> {
        match tokio::time::timeout(limit, self.task).await {
            Ok(Ok(stats)) => Ok(stats),
            Ok(Err(e)) => Err(RunqError::Internal(format!("worker task failed: {}", e))),
            Err(_) => Err(RunqError::Timeout(limit)),
        }
    }

    /// Stop the worker and wait up to the configured stop timeout.
    pub async fn shutdown(self) -> Result<WorkerStats> {
        self.stop();
        let limit = self.worker.config.stop_timeout;
        self.join(limit).await
    }
}
