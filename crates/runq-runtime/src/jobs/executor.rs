use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use runq_core::job::{Job, JobContext, JobId};
use serde_json::Value;
use tokio::time::timeout;

use super::handlers::HandlerRegistry;
use super::registry::JobRegistry;

/// Runs claimed jobs and records their outcome in the registry.
pub struct JobExecutor {
    registry: JobRegistry,
    handlers: Arc<HandlerRegistry>,
    default_timeout: Option<Duration>,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        registry: JobRegistry,
        handlers: Arc<HandlerRegistry>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            handlers,
            default_timeout,
        }
    }

    /// Claim and execute a job that was just popped from a queue.
    ///
    /// Every failure of the work itself ends up as a failed job; nothing is
    /// propagated to the caller.
    pub async fn execute(&self, job_id: JobId, worker: &str) -> ExecutionResult {
        match self.registry.mark_started(job_id, Utc::now()) {
            Ok(job) => self.run(job, worker).await,
            Err(e) => ExecutionResult::Skipped {
                reason: e.to_string(),
            },
        }
    }

    /// Run a job that has already been claimed (status STARTED).
    pub async fn run(&self, job: Job, worker: &str) -> ExecutionResult {
        let job_id = job.id;
        if !job.is_started() {
            return ExecutionResult::Skipped {
                reason: format!("job {} is {}, not started", job_id, job.status),
            };
        }

        let entry = match self.handlers.get(&job.function) {
            Some(e) => e,
            None => {
                return self.fail(job_id, format!("Unknown function: {}", job.function));
            }
        };

        let started_at = job.started_at.unwrap_or_else(Utc::now);
        let ctx = JobContext::new(&job, worker, started_at);
        let limit = job.timeout.or(entry.timeout).or(self.default_timeout);

        // Building the future runs handler code too, so it needs its own guard.
        let fut = match panic::catch_unwind(AssertUnwindSafe(|| {
            (entry.handler)(ctx, job.args.clone())
        })) {
            Ok(fut) => fut,
            Err(panic) => {
                return self.fail(job_id, format!("Job panicked: {}", panic_message(&*panic)))
            }
        };
        let run = AssertUnwindSafe(fut).catch_unwind();

        let outcome = match limit {
            Some(limit) => match timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let error = format!("Job timed out after {:?}", limit);
                    self.record_failure(job_id, &error);
                    return ExecutionResult::TimedOut { after: limit };
                }
            },
            None => run.await,
        };

        match outcome {
            Ok(Ok(output)) => {
                if let Err(e) = self.registry.mark_finished(job_id, output.clone()) {
                    tracing::error!("Failed to mark job {} as finished: {}", job_id, e);
                }
                ExecutionResult::Completed { output }
            }
            Ok(Err(e)) => self.fail(job_id, e.to_string()),
            Err(panic) => self.fail(job_id, format!("Job panicked: {}", panic_message(&*panic))),
        }
    }

    fn fail(&self, job_id: JobId, error: String) -> ExecutionResult {
        self.record_failure(job_id, &error);
        ExecutionResult::Failed { error }
    }

    fn record_failure(&self, job_id: JobId, error: &str) {
        if let Err(e) = self.registry.mark_failed(job_id, error) {
            tracing::error!("Failed to mark job {} as failed: {}", job_id, e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum ExecutionResult {
    /// Job finished with a value.
    Completed { output: Value },
    /// Job failed.
    Failed { error: String },
    /// Job ran past its time limit and was failed.
    TimedOut { after: Duration },
    /// The job could not be claimed (it was not queued).
    Skipped { reason: String },
}

impl ExecutionResult {
    /// Check if execution was successful.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Check if the job ended up failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut { .. })
    }
}
