use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::args::JobArgs;
use super::status::JobStatus;
use crate::error::{Result, RunqError};

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = RunqError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| RunqError::InvalidArgument(format!("invalid job id '{}': {}", s, e)))
    }
}

/// A job: what to run plus where it is in its lifecycle.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job ID.
    pub id: JobId,
    /// Registered function name to invoke.
    pub function: String,
    /// Arguments for the function.
    pub args: JobArgs,
    /// Queue this job belongs to.
    pub queue: String,
    /// Human readable description (defaults to the function name).
    pub description: String,
    /// Current status.
    pub status: JobStatus,
    /// Value produced by the work. Set only when finished.
    pub result: Option<Value>,
    /// Failure text. Set only when failed.
    pub failure: Option<String>,
    /// Execution time limit, overriding handler and worker defaults.
    pub timeout: Option<Duration>,
    /// Free-form metadata attached by the caller.
    pub meta: Map<String, Value>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When a scheduled job becomes due.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// When a worker claimed the job.
    pub started_at: Option<DateTime<Utc>>,
    /// When execution ended.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(queue: impl Into<String>, function: impl Into<String>, args: JobArgs) -> Self {
        let function = function.into();
        Self {
            id: JobId::new(),
            description: function.clone(),
            function,
            args,
            queue: queue.into(),
            status: JobStatus::Queued,
            result: None,
            failure: None,
            timeout: None,
            meta: Map::new(),
            created_at: Utc::now(),
            scheduled_for: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Use a caller supplied ID.
    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replace the keyword arguments.
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.args.kwargs = kwargs;
        self
    }

    /// Set an execution time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Defer the job until `due`. A due time that is not in the future leaves the
    /// job queued.
    pub fn scheduled_for(mut self, due: DateTime<Utc>) -> Self {
        if due > Utc::now() {
            self.status = JobStatus::Scheduled;
            self.scheduled_for = Some(due);
        }
        self
    }

    /// Waiting for its due time.
    pub fn is_scheduled(&self) -> bool {
        self.status == JobStatus::Scheduled
    }

    /// Pending in its queue.
    pub fn is_queued(&self) -> bool {
        self.status == JobStatus::Queued
    }

    /// Claimed by a worker and running.
    pub fn is_started(&self) -> bool {
        self.status == JobStatus::Started
    }

    /// Completed with a result.
    pub fn is_finished(&self) -> bool {
        self.status == JobStatus::Finished
    }

    /// Completed with a failure detail.
    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    /// Finished or failed.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Scheduled -> queued, performed when the due time has passed.
    pub fn mark_queued(&mut self) -> Result<()> {
        self.transition(JobStatus::Queued)
    }

    /// Queued -> started, performed by the claiming worker.
    pub fn mark_started(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Started)?;
        self.started_at = Some(at);
        Ok(())
    }

    /// Started -> finished with the produced value.
    pub fn mark_finished(&mut self, result: Value, at: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Finished)?;
        self.result = Some(result);
        self.ended_at = Some(at);
        Ok(())
    }

    /// Started -> failed with the captured failure text.
    pub fn mark_failed(&mut self, detail: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        let detail = detail.into();
        // Failed jobs always carry a non-empty detail.
        self.failure = Some(if detail.is_empty() {
            "job failed without detail".to_string()
        } else {
            detail
        });
        self.ended_at = Some(at);
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RunqError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Optional settings applied to a job at enqueue time.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Caller supplied job ID.
    pub id: Option<JobId>,
    /// Description (defaults to the function name).
    pub description: Option<String>,
    /// Execution time limit.
    pub timeout: Option<Duration>,
    /// Metadata entries.
    pub meta: Map<String, Value>,
}

impl EnqueueOptions {
    /// Options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller supplied ID.
    pub fn id(mut self, id: JobId) -> Self {
        self.id = Some(id);
        self
    }

    /// Override the description (defaults to the function name).
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set an execution time limit.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Apply these options to a freshly built job.
    pub fn apply(self, mut job: Job) -> Job {
        if let Some(id) = self.id {
            job.id = id;
        }
        if let Some(description) = self.description {
            job.description = description;
        }
        if self.timeout.is_some() {
            job.timeout = self.timeout;
        }
        job.meta.extend(self.meta);
        job
    }
}
