use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::record::{Job, JobId};

/// Context available to job handlers.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID.
    pub job_id: JobId,
    /// Registered function name.
    pub function: String,
    /// Queue the job was claimed from.
    pub queue: String,
    /// Name of the worker running the job.
    pub worker: String,
    /// When the worker claimed the job.
    pub started_at: DateTime<Utc>,
    meta: Map<String, Value>,
}

impl JobContext {
    /// Create a context for a claimed job.
    pub fn new(job: &Job, worker: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id,
            function: job.function.clone(),
            queue: job.queue.clone(),
            worker: worker.into(),
            started_at,
            meta: job.meta.clone(),
        }
    }

    /// Read a metadata entry attached at enqueue time.
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }
}
