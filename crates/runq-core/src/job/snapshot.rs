use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::{Job, JobId};
use super::status::JobStatus;

/// Serializable point-in-time view of a job for reporting tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub queue: String,
    pub function: String,
    pub status: JobStatus,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            queue: job.queue.clone(),
            function: job.function.clone(),
            status: job.status,
            description: job.description.clone(),
            result: job.result.clone(),
            failure: job.failure.clone(),
            meta: job.meta.clone(),
            created_at: job.created_at,
            scheduled_for: job.scheduled_for,
            started_at: job.started_at,
            ended_at: job.ended_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobArgs;
    use serde_json::json;

    #[test]
    fn test_snapshot_json_shape() {
        let mut job = Job::new("q", "add", JobArgs::positional([3, 7]));
        job.mark_started(Utc::now()).unwrap();
        job.mark_finished(json!(10), Utc::now()).unwrap();

        let value = serde_json::to_value(JobSnapshot::from(&job)).unwrap();
        assert_eq!(value["status"], "finished");
        assert_eq!(value["queue"], "q");
        assert_eq!(value["result"], 10);
        assert!(value.get("failure").is_none());
        assert!(value["started_at"].is_string());
        assert_eq!(value["scheduled_for"], Value::Null);
    }

    #[test]
    fn test_snapshot_failure_text() {
        let mut job = Job::new("q", "explode", JobArgs::new());
        job.mark_started(Utc::now()).unwrap();
        job.mark_failed("boom", Utc::now()).unwrap();

        let snapshot = JobSnapshot::from(&job);
        let decoded: JobSnapshot =
            serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();
        assert_eq!(decoded.failure.as_deref(), Some("boom"));
        assert_eq!(decoded.status, JobStatus::Failed);
        assert!(decoded.result.is_none());
    }
}
