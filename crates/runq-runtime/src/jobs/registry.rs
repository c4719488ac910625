use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use runq_core::job::{Job, JobId, JobStatus};
use runq_core::{Result, RunqError};
use serde_json::Value;
use tokio::sync::watch;

/// A stored job plus the channel that announces its status changes.
struct JobEntry {
    job: Job,
    seq: u64,
    status_tx: watch::Sender<JobStatus>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, JobEntry>,
    next_seq: u64,
}

/// Shared store of every job known to an engine, keyed by job ID.
///
/// This is the only place job state lives. Status changes go through the
/// `mark_*` methods, which enforce the forward-only state machine and wake
/// anyone waiting in [`wait_for`](Self::wait_for).
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl JobRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new job. IDs must be unique.
    pub fn insert(&self, job: Job) -> Result<JobId> {
        let mut inner = self.write();
        let id = job.id;
        if inner.jobs.contains_key(&id) {
            return Err(RunqError::InvalidArgument(format!(
                "job {} is already registered",
                id
            )));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let (status_tx, _) = watch::channel(job.status);
        inner.jobs.insert(id, JobEntry { job, seq, status_tx });
        Ok(id)
    }

    /// Get a copy of a job.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.read().jobs.get(&id).map(|e| e.job.clone())
    }

    /// Get the current status of a job.
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.read().jobs.get(&id).map(|e| e.job.status)
    }

    /// Check if a job exists.
    pub fn contains(&self, id: JobId) -> bool {
        self.read().jobs.contains_key(&id)
    }

    /// Number of stored jobs.
    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.read().jobs.is_empty()
    }

    /// Every job ever enqueued to `queue`, oldest first.
    pub fn jobs_in_queue(&self, queue: &str) -> Vec<Job> {
        let inner = self.read();
        let mut entries: Vec<&JobEntry> = inner
            .jobs
            .values()
            .filter(|e| e.job.queue == queue)
            .collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.job.clone()).collect()
    }

    /// Scheduled -> queued.
    pub fn mark_queued(&self, id: JobId) -> Result<Job> {
        self.update(id, |job| job.mark_queued())
    }

    /// Queued -> started.
    pub fn mark_started(&self, id: JobId, at: DateTime<Utc>) -> Result<Job> {
        self.update(id, |job| job.mark_started(at))
    }

    /// Started -> finished.
    pub fn mark_finished(&self, id: JobId, result: Value) -> Result<Job> {
        self.update(id, |job| job.mark_finished(result, Utc::now()))
    }

    /// Started -> failed.
    pub fn mark_failed(&self, id: JobId, detail: impl Into<String>) -> Result<Job> {
        let detail = detail.into();
        self.update(id, |job| job.mark_failed(detail, Utc::now()))
    }

    fn update<F>(&self, id: JobId, apply: F) -> Result<Job>
    where
        F: FnOnce(&mut Job) -> Result<()>,
    {
        let mut inner = self.write();
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| RunqError::NotFound(format!("job {}", id)))?;

        apply(&mut entry.job)?;
        entry.status_tx.send_replace(entry.job.status);
        Ok(entry.job.clone())
    }

    /// Subscribe to status changes of a job.
    pub fn subscribe(&self, id: JobId) -> Option<watch::Receiver<JobStatus>> {
        self.read().jobs.get(&id).map(|e| e.status_tx.subscribe())
    }

    /// Wait until the job finishes or fails.
    ///
    /// Returns the result on success, `JobFailed` with the failure detail,
    /// `Timeout` when `timeout` elapses first (the job keeps running) and
    /// `NotFound` for unknown IDs.
    pub async fn wait_for(&self, id: JobId, timeout: Option<Duration>) -> Result<Value> {
        let mut rx = self
            .subscribe(id)
            .ok_or_else(|| RunqError::NotFound(format!("job {}", id)))?;

        let settled = async move {
            loop {
                let done = rx.borrow_and_update().is_terminal();
                if done || rx.changed().await.is_err() {
                    break;
                }
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, settled)
                .await
                .map_err(|_| RunqError::Timeout(limit))?,
            None => settled.await,
        }

        let job = self
            .get(id)
            .ok_or_else(|| RunqError::NotFound(format!("job {}", id)))?;

        match job.status {
            JobStatus::Finished => Ok(job.result.unwrap_or(Value::Null)),
            JobStatus::Failed => Err(RunqError::JobFailed {
                id,
                detail: job.failure.unwrap_or_default(),
            }),
            other => Err(RunqError::Internal(format!(
                "job {} stopped reporting while {}",
                id, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runq_core::job::JobArgs;
    use serde_json::json;

    fn job() -> Job {
        Job::new("q", "add", JobArgs::positional([1, 2]))
    }

    #[test]
    fn test_empty_registry() {
        let registry = JobRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get(JobId::new()).is_none());
    }

    #[test]
    fn test_insert_and_get() {
        let registry = JobRegistry::new();
        let id = registry.insert(job()).unwrap();

        assert!(registry.contains(id));
        assert_eq!(registry.status(id), Some(JobStatus::Queued));
        assert_eq!(registry.get(id).unwrap().function, "add");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = JobRegistry::new();
        let first = job();
        let dup = job().with_id(first.id);
        registry.insert(first).unwrap();
        assert!(registry.insert(dup).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_jobs_in_queue_keeps_insertion_order() {
        let registry = JobRegistry::new();
        let a = registry.insert(job()).unwrap();
        let _other = registry
            .insert(Job::new("other", "add", JobArgs::new()))
            .unwrap();
        let b = registry.insert(job()).unwrap();

        let ids: Vec<JobId> = registry.jobs_in_queue("q").iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_transitions() {
        let registry = JobRegistry::new();
        let id = registry.insert(job()).unwrap();

        registry.mark_started(id, Utc::now()).unwrap();
        let done = registry.mark_finished(id, json!(3)).unwrap();
        assert!(done.is_finished());

        // Terminal jobs stay terminal.
        assert!(registry.mark_failed(id, "late").is_err());
        assert_eq!(registry.status(id), Some(JobStatus::Finished));
    }

    #[test]
    fn test_update_unknown_job() {
        let registry = JobRegistry::new();
        let err = registry.mark_started(JobId::new(), Utc::now()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_wait_for_unknown_job() {
        let registry = JobRegistry::new();
        let err = registry.wait_for(JobId::new(), None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_wait_for_timeout() {
        let registry = JobRegistry::new();
        let id = registry.insert(job()).unwrap();

        let err = registry
            .wait_for(id, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(registry.status(id), Some(JobStatus::Queued));
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_finish() {
        let registry = JobRegistry::new();
        let id = registry.insert(job()).unwrap();

        let writer = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.mark_started(id, Utc::now()).unwrap();
            writer.mark_finished(id, json!(3)).unwrap();
        });

        let value = registry
            .wait_for(id, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(value, json!(3));
    }

    #[tokio::test]
    async fn test_wait_for_surfaces_failure() {
        let registry = JobRegistry::new();
        let id = registry.insert(job()).unwrap();
        registry.mark_started(id, Utc::now()).unwrap();
        registry.mark_failed(id, "division by zero").unwrap();

        match registry.wait_for(id, None).await {
            Err(RunqError::JobFailed { detail, .. }) => assert_eq!(detail, "division by zero"),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
