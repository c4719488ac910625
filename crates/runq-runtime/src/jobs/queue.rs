use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use runq_core::job::{EnqueueOptions, Job, JobArgs, JobId, JobStatus};
use runq_core::{Result, RunqError};

use super::registry::JobRegistry;

#[derive(Default)]
struct QueueState {
    /// Ready job IDs, oldest first.
    pending: VecDeque<JobId>,
    /// Scheduled job IDs keyed by (due time, arrival order).
    scheduled: BTreeMap<(DateTime<Utc>, u64), JobId>,
    next_seq: u64,
}

/// A named FIFO of pending jobs plus the holding set of its scheduled jobs.
///
/// Lock order is always queue state, then registry. `pop_next` is the only way
/// workers claim work, and it hands each ID out exactly once.
pub struct JobQueue {
    name: String,
    state: Mutex<QueueState>,
    registry: JobRegistry,
}

impl JobQueue {
    /// Create a new, empty queue backed by `registry`.
    pub fn new(name: impl Into<String>, registry: JobRegistry) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            registry,
        }
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `job` and place it in the pending sequence, or in the holding
    /// set if it is scheduled.
    pub fn enqueue(&self, mut job: Job) -> Result<JobId> {
        job.queue = self.name.clone();
        let due = match (job.status, job.scheduled_for) {
            (JobStatus::Queued, _) => None,
            (JobStatus::Scheduled, Some(due)) => Some(due),
            (status, _) => {
                return Err(RunqError::InvalidArgument(format!(
                    "cannot enqueue job {} with status {}",
                    job.id, status
                )))
            }
        };

        let mut state = self.lock();
        let id = self.registry.insert(job)?;
        match due {
            None => state.pending.push_back(id),
            Some(due) => {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.scheduled.insert((due, seq), id);
            }
        }
        drop(state);

        tracing::debug!(job_id = %id, queue = %self.name, scheduled_for = ?due, "Job enqueued");
        Ok(id)
    }

    /// Build a job for `function` and enqueue it.
    pub fn enqueue_call(
        &self,
        function: impl Into<String>,
        args: JobArgs,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        let job = options.apply(Job::new(self.name.clone(), function, args));
        self.enqueue(job)
    }

    /// Enqueue `function` to run once `delay` has elapsed.
    pub fn enqueue_in(
        &self,
        delay: Duration,
        function: impl Into<String>,
        args: JobArgs,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        let due = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .ok_or_else(|| RunqError::InvalidArgument(format!("delay out of range: {:?}", delay)))?;
        self.enqueue_at(due, function, args, options)
    }

    /// Enqueue `function` to run at `due`. Past due times enqueue immediately.
    pub fn enqueue_at(
        &self,
        due: DateTime<Utc>,
        function: impl Into<String>,
        args: JobArgs,
        options: EnqueueOptions,
    ) -> Result<JobId> {
        let job = options
            .apply(Job::new(self.name.clone(), function, args))
            .scheduled_for(due);
        self.enqueue(job)
    }

    /// Remove and return the oldest pending job ID.
    pub fn pop_next(&self) -> Option<JobId> {
        self.lock().pending.pop_front()
    }

    /// Pop the oldest pending job and mark it started at `at` before the queue
    /// lock is released, so no observer sees a claimed job still reporting
    /// queued. IDs that can no longer be started are dropped with a warning.
    pub fn claim_next(&self, at: DateTime<Utc>) -> Option<Job> {
        let mut state = self.lock();
        while let Some(id) = state.pending.pop_front() {
            match self.registry.mark_started(id, at) {
                Ok(job) => return Some(job),
                Err(e) => {
                    tracing::warn!(job_id = %id, queue = %self.name, error = %e, "Dropping unclaimable job");
                }
            }
        }
        None
    }

    /// Move every scheduled job due at or before `now` to the back of the
    /// pending sequence, marking it queued. Returns the promoted IDs.
    pub fn promote_due(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let mut state = self.lock();
        let mut promoted = Vec::new();

        while let Some(entry) = state.scheduled.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let id = entry.remove();
            match self.registry.mark_queued(id) {
                Ok(_) => {
                    state.pending.push_back(id);
                    promoted.push(id);
                }
                Err(e) => {
                    tracing::warn!(job_id = %id, queue = %self.name, error = %e, "Dropping unpromotable scheduled job");
                }
            }
        }

        promoted
    }

    /// Fetch a job belonging to this queue.
    pub fn fetch(&self, id: JobId) -> Option<Job> {
        self.registry.get(id).filter(|job| job.queue == self.name)
    }

    /// Number of pending jobs.
    pub fn count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Check if no jobs are pending.
    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Pending job IDs in dispatch order.
    pub fn list_pending_ids(&self) -> Vec<JobId> {
        self.lock().pending.iter().copied().collect()
    }

    /// Number of jobs waiting for their due time.
    pub fn scheduled_count(&self) -> usize {
        self.lock().scheduled.len()
    }

    /// Scheduled job IDs ordered by due time.
    pub fn list_scheduled_ids(&self) -> Vec<JobId> {
        self.lock().scheduled.values().copied().collect()
    }

    /// IDs of every job ever enqueued here, oldest first.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs().into_iter().map(|job| job.id).collect()
    }

    /// Every job ever enqueued here, oldest first.
    pub fn jobs(&self) -> Vec<Job> {
        self.registry.jobs_in_queue(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn queue() -> JobQueue {
        JobQueue::new("q", JobRegistry::new())
    }

    fn enqueue_add(queue: &JobQueue, a: i64, b: i64) -> JobId {
        queue
            .enqueue_call("add", JobArgs::positional([a, b]), EnqueueOptions::new())
            .unwrap()
    }

    #[test]
    fn test_enqueue_registers_and_counts() {
        let queue = queue();
        let id = enqueue_add(&queue, 5, 10);

        assert_eq!(queue.count(), 1);
        assert!(!queue.is_empty());
        let job = queue.fetch(id).unwrap();
        assert_eq!(job.queue, "q");
        assert!(job.is_queued());
    }

    #[test]
    fn test_enqueue_overrides_queue_name() {
        let queue = queue();
        let id = queue
            .enqueue(Job::new("elsewhere", "add", JobArgs::new()))
            .unwrap();
        assert_eq!(queue.fetch(id).unwrap().queue, "q");
    }

    #[test]
    fn test_pop_is_fifo() {
        let queue = queue();
        let ids: Vec<JobId> = (0..3).map(|i| enqueue_add(&queue, i, i)).collect();

        assert_eq!(queue.list_pending_ids(), ids);
        assert_eq!(queue.pop_next(), Some(ids[0]));
        assert_eq!(queue.pop_next(), Some(ids[1]));
        assert_eq!(queue.pop_next(), Some(ids[2]));
        assert_eq!(queue.pop_next(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_popped_jobs_stay_registered() {
        let queue = queue();
        let id = enqueue_add(&queue, 1, 1);
        queue.pop_next();

        assert_eq!(queue.count(), 0);
        assert_eq!(queue.job_ids(), vec![id]);
    }

    #[test]
    fn test_enqueue_in_holds_job() {
        let queue = queue();
        let id = queue
            .enqueue_in(
                Duration::from_secs(5),
                "add",
                JobArgs::positional([1, 2]),
                EnqueueOptions::new(),
            )
            .unwrap();

        assert_eq!(queue.count(), 0);
        assert_eq!(queue.pop_next(), None);
        assert_eq!(queue.list_scheduled_ids(), vec![id]);
        assert!(queue.fetch(id).unwrap().is_scheduled());
    }

    #[test]
    fn test_enqueue_in_rejects_out_of_range_delay() {
        let queue = queue();
        let err = queue
            .enqueue_in(
                Duration::from_secs(10_000_000_000_000),
                "add",
                JobArgs::new(),
                EnqueueOptions::new(),
            )
            .unwrap_err();

        assert!(matches!(err, RunqError::InvalidArgument(_)));
        assert_eq!(queue.scheduled_count(), 0);
        assert!(queue.job_ids().is_empty());
    }

    #[test]
    fn test_claim_next_marks_started() {
        let queue = queue();
        let first = enqueue_add(&queue, 1, 1);
        let second = enqueue_add(&queue, 2, 2);

        let at = Utc::now();
        let job = queue.claim_next(at).unwrap();
        assert_eq!(job.id, first);
        assert!(job.is_started());
        assert_eq!(job.started_at, Some(at));
        assert_eq!(queue.fetch(first).unwrap().status, JobStatus::Started);

        assert_eq!(queue.list_pending_ids(), vec![second]);
        assert!(queue.fetch(second).unwrap().is_queued());
    }

    #[test]
    fn test_claim_next_skips_jobs_that_cannot_start() {
        let registry = JobRegistry::new();
        let queue = JobQueue::new("q", registry.clone());
        let stale = enqueue_add(&queue, 1, 1);
        let fresh = enqueue_add(&queue, 2, 2);
        registry.mark_started(stale, Utc::now()).unwrap();

        assert_eq!(queue.claim_next(Utc::now()).map(|job| job.id), Some(fresh));
        assert!(queue.claim_next(Utc::now()).is_none());
    }

    #[test]
    fn test_enqueue_at_past_is_immediate() {
        let queue = queue();
        let id = queue
            .enqueue_at(
                Utc::now() - chrono::Duration::seconds(1),
                "add",
                JobArgs::new(),
                EnqueueOptions::new(),
            )
            .unwrap();

        assert_eq!(queue.scheduled_count(), 0);
        assert_eq!(queue.pop_next(), Some(id));
    }

    #[test]
    fn test_promote_due_respects_due_time() {
        let queue = queue();
        let now = Utc::now();
        let soon = queue
            .enqueue_at(
                now + chrono::Duration::seconds(1),
                "add",
                JobArgs::new(),
                EnqueueOptions::new(),
            )
            .unwrap();
        let later = queue
            .enqueue_at(
                now + chrono::Duration::seconds(10),
                "add",
                JobArgs::new(),
                EnqueueOptions::new(),
            )
            .unwrap();

        assert!(queue.promote_due(now).is_empty());

        let promoted = queue.promote_due(now + chrono::Duration::seconds(2));
        assert_eq!(promoted, vec![soon]);
        assert_eq!(queue.list_pending_ids(), vec![soon]);
        assert_eq!(queue.list_scheduled_ids(), vec![later]);
        assert!(queue.fetch(soon).unwrap().is_queued());
        assert!(queue.fetch(later).unwrap().is_scheduled());
    }

    #[test]
    fn test_promote_due_orders_by_due_time() {
        let queue = queue();
        let now = Utc::now();
        let second = queue
            .enqueue_at(
                now + chrono::Duration::seconds(2),
                "add",
                JobArgs::new(),
                EnqueueOptions::new(),
            )
            .unwrap();
        let first = queue
            .enqueue_at(
                now + chrono::Duration::seconds(1),
                "add",
                JobArgs::new(),
                EnqueueOptions::new(),
            )
            .unwrap();

        let promoted = queue.promote_due(now + chrono::Duration::seconds(3));
        assert_eq!(promoted, vec![first, second]);
    }

    #[test]
    fn test_fetch_other_queue_is_none() {
        let registry = JobRegistry::new();
        let a = JobQueue::new("a", registry.clone());
        let b = JobQueue::new("b", registry);
        let id = enqueue_add(&a, 1, 2);

        assert!(a.fetch(id).is_some());
        assert!(b.fetch(id).is_none());
        assert!(a.fetch(JobId::new()).is_none());
    }

    #[test]
    fn test_concurrent_pops_never_share_an_id() {
        let queue = Arc::new(queue());
        let total = 500;
        for i in 0..total {
            enqueue_add(&queue, i, i);
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(id) = queue.pop_next() {
                        claimed.push(id);
                    }
                    claimed
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "job {} claimed twice", id);
            }
        }
        assert_eq!(seen.len(), total as usize);
    }
}
