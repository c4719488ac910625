use std::time::Duration;

use chrono::Utc;
use runq_core::job::JobId;
use tokio_util::sync::CancellationToken;

use crate::jobs::JobDispatcher;

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to check for due jobs.
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl From<&runq_core::config::SchedulerConfig> for SchedulerConfig {
    fn from(config: &runq_core::config::SchedulerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
        }
    }
}

/// Moves scheduled jobs into their queue's pending sequence once they are due.
///
/// A job is never promoted before its due time. It may be promoted up to one
/// poll interval late.
#[derive(Clone)]
pub struct Scheduler {
    dispatcher: JobDispatcher,
    config: SchedulerConfig,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(dispatcher: JobDispatcher, config: SchedulerConfig) -> Self {
        Self {
            dispatcher,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Run the promotion loop until `stop` is called.
    pub async fn run(&self) {
        tracing::info!(poll_interval = ?self.config.poll_interval, "Scheduler starting");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.tick();

            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Promote every job that is due now. Returns the promoted IDs.
    pub fn tick(&self) -> Vec<JobId> {
        let promoted = self.dispatcher.promote_due(Utc::now());
        if !promoted.is_empty() {
            tracing::debug!(count = promoted.len(), "Promoted scheduled jobs");
        }
        promoted
    }

    /// Stop the loop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
