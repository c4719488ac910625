use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RunqError;

/// Lifecycle state of a job.
///
/// Jobs only move forward: `Scheduled -> Queued -> Started -> Finished | Failed`.
/// Immediate jobs begin at `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for its due time in a queue's holding set.
    Scheduled,
    /// Waiting in a queue's pending sequence.
    Queued,
    /// Claimed by a worker and executing.
    Started,
    /// Work returned a value.
    Finished,
    /// Work returned an error, panicked or timed out.
    Failed,
}

impl JobStatus {
    /// Convert to the wire/string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    /// Finished and failed jobs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Queued)
                | (Self::Queued, Self::Started)
                | (Self::Started, Self::Finished)
                | (Self::Started, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = RunqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "queued" => Ok(Self::Queued),
            "started" => Ok(Self::Started),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            other => Err(RunqError::InvalidArgument(format!(
                "unknown job status '{}'",
                other
            ))),
        }
    }
}
