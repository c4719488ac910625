use std::time::Duration;

use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Core error type for runq operations.
#[derive(Error, Debug)]
pub enum RunqError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job {id} failed: {detail}")]
    JobFailed { id: JobId, detail: String },

    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunqError {
    /// Build a handler error from anything printable.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// Whether this error is the `get_result` timeout signal.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether this error is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for RunqError {
    fn from(e: serde_json::Error) -> Self {
        RunqError::Serialization(e.to_string())
    }
}

/// Result type alias using RunqError.
pub type Result<T> = std::result::Result<T, RunqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        assert!(RunqError::Timeout(Duration::from_secs(2)).is_timeout());
        assert!(RunqError::NotFound("job".into()).is_not_found());
        assert!(!RunqError::handler("boom").is_timeout());
    }

    #[test]
    fn test_transition_message() {
        let id = JobId::new();
        let err = RunqError::InvalidTransition {
            id,
            from: JobStatus::Finished,
            to: JobStatus::Started,
        };
        assert!(err.to_string().contains("finished -> started"));
    }

    #[test]
    fn test_from_serde_error() {
        let parse: std::result::Result<i64, _> = serde_json::from_str("not json");
        let err: RunqError = parse.unwrap_err().into();
        assert!(matches!(err, RunqError::Serialization(_)));
    }
}
