use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

use super::context::JobContext;

/// Trait for typed job handlers.
///
/// `Args` is decoded from the job's stored arguments: a tuple or `Vec` for
/// positional arguments, a struct for keyword arguments.
pub trait Task: Send + Sync + 'static {
    /// Input arguments type.
    type Args: DeserializeOwned + Send;
    /// Output result type.
    type Output: Serialize + Send;

    /// Get task metadata.
    fn info() -> TaskInfo;

    /// Execute the task.
    fn execute(
        ctx: &JobContext,
        args: Self::Args,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Output>> + Send + '_>>;
}

/// Task metadata.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    /// Function name jobs refer to.
    pub name: &'static str,
    /// Default execution time limit. Per-job timeouts take precedence.
    pub timeout: Option<Duration>,
}

impl TaskInfo {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
