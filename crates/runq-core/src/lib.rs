pub mod config;
pub mod error;
pub mod job;

pub use config::RunqConfig;
pub use error::{Result, RunqError};
pub use job::{
    EnqueueOptions, Job, JobArgs, JobContext, JobId, JobSnapshot, JobStatus, Task, TaskInfo,
};
