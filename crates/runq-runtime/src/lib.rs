pub mod jobs;
pub mod scheduler;

pub use jobs::{
    ExecutionResult, HandlerRegistry, JobDispatcher, JobExecutor, JobQueue, JobRegistry, Worker,
    WorkerConfig, WorkerHandle, WorkerMode, WorkerStats,
};
pub use scheduler::{Scheduler, SchedulerConfig};
