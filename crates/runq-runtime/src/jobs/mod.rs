mod dispatcher;
mod executor;
mod handlers;
mod queue;
mod registry;
mod worker;

pub use dispatcher::JobDispatcher;
pub use executor::{ExecutionResult, JobExecutor};
pub use handlers::{BoxedJobHandler, HandlerEntry, HandlerRegistry};
pub use queue::JobQueue;
pub use registry::JobRegistry;
pub use worker::{Worker, WorkerConfig, WorkerHandle, WorkerMode, WorkerStats};
