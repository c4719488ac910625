mod args;
mod context;
mod record;
mod snapshot;
mod status;
mod traits;

pub use args::JobArgs;
pub use context::JobContext;
pub use record::{EnqueueOptions, Job, JobId};
pub use snapshot::JobSnapshot;
pub use status::JobStatus;
pub use traits::{Task, TaskInfo};
