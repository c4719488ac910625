//! runq - an in-process background job queue
//!
//! Named FIFO queues, delayed jobs promoted by a scheduler, and workers that
//! run registered handlers and record each job's outcome.

mod runtime;

pub use runq_core;
pub use runq_runtime;

pub use runtime::prelude;
pub use runtime::{Runq, RunqBuilder};
