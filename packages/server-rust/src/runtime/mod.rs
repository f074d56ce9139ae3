//! Async orchestration primitives shared by the cache, broker and
//! background-task layers.
//!
//! - [`timeout`]: deadline-bounded execution that absorbs failures
//! - [`fan_out`]: semaphore-bounded batch execution
//! - [`scheduler`]: forever-running task loop with jittered backoff

pub mod fan_out;
pub mod scheduler;
pub mod timeout;

pub use fan_out::{BoundedFanOut, ErrorPolicy};
pub use scheduler::{
    task_fn, FnTask, RetryingScheduler, RunOutcome, ScheduledTask, SchedulerHandle,
    SchedulerState, TaskRun,
};
pub use timeout::{run_with_timeout, GuardError, TimeoutGuard};
