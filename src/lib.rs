// src/lib.rs

//! taskpool: a thread-pool task executor with inter-task wiring.
//!
//! Tasks are units of user work that can be wired together before submission:
//!
//! - *dependencies* (AND): every dependency must finish before the task may
//!   run on the dependency path;
//! - *triggers* (OR): any one finished trigger is sufficient;
//! - a *time trigger*: an absolute wall-clock instant before which the task
//!   may not run, and after which it is itself a sufficient condition.
//!
//! The [`Executor`] owns a fixed pool of worker threads draining one FIFO
//! queue. Workers re-check a task's readiness after popping it; a task that
//! is not ready yet is parked until an upstream's terminal transition
//! re-submits it through the notification handler the executor installs on
//! submission.
//!
//! # Example
//!
//! ```
//! use taskpool::{Executor, Task};
//!
//! # fn main() -> taskpool::errors::Result<()> {
//! let executor = Executor::new()?;
//!
//! let fetch = Task::named("fetch", || Ok(()));
//! let build = Task::named("build", || Ok(()));
//! build.add_dependency(&fetch);
//!
//! executor.submit(&fetch);
//! executor.submit(&build);
//!
//! build.wait();
//! assert!(build.is_completed());
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod exec;
pub mod logging;
pub mod task;

pub use errors::{TaskError, TaskpoolError};
pub use exec::{Executor, ExecutorOptions};
pub use task::{Task, TaskId, TaskState};
