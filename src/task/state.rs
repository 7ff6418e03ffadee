// src/task/state.rs

use std::fmt;

/// Lifecycle state of a [`Task`](crate::task::Task).
///
/// Transitions:
/// - `Idle -> Pending` on submission
/// - `Pending -> Running` when a worker captures the task
/// - `Running -> Completed` / `Running -> Failed` when the body returns
/// - any non-terminal state `-> Canceled` via
///   [`Task::cancel`](crate::task::Task::cancel)
///
/// `Completed`, `Failed` and `Canceled` are terminal: once reached, the
/// state never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created but not yet submitted.
    Idle,
    /// Submitted and queued; not yet claimed by a worker.
    Pending,
    /// Claimed by a worker; the body is executing (or about to).
    Running,
    /// The body returned successfully.
    Completed,
    /// The body returned an error or panicked.
    Failed,
    /// Canceled before the body could complete.
    Canceled,
}

impl TaskState {
    /// Returns `true` for the three terminal states.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Idle => "idle",
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
        };
        f.write_str(name)
    }
}
