// src/task/mod.rs

//! Tasks: user work plus its wiring and lifecycle.
//!
//! A [`Task`] couples a user-supplied body with
//!
//! - the wiring that decides when it may run (dependencies, triggers and an
//!   optional time trigger),
//! - its lifecycle state, and
//! - subscription links used to wake downstream tasks when this one
//!   finishes.
//!
//! `Task` is a cheaply cloneable handle; all clones refer to the same
//! underlying node. Wiring between tasks is held through weak references, so
//! a graph of tasks never keeps itself alive: the executor's queue and the
//! caller's own handles are the only strong owners, and dropping both
//! releases the whole graph even in the presence of cycles.

mod id;
mod state;

pub use id::TaskId;
pub use state::TaskState;

use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::errors::TaskError;

/// Work carried by a task. Invoked at most once, on a worker thread, with no
/// core lock held.
pub(crate) type TaskBody = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Callback installed by the executor; receives a fresh handle to the task.
pub(crate) type NotificationHandler = Arc<dyn Fn(Task) + Send + Sync + 'static>;

type WeakTask = Weak<Inner>;

/// Shared task node. [`Task`] handles are `Arc`s over this.
struct Inner {
    id: TaskId,
    label: Option<String>,
    core: Mutex<Core>,
    /// Signalled on every terminal transition; [`Task::wait`] blocks here.
    finished: Condvar,
}

/// Mutable task state, behind the task mutex.
struct Core {
    state: TaskState,
    body: Option<TaskBody>,
    dependencies: Vec<WeakTask>,
    triggers: Vec<WeakTask>,
    subscribers: Vec<WeakTask>,
    time_trigger: Option<SystemTime>,
    handler: Option<NotificationHandler>,
    error: Option<Arc<TaskError>>,
}

/// A unit of user work plus its wiring and lifecycle.
///
/// See the [module docs](self) for the ownership model. All methods may be
/// called from any thread.
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,
}

impl Task {
    /// Create a task from a closure. The task starts `Idle` with no wiring.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self::build(None, Box::new(body))
    }

    /// Create a task with a label that shows up in log output.
    pub fn named<F>(label: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self::build(Some(label.into()), Box::new(body))
    }

    fn build(label: Option<String>, body: TaskBody) -> Self {
        let inner = Arc::new(Inner {
            id: TaskId::next(),
            label,
            core: Mutex::new(Core {
                state: TaskState::Idle,
                body: Some(body),
                dependencies: Vec::new(),
                triggers: Vec::new(),
                subscribers: Vec::new(),
                time_trigger: None,
                handler: None,
                error: None,
            }),
            finished: Condvar::new(),
        });
        Self { inner }
    }

    /// Process-unique ID of this task.
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// Label given at construction, if any.
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Record that `dep` must finish before this task may run on the
    /// dependency path, and subscribe to `dep`'s terminal transition.
    ///
    /// Wiring must happen before either task is submitted; the core does not
    /// defend against re-wiring live tasks.
    pub fn add_dependency(&self, dep: &Task) {
        dep.push_subscriber(Arc::downgrade(&self.inner));
        self.inner
            .core
            .lock()
            .dependencies
            .push(Arc::downgrade(&dep.inner));
        trace!(task = %self.inner.id, dep = %dep.inner.id, "dependency added");
    }

    /// Record that `trigger` finishing is sufficient for this task to run on
    /// the trigger path, and subscribe to `trigger`'s terminal transition.
    ///
    /// Same wiring contract as [`add_dependency`](Self::add_dependency).
    pub fn add_trigger(&self, trigger: &Task) {
        trigger.push_subscriber(Arc::downgrade(&self.inner));
        self.inner
            .core
            .lock()
            .triggers
            .push(Arc::downgrade(&trigger.inner));
        trace!(task = %self.inner.id, trigger = %trigger.inner.id, "trigger added");
    }

    /// Record the earliest instant at which this task may start, overwriting
    /// any previous value. This is a *not-before* bound, not a timer: the
    /// task is not guaranteed to start at `at`, only no earlier.
    pub fn set_time_trigger(&self, at: SystemTime) {
        self.inner.core.lock().time_trigger = Some(at);
    }

    /// The earliest-start instant, if one was set.
    pub fn time_trigger(&self) -> Option<SystemTime> {
        self.inner.core.lock().time_trigger
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.inner.core.lock().state
    }

    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.state() == TaskState::Failed
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == TaskState::Canceled
    }

    /// Whether the task has reached any of the three terminal states.
    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// The failure captured from the body. `Some` only when the task is
    /// [`Failed`](TaskState::Failed).
    pub fn error(&self) -> Option<Arc<TaskError>> {
        self.inner.core.lock().error.clone()
    }

    /// Cancel the task.
    ///
    /// Effective from any non-terminal state; subscribers are notified and
    /// waiters woken just like for any other terminal transition. A task
    /// that is already running is marked canceled but its body is not
    /// interrupted. Idempotent on terminal states.
    pub fn cancel(&self) {
        self.finish_with(TaskState::Canceled, None, false);
    }

    /// Block until the task reaches a terminal state. Returns immediately if
    /// it already has.
    pub fn wait(&self) {
        let mut core = self.inner.core.lock();
        while !core.state.is_finished() {
            self.inner.finished.wait(&mut core);
        }
    }

    /// Whether the task is eligible to execute right now.
    ///
    /// Evaluated by workers after popping the task and before capturing it.
    /// The rules, in order:
    ///
    /// 1. no wiring at all → ready;
    /// 2. an elapsed time trigger → ready, regardless of dependencies and
    ///    triggers;
    /// 3. otherwise any finished trigger suffices, or a non-empty dependency
    ///    list that has finished in full.
    ///
    /// A `false` answer is never sticky: the task is re-evaluated whenever
    /// an upstream finishes (or, for time triggers, when the queue polls it
    /// again). An upstream that has been dropped counts as finished, since
    /// it can never finish on its own and would otherwise stall this task
    /// forever.
    pub fn can_be_executed(&self) -> bool {
        // Snapshot the wiring so no other task's mutex is taken while this
        // task's own mutex is held.
        let (dependencies, triggers, time_trigger) = {
            let core = self.inner.core.lock();
            (
                core.dependencies.clone(),
                core.triggers.clone(),
                core.time_trigger,
            )
        };

        if dependencies.is_empty() && triggers.is_empty() && time_trigger.is_none() {
            return true;
        }

        if let Some(at) = time_trigger {
            if SystemTime::now() >= at {
                return true;
            }
        }

        if triggers.iter().any(upstream_finished) {
            return true;
        }

        !dependencies.is_empty() && dependencies.iter().all(upstream_finished)
    }

    /// Install or replace the notification handler. Intended for the
    /// executor, which re-installs its handler on every submission.
    pub(crate) fn set_notification_handler(&self, handler: NotificationHandler) {
        self.inner.core.lock().handler = Some(handler);
    }

    /// Invoke the installed notification handler, if any, with a fresh
    /// handle to this task. The handler runs with the task mutex released,
    /// since it typically calls back into the executor.
    pub(crate) fn notify(&self) {
        let handler = self.inner.core.lock().handler.clone();
        if let Some(handler) = handler {
            handler(self.clone());
        }
    }

    /// Mark the task as queued. Only `Idle` tasks move; a task that is
    /// already pending stays pending, and running or finished tasks are left
    /// alone so a stale re-submission can never resurrect them.
    pub(crate) fn pend(&self) {
        let mut core = self.inner.core.lock();
        if core.state == TaskState::Idle {
            core.state = TaskState::Pending;
        }
    }

    /// Atomically claim the task for execution.
    ///
    /// On success the task moves `Pending -> Running` and the body is handed
    /// to the caller, which guarantees it runs at most once. Returns `None`
    /// in every other state (canceled, already claimed by a competing queue
    /// entry, never submitted, ...).
    pub(crate) fn capture(&self) -> Option<TaskBody> {
        let mut core = self.inner.core.lock();
        if core.state != TaskState::Pending {
            return None;
        }
        core.state = TaskState::Running;
        core.body.take()
    }

    /// Record a successful run. Gated on `Running`: a cancel that won the
    /// race leaves the task canceled and this call is a no-op.
    pub(crate) fn complete(&self) {
        self.finish_with(TaskState::Completed, None, true);
    }

    /// Record a failed run, storing the captured error. Same gating as
    /// [`complete`](Self::complete).
    pub(crate) fn set_error(&self, error: TaskError) {
        self.finish_with(TaskState::Failed, Some(error), true);
    }

    fn push_subscriber(&self, subscriber: WeakTask) {
        self.inner.core.lock().subscribers.push(subscriber);
    }

    /// Move to a terminal state, then drain subscribers and wake waiters.
    ///
    /// With `require_running` set the transition only fires from `Running`.
    /// Terminal states are absorbing either way: the first terminal
    /// transition wins and later ones are no-ops.
    ///
    /// Subscribers are drained under the mutex but notified outside of it;
    /// each subscriber is notified at most once from this task.
    fn finish_with(&self, terminal: TaskState, error: Option<TaskError>, require_running: bool) {
        let drained = {
            let mut core = self.inner.core.lock();
            let allowed = if require_running {
                core.state == TaskState::Running
            } else {
                !core.state.is_finished()
            };
            if !allowed {
                return;
            }
            core.state = terminal;
            core.error = error.map(Arc::new);
            core.body = None;
            mem::take(&mut core.subscribers)
        };

        self.inner.finished.notify_all();
        debug!(
            task = %self.inner.id,
            label = self.inner.label.as_deref().unwrap_or(""),
            state = %terminal,
            subscribers = drained.len(),
            "task finished"
        );

        for weak in drained {
            let Some(inner) = weak.upgrade() else {
                continue;
            };
            if Arc::ptr_eq(&inner, &self.inner) {
                continue;
            }
            Task { inner }.notify();
        }
    }
}

/// Whether an upstream referenced from a dependency or trigger list counts
/// as finished. A dropped upstream can never finish, so a dangling weak
/// reference counts as finished rather than stalling its downstream.
fn upstream_finished(upstream: &WeakTask) -> bool {
    match upstream.upgrade() {
        Some(inner) => inner.core.lock().state.is_finished(),
        None => true,
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn noop() -> Task {
        Task::new(|| Ok(()))
    }

    /// A finished upstream for wiring tests; cancel is the one public way to
    /// reach a terminal state without an executor.
    fn finished() -> Task {
        let task = noop();
        task.cancel();
        task
    }

    #[test]
    fn capture_claims_exactly_once() {
        let task = noop();
        task.pend();
        assert_eq!(task.state(), TaskState::Pending);

        assert!(task.capture().is_some());
        assert_eq!(task.state(), TaskState::Running);

        // A second queue entry racing for the same task loses.
        assert!(task.capture().is_none());
    }

    #[test]
    fn capture_fails_unless_pending() {
        let task = noop();
        assert!(task.capture().is_none(), "idle task must not be captured");

        let task = noop();
        task.cancel();
        assert!(task.capture().is_none());
    }

    #[test]
    fn complete_loses_race_against_cancel() {
        let task = noop();
        task.pend();
        let _body = task.capture();

        task.cancel();
        assert_eq!(task.state(), TaskState::Canceled);

        // The worker finishes the body later and reports; first terminal
        // transition wins.
        task.complete();
        assert_eq!(task.state(), TaskState::Canceled);
        task.set_error(TaskError::Panicked("late".into()));
        assert_eq!(task.state(), TaskState::Canceled);
    }

    #[test]
    fn cancel_is_idempotent_on_terminal_states() {
        let task = noop();
        task.pend();
        let _body = task.capture();
        task.complete();
        assert!(task.is_completed());

        task.cancel();
        assert!(task.is_completed());
    }

    #[test]
    fn pend_does_not_resurrect() {
        let task = noop();
        task.cancel();
        task.pend();
        assert_eq!(task.state(), TaskState::Canceled);

        let task = noop();
        task.pend();
        let _body = task.capture();
        task.pend();
        assert_eq!(task.state(), TaskState::Running);
    }

    #[test]
    fn set_error_stores_the_failure() {
        let task = noop();
        task.pend();
        let _body = task.capture();
        task.set_error(TaskError::Failed(anyhow::anyhow!("boom")));

        assert!(task.is_failed());
        let error = task.error().expect("failed task must carry an error");
        assert!(error.to_string().contains("boom"));
    }

    #[test]
    fn readiness_with_no_wiring() {
        assert!(noop().can_be_executed());
    }

    #[test]
    fn readiness_on_the_dependency_path() {
        let task = noop();
        let dep = noop();
        task.add_dependency(&dep);
        assert!(!task.can_be_executed());

        dep.cancel();
        assert!(task.can_be_executed());
    }

    #[test]
    fn readiness_on_the_trigger_path() {
        let task = noop();
        let slow = noop();
        let fast = finished();
        task.add_trigger(&slow);
        assert!(!task.can_be_executed());

        task.add_trigger(&fast);
        assert!(task.can_be_executed());
    }

    #[test]
    fn finished_trigger_overrides_pending_dependencies() {
        let task = noop();
        let dep = noop();
        let trigger = finished();
        task.add_dependency(&dep);
        task.add_trigger(&trigger);
        assert!(task.can_be_executed());
    }

    #[test]
    fn unelapsed_time_trigger_blocks_an_unwired_task() {
        let task = noop();
        task.set_time_trigger(SystemTime::now() + Duration::from_secs(3600));
        assert!(!task.can_be_executed());
    }

    #[test]
    fn elapsed_time_trigger_is_sufficient() {
        let task = noop();
        let dep = noop();
        task.add_dependency(&dep);
        task.set_time_trigger(SystemTime::now() - Duration::from_secs(1));
        assert!(task.can_be_executed(), "elapsed time trigger must override the pending dependency");
    }

    #[test]
    fn finished_dependencies_do_not_wait_for_the_time_trigger() {
        let task = noop();
        let dep = finished();
        task.add_dependency(&dep);
        task.set_time_trigger(SystemTime::now() + Duration::from_secs(3600));
        assert!(task.can_be_executed(), "the time trigger is disjunctive, not a gate on the dependency path");
    }

    #[test]
    fn set_time_trigger_overwrites() {
        let task = noop();
        let first = SystemTime::now() + Duration::from_secs(10);
        let second = SystemTime::now() + Duration::from_secs(20);
        task.set_time_trigger(first);
        task.set_time_trigger(second);
        assert_eq!(task.time_trigger(), Some(second));
    }

    #[test]
    fn dropped_upstream_counts_as_finished() {
        let task = noop();
        let dep = noop();
        task.add_dependency(&dep);
        assert!(!task.can_be_executed());

        drop(dep);
        assert!(task.can_be_executed());
    }

    #[test]
    fn terminal_transition_notifies_each_subscriber_once() {
        let upstream = noop();
        let downstream = noop();
        downstream.add_dependency(&upstream);

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        downstream.set_notification_handler(Arc::new(move |_task| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        upstream.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Subscribers were drained; a second terminal transition attempt
        // notifies nobody.
        upstream.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_returns_immediately_on_a_terminal_task() {
        let task = finished();
        task.wait();
        assert!(task.is_canceled());
    }

    #[test]
    fn wait_wakes_on_cancel_from_another_thread() {
        let task = noop();
        let canceller = task.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        task.wait();
        assert!(task.is_canceled());
        handle.join().expect("canceller thread panicked");
    }
}
