// src/exec/mod.rs

//! The executor: a fixed pool of worker threads draining a shared FIFO
//! queue of tasks.
//!
//! Submission moves a task to `Pending`, installs a notification handler
//! that re-submits the task whenever one of its upstreams finishes, and
//! wakes a worker. Workers re-check readiness after popping, so submission
//! never has to be gated on readiness; a premature pop just means the task
//! waits for the next notification (or, for time triggers, the next poll).

mod worker;

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};

use crate::errors::{Result, TaskpoolError};
use crate::task::Task;

use self::worker::run_worker;

/// Options recognised at executor construction.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Number of worker threads to spawn. Clamped to at least 1.
    pub thread_count: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            thread_count: default_thread_count(),
        }
    }
}

/// Hardware parallelism hint, floored at 1.
fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1)
}

/// Thread-pool executor.
///
/// Dropping the executor performs a destructive shutdown: the queue is
/// purged, all workers are woken and joined. Tasks still queued at that
/// point stay `Pending` forever; cancel them if anything waits on them.
pub struct Executor {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

/// State shared between the executor handle, its workers, and the
/// notification handlers installed on submitted tasks (which hold it
/// weakly, so an executor that is dropped turns them into no-ops).
pub(crate) struct Shared {
    pub(crate) queue: Mutex<QueueState>,
    /// Signalled when the queue grows or shutdown starts.
    pub(crate) work_available: Condvar,
}

pub(crate) struct QueueState {
    pub(crate) tasks: VecDeque<Task>,
    /// Monotone: set once by `start_shutdown`, never cleared.
    pub(crate) finished: bool,
}

impl Executor {
    /// Create an executor with one worker per hardware thread.
    pub fn new() -> Result<Self> {
        Self::with_options(ExecutorOptions::default())
    }

    /// Create an executor with explicit options.
    pub fn with_options(options: ExecutorOptions) -> Result<Self> {
        let thread_count = options.thread_count.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                finished: false,
            }),
            work_available: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(thread_count);
        for worker_id in 0..thread_count {
            let worker_shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("taskpool-worker-{worker_id}"))
                .spawn(move || run_worker(worker_id, &worker_shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(error) => {
                    // Tear down the workers spawned so far instead of
                    // leaking them behind a constructor error.
                    shared.start_shutdown();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(TaskpoolError::SpawnWorker(error));
                }
            }
        }

        info!(workers = thread_count, "executor started");
        Ok(Self { shared, workers })
    }

    /// Queue a task for execution.
    ///
    /// The task moves to `Pending` and gets a notification handler that
    /// re-submits it whenever one of its upstreams finishes. Submitting an
    /// already-finished task, or submitting to an executor that has begun
    /// shutting down, is silently dropped.
    pub fn submit(&self, task: &Task) {
        Shared::submit(&self.shared, task.clone());
    }

    /// Begin shutdown: purge the queue and wake every worker. Idempotent.
    pub fn start_shutdown(&self) {
        self.shared.start_shutdown();
    }

    /// Join all worker threads. Blocks until each has exited; a worker that
    /// is mid-body finishes that body first.
    pub fn wait_shutdown(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.start_shutdown();
        self.wait_shutdown();
    }
}

impl Shared {
    /// Submission path shared by [`Executor::submit`] and the notification
    /// handlers. Runs under the executor mutex; task mutexes are only taken
    /// briefly and never the other way around.
    pub(crate) fn submit(this: &Arc<Shared>, task: Task) {
        let mut queue = this.queue.lock();
        if queue.finished {
            debug!(task = %task.id(), "submit after shutdown; dropping");
            return;
        }
        if task.is_finished() {
            debug!(task = %task.id(), state = %task.state(), "submit of a finished task; dropping");
            return;
        }

        task.pend();
        let weak = Arc::downgrade(this);
        task.set_notification_handler(Arc::new(move |task: Task| {
            // The executor may be gone by the time an upstream finishes; a
            // dead weak handle turns the notification into a no-op instead
            // of resurrecting the task.
            if let Some(shared) = weak.upgrade() {
                Shared::submit(&shared, task);
            }
        }));

        trace!(task = %task.id(), depth = queue.tasks.len() + 1, "task queued");
        queue.tasks.push_back(task);
        this.work_available.notify_one();
    }

    pub(crate) fn start_shutdown(&self) {
        let mut queue = self.queue.lock();
        if !queue.finished {
            info!(purged = queue.tasks.len(), "executor shutting down");
        }
        queue.finished = true;
        queue.tasks.clear();
        self.work_available.notify_all();
    }
}
