// src/exec/worker.rs

//! The worker dispatch loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::{debug, trace};

use crate::errors::TaskError;
use crate::task::{Task, TaskBody};

use super::Shared;

/// Nap length while everything left in the queue is waiting out a time
/// trigger. Nothing fires a notification when wall time passes, so the
/// queue is polled; submissions and shutdown still wake the worker
/// immediately through the condvar.
const TIME_TRIGGER_POLL: Duration = Duration::from_millis(1);

pub(crate) fn run_worker(worker_id: usize, shared: &Shared) {
    trace!(worker = worker_id, "worker started");

    // Consecutive pops that went straight back to the queue to wait out a
    // time trigger. Once they cover the whole queue there is nothing
    // runnable right now.
    let mut requeued = 0usize;

    loop {
        let mut queue = shared.queue.lock();
        while queue.tasks.is_empty() && !queue.finished {
            shared.work_available.wait(&mut queue);
        }
        if queue.finished {
            trace!(worker = worker_id, "worker exiting");
            return;
        }

        if requeued > 0 && requeued >= queue.tasks.len() {
            requeued = 0;
            let _ = shared.work_available.wait_for(&mut queue, TIME_TRIGGER_POLL);
            continue;
        }

        let Some(task) = queue.tasks.pop_front() else {
            continue;
        };

        if !task.can_be_executed() {
            if task.time_trigger().is_some() {
                // Not-before instant has not elapsed. Push to the back so
                // other ready tasks keep making progress.
                queue.tasks.push_back(task);
                requeued += 1;
            } else {
                trace!(
                    worker = worker_id,
                    task = %task.id(),
                    "not ready; parked until an upstream notification re-submits it"
                );
            }
            continue;
        }
        requeued = 0;
        drop(queue);

        let Some(body) = task.capture() else {
            // Canceled, or claimed through a competing queue entry.
            trace!(worker = worker_id, task = %task.id(), "capture failed; dropping");
            continue;
        };

        run_body(worker_id, &task, body);
    }
}

/// Run a captured body with no core lock held and route the outcome into
/// the task's terminal transition. Panics are contained to the task.
fn run_body(worker_id: usize, task: &Task, body: TaskBody) {
    debug!(
        worker = worker_id,
        task = %task.id(),
        label = task.label().unwrap_or(""),
        "task running"
    );
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => task.complete(),
        Ok(Err(error)) => {
            debug!(worker = worker_id, task = %task.id(), %error, "task body returned an error");
            task.set_error(TaskError::Failed(error));
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            debug!(worker = worker_id, task = %task.id(), panic = %message, "task body panicked");
            task.set_error(TaskError::Panicked(message));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
