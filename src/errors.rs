// src/errors.rs

//! Crate-wide error types and aliases.

use thiserror::Error;

/// Errors surfaced by the crate's own machinery (as opposed to failures of
/// user-supplied task bodies, which are [`TaskError`]s stored on the task).
#[derive(Error, Debug)]
pub enum TaskpoolError {
    #[error("failed to spawn worker thread: {0}")]
    SpawnWorker(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A failure captured from a task body.
///
/// Stored on the task when the body returns an error or panics; retrieved
/// via [`Task::error`](crate::task::Task::error) once the task is in the
/// `Failed` state.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The body returned an error.
    #[error(transparent)]
    Failed(anyhow::Error),

    /// The body panicked; the payload is the panic message, when one could
    /// be extracted.
    #[error("task body panicked: {0}")]
    Panicked(String),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskpoolError>;
