// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The executor itself only emits `tracing` events; no subscriber is ever
//! installed implicitly. Embedders that do not bring their own subscriber
//! can call [`init_logging`] once at startup.
//!
//! The filter is taken from the `TASKPOOL_LOG` environment variable (e.g.
//! "info", "debug", or any `EnvFilter` directive), defaulting to `info`.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise a global logging subscriber.
///
/// Safe to call once at startup; panics if a global subscriber has already
/// been installed.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_env("TASKPOOL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .init();
}
