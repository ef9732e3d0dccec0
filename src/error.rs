//! Engine-level error taxonomy
//!
//! Only pool misconfiguration and initialization failures surface as typed
//! errors. Task-level failures (timeouts, crashes, routine errors) are
//! represented inside a [`crate::task::TaskResult`] and never escape
//! `submit`/`process`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid pool configuration. Fatal, raised before any worker is
    /// spawned, never retried.
    #[error("invalid worker pool configuration: {0}")]
    Configuration(String),

    /// Worker spawning failed. Recoverable: the pool falls back to the
    /// inline concurrent executor and callers see no contract change.
    #[error("worker pool initialization failed: {0}")]
    WorkerInit(String),
}
