//! Write-coalescing batch engine.
//!
//! Provides:
//! - A pair of FIFO queues (insert, remove) fed by any number of producers
//! - A threshold/flush protocol deciding when to drain
//! - A dedicated worker thread applying drained rows to a sink in bulk
//! - A producer handle with add/remove/flush/close

pub mod data;
pub mod handle;
pub mod queue;
pub mod worker;

use thiserror::Error;

use crate::sink::SinkError;

pub use data::{BatchData, StatementProvider};
pub use handle::BatchHandle;
pub use queue::{BatchQueue, RoleRow};
pub use worker::{DrainFailure, DrainStats, FailureHook, WorkerPhase};

/// Error type for batch worker lifecycle operations.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch threshold must be greater than zero")]
    InvalidThreshold,

    #[error("Worker has already been started")]
    AlreadyStarted,

    #[error("Worker is not running")]
    NotRunning,

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Worker thread panicked")]
    WorkerPanicked,
}
