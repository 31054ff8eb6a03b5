//! Rolestore: write-coalescing persistence for member roles.
//!
//! Producers queue role inserts and removals from any thread; a dedicated worker thread
//! drains them into SQLite as bulk operations once a threshold is crossed or a flush is
//! requested, trading per-row latency for throughput.
//!
//! # Architecture
//!
//! - **Queue pair**: insert and remove FIFOs, each behind its own lock
//! - **Threshold protocol**: one coordination lock + condvar decides when to wake the worker
//! - **Drain worker**: owns the sink connection, one bulk operation per queue per pass
//! - **Fire-and-forget failures**: rejected batches are logged and reported, never retried
//!
//! # Modules
//!
//! - [`batch`]: Queues, worker and producer handle
//! - [`config`]: CLI and environment configuration
//! - [`observability`]: Metrics and tracing setup
//! - [`sink`]: Contract the worker drains into
//! - [`storage`]: SQLite sink, reader pool and role store

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // batch::BatchHandle is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::cast_possible_wrap,         // snowflake ids are bit-cast into SQLite integers
    clippy::cast_sign_loss
)]

pub mod batch;
pub mod config;
pub mod observability;
pub mod sink;
pub mod storage;

pub use batch::{BatchData, BatchError, BatchHandle, DrainStats, RoleRow, WorkerPhase};
pub use sink::{BatchOp, SinkConnection, SinkConnector, SinkError};
