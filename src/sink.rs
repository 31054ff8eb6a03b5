//! Contract between the batch worker and the store that receives its bulk operations.
//!
//! The worker only ever talks to a [`SinkConnection`] from its own thread. A connector is
//! cheap to hold and does no I/O until [`SinkConnector::connect`] is called from
//! [`BatchHandle::start`](crate::batch::BatchHandle::start).

use std::fmt;
use thiserror::Error;

use crate::batch::RoleRow;

/// Which queue a bulk operation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchOp {
    Insert,
    Remove,
}

impl BatchOp {
    pub const ALL: [BatchOp; 2] = [BatchOp::Insert, BatchOp::Remove];

    pub fn as_str(self) -> &'static str {
        match self {
            BatchOp::Insert => "insert",
            BatchOp::Remove => "remove",
        }
    }
}

impl fmt::Display for BatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failure reported by the store behind the connection.
    #[error("Sink backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("no {0} statement has been prepared")]
    NotPrepared(BatchOp),

    #[error("Sink rejected batch: {0}")]
    Rejected(String),
}

impl SinkError {
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SinkError::Backend(Box::new(error))
    }
}

/// Opens connections to the backing store.
pub trait SinkConnector: Send + Sync + 'static {
    type Connection: SinkConnection;

    /// Open a connection. Called once, on the worker thread.
    fn connect(&self) -> Result<Self::Connection, SinkError>;
}

/// A live connection owned by the drain worker.
pub trait SinkConnection: Send + 'static {
    /// Prepare the statement used for `op`. Both ops are prepared before the worker
    /// reports ready, so a bad template fails `start()`.
    fn prepare(&mut self, op: BatchOp, template: &str) -> Result<(), SinkError>;

    /// Apply every row as one bulk unit. Returns the number of rows the store reported
    /// as affected.
    fn execute_batch(&mut self, op: BatchOp, rows: &[RoleRow]) -> Result<usize, SinkError>;

    /// Release the connection and any prepared statements.
    fn close(self) -> Result<(), SinkError>
    where
        Self: Sized;
}
