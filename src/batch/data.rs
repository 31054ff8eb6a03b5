//! Immutable configuration bundle for one batch worker.

use std::fmt;
use std::sync::Arc;

use super::queue::BatchQueue;
use super::BatchError;
use crate::sink::BatchOp;

/// Lazily produces statement text for the sink.
pub type StatementProvider = Arc<dyn Fn() -> String + Send + Sync>;

/// Everything a [`BatchHandle`](super::BatchHandle) needs: the sink connector, the two
/// queues, the statement providers and the drain threshold.
///
/// Nothing here touches the sink. Building a `BatchData` succeeds even if the store is
/// unreachable; connectivity is first required when the worker starts.
pub struct BatchData<C> {
    connector: C,
    insert_queue: Arc<BatchQueue>,
    remove_queue: Arc<BatchQueue>,
    insert_statement: StatementProvider,
    remove_statement: StatementProvider,
    threshold: usize,
}

impl<C> BatchData<C> {
    /// Create a bundle with fresh, empty queues.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidThreshold`] if `threshold` is zero.
    pub fn new<I, R>(
        connector: C,
        insert_statement: I,
        remove_statement: R,
        threshold: usize,
    ) -> Result<Self, BatchError>
    where
        I: Fn() -> String + Send + Sync + 'static,
        R: Fn() -> String + Send + Sync + 'static,
    {
        if threshold == 0 {
            return Err(BatchError::InvalidThreshold);
        }

        Ok(Self {
            connector,
            insert_queue: Arc::new(BatchQueue::new()),
            remove_queue: Arc::new(BatchQueue::new()),
            insert_statement: Arc::new(insert_statement),
            remove_statement: Arc::new(remove_statement),
            threshold,
        })
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn insert_queue(&self) -> &Arc<BatchQueue> {
        &self.insert_queue
    }

    pub fn remove_queue(&self) -> &Arc<BatchQueue> {
        &self.remove_queue
    }

    /// The queue feeding `op`.
    pub fn queue(&self, op: BatchOp) -> &Arc<BatchQueue> {
        match op {
            BatchOp::Insert => &self.insert_queue,
            BatchOp::Remove => &self.remove_queue,
        }
    }

    /// Evaluate the statement provider for `op`.
    pub fn statement(&self, op: BatchOp) -> String {
        match op {
            BatchOp::Insert => (self.insert_statement)(),
            BatchOp::Remove => (self.remove_statement)(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Combined number of rows pending in both queues.
    pub fn size(&self) -> usize {
        self.insert_queue.len() + self.remove_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Check if the combined size has reached the threshold.
    pub fn threshold_reached(&self) -> bool {
        self.size() >= self.threshold
    }
}

impl<C> fmt::Debug for BatchData<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchData")
            .field("insert_queue", &self.insert_queue.len())
            .field("remove_queue", &self.remove_queue.len())
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}
