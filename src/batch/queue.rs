//! Pending row queues shared between producers and the drain worker.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// A single unit of batched work: `attribute` applies to `subject` within `group`.
///
/// For role storage this is `(member_id, guild_id, role_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleRow {
    pub subject: u64,
    pub group: u64,
    pub attribute: u64,
}

impl RoleRow {
    pub const fn new(subject: u64, group: u64, attribute: u64) -> Self {
        Self {
            subject,
            group,
            attribute,
        }
    }
}

impl fmt::Display for RoleRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.group, self.attribute)
    }
}

impl From<(u64, u64, u64)> for RoleRow {
    fn from((subject, group, attribute): (u64, u64, u64)) -> Self {
        Self::new(subject, group, attribute)
    }
}

/// FIFO queue of [`RoleRow`]s guarded by its own lock.
///
/// Any number of producers may [`enqueue`](Self::enqueue) concurrently; a single consumer
/// removes prefixes with [`drain_up_to`](Self::drain_up_to).
#[derive(Debug, Default)]
pub struct BatchQueue {
    rows: Mutex<VecDeque<RoleRow>>,
}

impl BatchQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row to the back of the queue.
    pub fn enqueue(&self, row: RoleRow) {
        self.lock().push_back(row);
    }

    /// Remove and return up to `limit` rows from the front of the queue.
    ///
    /// When `unconditional` is true the limit is ignored and the whole queue is taken.
    /// Rows are returned in insertion order.
    pub fn drain_up_to(&self, limit: usize, unconditional: bool) -> Vec<RoleRow> {
        let mut rows = self.lock();
        let take = if unconditional {
            rows.len()
        } else {
            limit.min(rows.len())
        };
        rows.drain(..take).collect()
    }

    /// Current number of pending rows.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the queue holds no rows.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A producer panicking mid-push cannot leave the deque half-written, so a poisoned
    // lock still guards a consistent queue.
    fn lock(&self) -> MutexGuard<'_, VecDeque<RoleRow>> {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
