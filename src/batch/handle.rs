//! Producer-facing handle for a batch worker.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use super::data::BatchData;
use super::queue::RoleRow;
use super::worker::{run_worker, DrainFailure, DrainStats, FailureHook, Shared, WorkerPhase};
use super::BatchError;
use crate::sink::{BatchOp, SinkConnector};

const WORKER_THREAD_NAME: &str = "rolestore-batch-worker";

/// Queues role inserts and removals and hands them to a background worker in bulk.
///
/// Share it between producers behind an `Arc`. Every method takes `&self`; the add and
/// remove calls only block for as long as it takes to append to a queue.
///
/// ```no_run
/// # use rolestore::storage::RoleStore;
/// # fn demo(store: &RoleStore) -> Result<(), Box<dyn std::error::Error>> {
/// let worker = store.batch_worker()?;
/// worker
///     .add_member_role(10, 1, 100)
///     .add_member_role(10, 1, 101)
///     .remove_member_role(11, 1, 100);
/// let stats = worker.close()?;
/// assert_eq!(stats.rows_applied(), 3);
/// # Ok(())
/// # }
/// ```
pub struct BatchHandle<C: SinkConnector> {
    shared: Arc<Shared<C>>,
    thread: Mutex<Option<JoinHandle<DrainStats>>>,
    started: Mutex<bool>,
}

impl<C: SinkConnector> BatchHandle<C> {
    /// Create a handle in the `Created` phase. Nothing runs until [`start`](Self::start).
    pub fn new(data: BatchData<C>) -> Self {
        Self::build(data, None)
    }

    /// Create a handle that reports every failed bulk operation to `hook`.
    ///
    /// The hook runs on the worker thread between bulk operations, so it should be quick.
    pub fn with_failure_hook<F>(data: BatchData<C>, hook: F) -> Self
    where
        F: Fn(&DrainFailure) + Send + Sync + 'static,
    {
        let hook: FailureHook = Arc::new(hook);
        Self::build(data, Some(hook))
    }

    fn build(data: BatchData<C>, hook: Option<FailureHook>) -> Self {
        Self {
            shared: Arc::new(Shared::new(data, hook)),
            thread: Mutex::new(None),
            started: Mutex::new(false),
        }
    }

    /// Start the worker thread.
    ///
    /// Returns once the worker has connected to the sink, prepared both statements and is
    /// waiting for work.
    ///
    /// # Errors
    ///
    /// - [`BatchError::AlreadyStarted`] if called more than once, including after a failed start.
    /// - [`BatchError::Sink`] if the connection or a statement could not be prepared.
    pub fn start(&self) -> Result<(), BatchError> {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if *started {
            return Err(BatchError::AlreadyStarted);
        }
        *started = true;

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(shared, ready_tx))
            .map_err(|e| {
                self.shared.lock_state().phase = WorkerPhase::Stopped;
                BatchError::Spawn(e)
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                tracing::debug!(thread = WORKER_THREAD_NAME, "Batch worker started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(BatchError::Sink(e))
            }
            Err(_) => {
                let _ = handle.join();
                self.shared.lock_state().phase = WorkerPhase::Stopped;
                Err(BatchError::WorkerPanicked)
            }
        }
    }

    /// Queue a role to be added to a member.
    pub fn add_member_role(&self, member: u64, guild: u64, role: u64) -> &Self {
        self.enqueue(BatchOp::Insert, RoleRow::new(member, guild, role))
    }

    /// Queue a role to be removed from a member.
    pub fn remove_member_role(&self, member: u64, guild: u64, role: u64) -> &Self {
        self.enqueue(BatchOp::Remove, RoleRow::new(member, guild, role))
    }

    /// Queue several roles for one member. Not atomic: a drain may run part way through.
    pub fn add_member_roles<I>(&self, member: u64, guild: u64, roles: I) -> &Self
    where
        I: IntoIterator<Item = u64>,
    {
        for role in roles {
            self.add_member_role(member, guild, role);
        }
        self
    }

    /// Queue several role removals for one member. Not atomic.
    pub fn remove_member_roles<I>(&self, member: u64, guild: u64, roles: I) -> &Self
    where
        I: IntoIterator<Item = u64>,
    {
        for role in roles {
            self.remove_member_role(member, guild, role);
        }
        self
    }

    fn enqueue(&self, op: BatchOp, row: RoleRow) -> &Self {
        let mut state = self.shared.lock_state();
        if !state.accepts_rows() {
            if state.rows_rejected == 0 {
                tracing::warn!(queue = %op, %row, "Batch worker is closed, dropping rows");
            } else {
                tracing::trace!(queue = %op, %row, "Dropped row after close");
            }
            state.rows_rejected += 1;
            return self;
        }
        self.shared.data.queue(op).enqueue(row);

        if !state.processing && self.shared.data.threshold_reached() {
            tracing::trace!(
                size = self.shared.data.size(),
                threshold = self.shared.data.threshold(),
                "Threshold reached, waking worker"
            );
            state.processing = true;
            drop(state);
            self.shared.wake.notify_one();
        }
        self
    }

    /// Ask the worker to drain both queues regardless of the threshold.
    ///
    /// Does not wait for the drain to happen.
    pub fn flush(&self) {
        let mut state = self.shared.lock_state();
        tracing::debug!("Flagging worker for flushing");
        state.request_flush();
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Stop the worker, draining everything queued so far.
    ///
    /// Blocks until the worker thread has exited and returns its lifetime statistics.
    ///
    /// # Errors
    ///
    /// - [`BatchError::NotRunning`] if the worker was never started or is already closed.
    /// - [`BatchError::WorkerPanicked`] if the worker thread panicked.
    pub fn close(&self) -> Result<DrainStats, BatchError> {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BatchError::NotRunning)?;

        {
            let mut state = self.shared.lock_state();
            tracing::trace!(
                running = state.running,
                processing = state.processing,
                flush = state.flush_pending(),
                "Sending worker shutdown"
            );
            state.request_flush();
            state.running = false;
        }
        self.shared.wake.notify_all();

        handle.join().map_err(|_| {
            self.shared.lock_state().phase = WorkerPhase::Stopped;
            BatchError::WorkerPanicked
        })
    }

    /// Whether the worker is accepting and draining rows.
    pub fn is_running(&self) -> bool {
        self.shared.lock_state().running
    }

    /// Current lifecycle phase of the worker.
    pub fn phase(&self) -> WorkerPhase {
        self.shared.lock_state().phase
    }

    /// Rows waiting in both queues.
    pub fn pending(&self) -> usize {
        self.shared.data.size()
    }

    /// Rows dropped because they arrived after `close()`.
    pub fn rejected(&self) -> u64 {
        self.shared.lock_state().rows_rejected
    }

    pub fn threshold(&self) -> usize {
        self.shared.data.threshold()
    }
}

impl<C: SinkConnector> Drop for BatchHandle<C> {
    fn drop(&mut self) {
        let running = self
            .thread
            .get_mut()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        if running {
            if let Err(e) = self.close() {
                tracing::warn!(error = %e, "Batch worker did not shut down cleanly on drop");
            }
        }
    }
}
