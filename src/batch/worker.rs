//! Background drain worker.
//!
//! One dedicated thread per [`BatchData`]. The thread owns the sink connection and sleeps on
//! a condition variable until a producer crosses the threshold, a flush is requested, or the
//! handle is closed. Sink calls run without the coordination lock held, so producers keep
//! enqueueing during a pass. A slow sink call still delays the next wake-up check.

use serde::Serialize;
use std::fmt;
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::data::BatchData;
use super::queue::RoleRow;
use crate::observability::metrics::{record_drain, record_drain_failure, record_queue_depth};
use crate::sink::{BatchOp, SinkConnection, SinkConnector, SinkError};

/// Lifecycle of a drain worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    /// Constructed, thread not started.
    #[default]
    Created,
    /// Blocked until there is work.
    Waiting,
    /// A drain pass is executing.
    Draining,
    /// Connection released, thread exited. Terminal.
    Stopped,
}

/// Counters accumulated by the worker over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainStats {
    /// Drain passes executed, including the final one.
    pub passes: u64,
    /// Passes that ignored the threshold (flush or close).
    pub flush_passes: u64,
    pub rows_inserted: u64,
    pub rows_removed: u64,
    /// Bulk operations the sink rejected.
    pub failed_batches: u64,
    /// Rows handed to a bulk operation that failed. They are not re-queued.
    pub rows_dropped: u64,
    pub spurious_wakeups: u64,
}

impl DrainStats {
    fn record_success(&mut self, op: BatchOp, rows: usize) {
        match op {
            BatchOp::Insert => self.rows_inserted += rows as u64,
            BatchOp::Remove => self.rows_removed += rows as u64,
        }
    }

    fn record_failure(&mut self, rows: usize) {
        self.failed_batches += 1;
        self.rows_dropped += rows as u64;
    }

    /// Rows successfully applied across both ops.
    pub fn rows_applied(&self) -> u64 {
        self.rows_inserted + self.rows_removed
    }
}

/// A bulk operation the sink rejected during a drain pass.
#[derive(Debug)]
pub struct DrainFailure {
    pub op: BatchOp,
    /// The rows that were drained for this operation, in queue order.
    pub rows: Vec<RoleRow>,
    pub error: SinkError,
}

impl fmt::Display for DrainFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batch of {} rows failed: {}",
            self.op,
            self.rows.len(),
            self.error
        )
    }
}

/// Callback invoked on the worker thread for each failed bulk operation.
pub type FailureHook = Arc<dyn Fn(&DrainFailure) + Send + Sync>;

/// Flags shared by producers and the worker, always read and written together.
#[derive(Debug, Default)]
pub(crate) struct WorkerState {
    pub(crate) running: bool,
    /// A pass is wanted or executing. Producers only signal while this is false.
    pub(crate) processing: bool,
    flush_requests: u64,
    flushes_served: u64,
    /// Rows refused because the worker had been closed.
    pub(crate) rows_rejected: u64,
    pub(crate) phase: WorkerPhase,
}

impl WorkerState {
    pub(crate) fn request_flush(&mut self) {
        self.flush_requests += 1;
    }

    pub(crate) fn flush_pending(&self) -> bool {
        self.flush_requests > self.flushes_served
    }

    /// Rows are accepted before start and while running. Once `close()` has cleared
    /// `running` nothing would drain them.
    pub(crate) fn accepts_rows(&self) -> bool {
        self.running || self.phase == WorkerPhase::Created
    }

    fn wants_pass(&self) -> bool {
        self.processing || self.flush_pending() || !self.running
    }
}

/// State shared between a [`BatchHandle`](super::BatchHandle) and its worker thread.
pub(crate) struct Shared<C> {
    pub(crate) data: BatchData<C>,
    state: Mutex<WorkerState>,
    pub(crate) wake: Condvar,
    failure_hook: Option<FailureHook>,
}

impl<C> Shared<C> {
    pub(crate) fn new(data: BatchData<C>, failure_hook: Option<FailureHook>) -> Self {
        Self {
            data,
            state: Mutex::new(WorkerState::default()),
            wake: Condvar::new(),
            failure_hook,
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker thread body.
///
/// Opens the connection and prepares both statements, reports readiness through `ready`,
/// then loops until the handle is closed. The last pass before exiting is always
/// unconditional.
pub(crate) fn run_worker<C: SinkConnector>(
    shared: Arc<Shared<C>>,
    ready: SyncSender<Result<(), SinkError>>,
) -> DrainStats {
    let mut conn = match open_connection(&shared.data) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open sink connection");
            shared.lock_state().phase = WorkerPhase::Stopped;
            let _ = ready.send(Err(e));
            return DrainStats::default();
        }
    };

    {
        let mut state = shared.lock_state();
        state.running = true;
        state.phase = WorkerPhase::Waiting;
    }
    tracing::debug!(threshold = shared.data.threshold(), "Worker ready");
    let _ = ready.send(Ok(()));

    let mut stats = DrainStats::default();
    let mut state = shared.lock_state();

    loop {
        while !state.wants_pass() {
            tracing::trace!("Waiting");
            state = shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);

            if !state.wants_pass() {
                stats.spurious_wakeups += 1;
                tracing::trace!("Spurious wakeup");
            }
        }

        let served = state.flush_requests;
        let unconditional = state.flush_pending() || !state.running;
        state.processing = true;
        state.phase = WorkerPhase::Draining;
        tracing::trace!(
            running = state.running,
            flush = unconditional,
            size = shared.data.size(),
            threshold = shared.data.threshold(),
            "Executing drain pass"
        );
        drop(state);

        drain_pass(&shared, &mut conn, unconditional, &mut stats);

        state = shared.lock_state();
        state.processing = false;
        state.flushes_served = served;

        if !state.running && !state.flush_pending() {
            break;
        }

        // Rows enqueued during the pass were not signalled because `processing` was set.
        if shared.data.threshold_reached() {
            state.processing = true;
        }
        state.phase = WorkerPhase::Waiting;
    }
    drop(state);

    tracing::debug!("Stopping worker...");
    if let Err(e) = conn.close() {
        tracing::warn!(error = %e, "Error while closing sink connection");
    }
    shared.lock_state().phase = WorkerPhase::Stopped;

    stats
}

fn open_connection<C: SinkConnector>(data: &BatchData<C>) -> Result<C::Connection, SinkError> {
    let mut conn = data.connector().connect()?;
    for op in BatchOp::ALL {
        conn.prepare(op, &data.statement(op))?;
    }
    Ok(conn)
}

/// Drain both queues once. A failed bulk operation is logged and reported but never stops
/// the pass or the worker.
fn drain_pass<C: SinkConnector>(
    shared: &Shared<C>,
    conn: &mut C::Connection,
    unconditional: bool,
    stats: &mut DrainStats,
) {
    stats.passes += 1;
    if unconditional {
        stats.flush_passes += 1;
    }

    let data = &shared.data;
    for op in BatchOp::ALL {
        let queue = data.queue(op);
        let initial_size = queue.len();
        let rows = queue.drain_up_to(data.threshold(), unconditional);
        if rows.is_empty() {
            continue;
        }

        tracing::trace!(
            queue = %op,
            rows = rows.len(),
            queue_len = initial_size,
            "Processing batch"
        );

        let start = Instant::now();
        match conn.execute_batch(op, &rows) {
            Ok(affected) => {
                let latency = start.elapsed().as_secs_f64();
                stats.record_success(op, rows.len());
                record_drain(op, rows.len(), latency);
                tracing::debug!(
                    queue = %op,
                    rows = rows.len(),
                    affected,
                    latency_ms = latency * 1000.0,
                    "Batch applied"
                );
            }
            Err(error) => {
                tracing::error!(queue = %op, rows = rows.len(), error = %error, "Error while processing queue");
                stats.record_failure(rows.len());
                record_drain_failure(op);
                if let Some(hook) = &shared.failure_hook {
                    hook(&DrainFailure { op, rows, error });
                }
            }
        }

        record_queue_depth(op, queue.len());
    }
}
