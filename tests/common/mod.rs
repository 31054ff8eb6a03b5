//! Test utilities for rolestore tests.
//!
//! Provides:
//! - A recording in-memory sink with failure injection and a pass gate
//! - Temporary database fixtures
//! - Polling helpers

#![allow(dead_code)]

use rolestore::batch::{BatchData, BatchHandle, RoleRow};
use rolestore::observability::tracing::init_test_tracing;
use rolestore::sink::{BatchOp, SinkConnection, SinkConnector, SinkError};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// One bulk operation as the sink saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub op: BatchOp,
    pub rows: Vec<RoleRow>,
}

#[derive(Debug, Default)]
struct LogInner {
    applied: Vec<Batch>,
    failed: Vec<Batch>,
    closed: bool,
}

/// Shared view of everything a [`RecordingConnector`]'s connection did.
#[derive(Debug, Clone, Default)]
pub struct SinkLog {
    inner: Arc<Mutex<LogInner>>,
}

impl SinkLog {
    pub fn applied(&self) -> Vec<Batch> {
        self.inner.lock().unwrap().applied.clone()
    }

    pub fn failed(&self) -> Vec<Batch> {
        self.inner.lock().unwrap().failed.clone()
    }

    /// Applied rows for `op`, concatenated in pass order.
    pub fn rows(&self, op: BatchOp) -> Vec<RoleRow> {
        self.applied()
            .into_iter()
            .filter(|b| b.op == op)
            .flat_map(|b| b.rows)
            .collect()
    }

    pub fn applied_rows(&self) -> usize {
        self.applied().iter().map(|b| b.rows.len()).sum()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

/// In-memory sink recording every bulk operation.
#[derive(Default)]
pub struct RecordingConnector {
    log: SinkLog,
    fail_connect: bool,
    fail_prepare: Option<BatchOp>,
    fail_op: Option<BatchOp>,
    gate: Mutex<Option<(SyncSender<()>, Receiver<()>)>>,
}

impl RecordingConnector {
    pub fn new() -> (Self, SinkLog) {
        let connector = Self::default();
        let log = connector.log.clone();
        (connector, log)
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_prepare(mut self, op: BatchOp) -> Self {
        self.fail_prepare = Some(op);
        self
    }

    /// Every bulk operation for `op` is rejected.
    pub fn failing_op(mut self, op: BatchOp) -> Self {
        self.fail_op = Some(op);
        self
    }

    /// Block the first bulk operation until the returned gate is released.
    ///
    /// `entered` receives a message once the first operation has started.
    pub fn gated(self) -> (Self, Gate) {
        let (entered_tx, entered_rx) = std::sync::mpsc::sync_channel(1);
        let (release_tx, release_rx) = std::sync::mpsc::sync_channel(1);
        *self.gate.lock().unwrap() = Some((entered_tx, release_rx));
        (
            self,
            Gate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

/// Test side of a gated sink.
pub struct Gate {
    entered: Receiver<()>,
    release: SyncSender<()>,
}

impl Gate {
    /// Wait until the first bulk operation is in flight.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(Duration::from_secs(5))
            .expect("bulk operation never started");
    }

    pub fn release(&self) {
        self.release.send(()).expect("sink connection gone");
    }
}

impl SinkConnector for RecordingConnector {
    type Connection = RecordingConnection;

    fn connect(&self) -> Result<Self::Connection, SinkError> {
        if self.fail_connect {
            return Err(SinkError::Rejected("sink unreachable".into()));
        }
        Ok(RecordingConnection {
            log: self.log.clone(),
            fail_prepare: self.fail_prepare,
            fail_op: self.fail_op,
            gate: self.gate.lock().unwrap().take(),
        })
    }
}

pub struct RecordingConnection {
    log: SinkLog,
    fail_prepare: Option<BatchOp>,
    fail_op: Option<BatchOp>,
    gate: Option<(SyncSender<()>, Receiver<()>)>,
}

impl SinkConnection for RecordingConnection {
    fn prepare(&mut self, op: BatchOp, _template: &str) -> Result<(), SinkError> {
        if self.fail_prepare == Some(op) {
            return Err(SinkError::Rejected(format!("bad {op} template")));
        }
        Ok(())
    }

    fn execute_batch(&mut self, op: BatchOp, rows: &[RoleRow]) -> Result<usize, SinkError> {
        if let Some((entered, release)) = self.gate.take() {
            let _ = entered.send(());
            let _ = release.recv();
        }

        let batch = Batch {
            op,
            rows: rows.to_vec(),
        };
        let mut log = self.log.inner.lock().unwrap();
        if self.fail_op == Some(op) {
            log.failed.push(batch);
            return Err(SinkError::Rejected(format!("{op} batch rejected")));
        }
        log.applied.push(batch);
        Ok(rows.len())
    }

    fn close(self) -> Result<(), SinkError> {
        self.log.inner.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Build an unstarted handle over a recording sink.
pub fn recording_worker(
    connector: RecordingConnector,
    threshold: usize,
) -> BatchHandle<RecordingConnector> {
    init_test_tracing();
    let data = BatchData::new(
        connector,
        || "INSERT".to_string(),
        || "DELETE".to_string(),
        threshold,
    )
    .expect("valid threshold");
    BatchHandle::new(data)
}

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub db_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("roles.db");
        Self { temp_dir, db_path }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `condition` on the current thread until it holds or `timeout` expires.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Async variant of [`wait_until`] for tokio tests.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
