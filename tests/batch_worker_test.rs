//! Batch worker behaviour against a recording sink.
//!
//! Tests:
//! - Threshold and flush triggers
//! - Unconditional drain on close
//! - Per-queue FIFO and exactly-once delivery under concurrent producers
//! - Sink failures and lifecycle misuse

mod common;

use common::{recording_worker, wait_for, wait_until, RecordingConnector};
use rolestore::batch::{BatchData, BatchError, BatchHandle, RoleRow, WorkerPhase};
use rolestore::sink::BatchOp;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(100);

/// Three rows with threshold 3: nothing drains until the third row arrives.
#[test]
fn test_threshold_triggers_drain() {
    let (connector, log) = RecordingConnector::new();
    let worker = recording_worker(connector, 3);
    worker.start().unwrap();

    worker.add_member_role(1, 1, 1).add_member_role(1, 1, 2);
    thread::sleep(SETTLE);
    assert!(log.applied().is_empty(), "below threshold must not drain");

    worker.add_member_role(1, 1, 3);
    assert!(wait_until(TIMEOUT, || log.applied().len() == 1));

    let applied = log.applied();
    let batch = &applied[0];
    assert_eq!(batch.op, BatchOp::Insert);
    assert_eq!(
        batch.rows,
        vec![RoleRow::new(1, 1, 1), RoleRow::new(1, 1, 2), RoleRow::new(1, 1, 3)]
    );
    assert!(wait_until(TIMEOUT, || worker.pending() == 0));

    let stats = worker.close().unwrap();
    assert_eq!(stats.passes, 2);
    assert_eq!(stats.flush_passes, 1);
    assert_eq!(log.applied().len(), 1, "close must not send empty batches");
}

/// The threshold counts both queues together.
#[test]
fn test_threshold_uses_combined_queues() {
    let (connector, log) = RecordingConnector::new();
    let worker = recording_worker(connector, 3);
    worker.start().unwrap();

    worker
        .add_member_role(1, 1, 1)
        .add_member_role(1, 1, 2)
        .remove_member_role(2, 1, 1);

    assert!(wait_until(TIMEOUT, || log.applied().len() == 2));
    assert_eq!(log.rows(BatchOp::Insert).len(), 2);
    assert_eq!(log.rows(BatchOp::Remove), vec![RoleRow::new(2, 1, 1)]);

    worker.close().unwrap();
}

/// Close with a high threshold drains the pending rows exactly once.
#[test]
fn test_close_drains_below_threshold() {
    let (connector, log) = RecordingConnector::new();
    let worker = recording_worker(connector, 100);
    worker.start().unwrap();

    worker.add_member_role(5, 1, 1).add_member_role(5, 1, 2);
    thread::sleep(SETTLE);
    assert!(log.applied().is_empty());

    let stats = worker.close().unwrap();
    assert_eq!(stats.passes, 1);
    assert_eq!(stats.flush_passes, 1);
    assert_eq!(stats.rows_inserted, 2);

    let applied = log.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].rows, vec![RoleRow::new(5, 1, 1), RoleRow::new(5, 1, 2)]);
    assert!(log.is_closed(), "connection must be released on close");
    assert_eq!(worker.phase(), WorkerPhase::Stopped);
}

/// Flush drains everything without stopping the worker.
#[test]
fn test_flush_drains_and_keeps_running() {
    let (connector, log) = RecordingConnector::new();
    let worker = recording_worker(connector, 100);
    worker.start().unwrap();

    worker
        .add_member_roles(1, 1, [1, 2])
        .remove_member_role(2, 1, 9);
    worker.flush();

    assert!(wait_until(TIMEOUT, || log.applied().len() == 2));
    assert!(wait_until(TIMEOUT, || worker.phase() == WorkerPhase::Waiting));
    assert!(worker.is_running());
    assert!(!log.is_closed());

    // A second flush with nothing queued sends nothing.
    worker.flush();
    thread::sleep(SETTLE);
    assert_eq!(log.applied().len(), 2);

    let stats = worker.close().unwrap();
    assert_eq!(stats.rows_applied(), 3);
}

/// Rows keep their queue order across passes and inside each bulk operation.
#[test]
fn test_per_queue_fifo() {
    let (connector, log) = RecordingConnector::new();
    let worker = recording_worker(connector, 4);
    worker.start().unwrap();

    for n in 0..50 {
        worker.add_member_role(1, 1, n);
        worker.remove_member_role(2, 1, n);
    }
    worker.close().unwrap();

    let expected_inserts: Vec<_> = (0..50).map(|n| RoleRow::new(1, 1, n)).collect();
    let expected_removes: Vec<_> = (0..50).map(|n| RoleRow::new(2, 1, n)).collect();
    assert_eq!(log.rows(BatchOp::Insert), expected_inserts);
    assert_eq!(log.rows(BatchOp::Remove), expected_removes);
}

/// Threshold passes never take more than `threshold` rows from a queue.
#[test]
fn test_threshold_pass_is_bounded() {
    let (connector, _log) = RecordingConnector::new();
    let (connector, gate) = connector.gated();
    let worker = recording_worker(connector, 2);
    worker.start().unwrap();

    worker.add_member_role(1, 1, 1).add_member_role(1, 1, 2);
    gate.wait_entered();

    // Queued while the pass is blocked, so no producer signal is sent.
    worker.add_member_roles(1, 1, [3, 4, 5, 6, 7]);
    gate.release();

    // The worker re-checks the threshold itself after the pass.
    assert!(wait_until(TIMEOUT, || worker.pending() < 2));
    assert_eq!(worker.pending(), 1);

    worker.close().unwrap();
}

/// Rows queued during an in-flight pass are drained without another signal.
#[test]
fn test_rows_queued_mid_pass_retrigger() {
    let (connector, log) = RecordingConnector::new();
    let (connector, gate) = connector.gated();
    let worker = recording_worker(connector, 2);
    worker.start().unwrap();

    worker.add_member_role(1, 1, 1).add_member_role(1, 1, 2);
    gate.wait_entered();
    worker.add_member_role(1, 1, 3).add_member_role(1, 1, 4);
    gate.release();

    assert!(wait_until(TIMEOUT, || log.applied_rows() == 4));
    let sizes: Vec<_> = log.applied().iter().map(|b| b.rows.len()).collect();
    assert_eq!(sizes, vec![2, 2]);

    worker.close().unwrap();
}

/// Close issued during an in-flight pass waits for it, then drains the rest.
#[test]
fn test_close_during_pass_drains_everything() {
    let (connector, log) = RecordingConnector::new();
    let (connector, gate) = connector.gated();
    let worker = Arc::new(recording_worker(connector, 2));
    worker.start().unwrap();

    worker.add_member_role(1, 1, 1).add_member_role(1, 1, 2);
    gate.wait_entered();
    worker.add_member_roles(1, 1, [3, 4, 5]);

    let closer = {
        let worker = Arc::clone(&worker);
        thread::spawn(move || worker.close())
    };
    thread::sleep(SETTLE);
    assert!(!closer.is_finished(), "close must wait for the in-flight pass");

    gate.release();
    let stats = closer.join().unwrap().unwrap();

    assert_eq!(stats.rows_inserted, 5);
    let expected: Vec<_> = (1..=5).map(|n| RoleRow::new(1, 1, n)).collect();
    assert_eq!(log.rows(BatchOp::Insert), expected);
    assert_eq!(worker.pending(), 0);
    assert!(log.is_closed());
}

/// An insert failure does not stop the remove batch or the worker.
#[test]
fn test_failed_batch_is_reported_and_worker_continues() {
    let (connector, log) = RecordingConnector::new();
    let connector = connector.failing_op(BatchOp::Insert);
    let failures = Arc::new(Mutex::new(Vec::new()));

    let data = BatchData::new(connector, String::new, String::new, 2).unwrap();
    let worker = {
        let failures = Arc::clone(&failures);
        BatchHandle::with_failure_hook(data, move |failure| {
            failures
                .lock()
                .unwrap()
                .push((failure.op, failure.rows.clone()));
        })
    };
    worker.start().unwrap();

    worker.add_member_role(1, 1, 1).remove_member_role(1, 1, 2);

    assert!(wait_until(TIMEOUT, || log.failed().len() == 1
        && log.applied().len() == 1));
    assert!(wait_until(TIMEOUT, || worker.phase() == WorkerPhase::Waiting));
    assert!(worker.is_running());
    assert_eq!(
        *failures.lock().unwrap(),
        vec![(BatchOp::Insert, vec![RoleRow::new(1, 1, 1)])]
    );

    // Failed rows are not re-queued; later passes still run.
    assert_eq!(worker.pending(), 0);
    worker.remove_member_role(3, 1, 3);
    let stats = worker.close().unwrap();

    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.rows_dropped, 1);
    assert_eq!(stats.rows_removed, 2);
    assert_eq!(log.rows(BatchOp::Remove).len(), 2);
}

/// Connection failure surfaces from start and leaves the worker stopped.
#[test]
fn test_connect_failure_fails_start() {
    let (connector, log) = RecordingConnector::new();
    let worker = recording_worker(connector.failing_connect(), 10);

    assert!(matches!(worker.start(), Err(BatchError::Sink(_))));
    assert_eq!(worker.phase(), WorkerPhase::Stopped);
    assert!(!worker.is_running());

    assert!(matches!(worker.start(), Err(BatchError::AlreadyStarted)));
    assert!(matches!(worker.close(), Err(BatchError::NotRunning)));
    assert!(!log.is_closed());
}

/// A template the sink cannot prepare fails start.
#[test]
fn test_prepare_failure_fails_start() {
    let (connector, _log) = RecordingConnector::new();
    let worker = recording_worker(connector.failing_prepare(BatchOp::Remove), 10);

    let err = worker.start().unwrap_err();
    assert!(err.to_string().contains("remove"), "unexpected error: {err}");
    assert_eq!(worker.phase(), WorkerPhase::Stopped);
}

/// Second close fails without running another pass; rows after close are dropped.
#[test]
fn test_second_close_is_rejected() {
    let (connector, log) = RecordingConnector::new();
    let worker = recording_worker(connector, 10);
    worker.start().unwrap();
    worker.add_member_role(1, 1, 1);

    let stats = worker.close().unwrap();
    assert_eq!(stats.passes, 1);

    worker.add_member_role(1, 1, 2);
    assert!(matches!(worker.close(), Err(BatchError::NotRunning)));
    assert_eq!(log.applied_rows(), 1);
    assert_eq!(worker.pending(), 0);
    assert_eq!(worker.rejected(), 1);
}

/// N producers x M rows reach the sink exactly once, in per-producer order.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_exactly_once() {
    const PRODUCERS: u64 = 8;
    const ROWS: u64 = 500;

    let (connector, log) = RecordingConnector::new();
    let worker = Arc::new(recording_worker(connector, 64));
    worker.start().unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let worker = Arc::clone(&worker);
            tokio::task::spawn_blocking(move || {
                for n in 0..ROWS {
                    if n % 2 == 0 {
                        worker.add_member_role(p, 1, n);
                    } else {
                        worker.remove_member_role(p, 1, n);
                    }
                }
            })
        })
        .collect();
    for producer in futures::future::join_all(producers).await {
        producer.expect("producer panicked");
    }

    let closing = Arc::clone(&worker);
    let stats = tokio::task::spawn_blocking(move || closing.close())
        .await
        .unwrap()
        .unwrap();
    assert!(wait_for(TIMEOUT, || log.is_closed()).await);

    let total = (PRODUCERS * ROWS) as usize;
    assert_eq!(stats.rows_applied(), total as u64);
    assert_eq!(log.applied_rows(), total);

    let mut seen = HashSet::new();
    for op in BatchOp::ALL {
        for row in log.rows(op) {
            assert!(seen.insert(row), "duplicate row {row}");
        }
    }
    assert_eq!(seen.len(), total);

    for p in 0..PRODUCERS {
        let inserts: Vec<u64> = log
            .rows(BatchOp::Insert)
            .into_iter()
            .filter(|r| r.subject == p)
            .map(|r| r.attribute)
            .collect();
        assert_eq!(inserts, (0..ROWS).step_by(2).collect::<Vec<_>>());
    }
}
