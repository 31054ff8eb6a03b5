//! Rolestore: load a role database through the batch worker.
//!
//! # Usage
//!
//! ```bash
//! rolestore --db-path ./data/roles.db --batch-threshold 1000 --producers 8
//! ```
//!
//! Environment variables can also be used:
//! - `ROLESTORE_DB_PATH`: Path to the SQLite database
//! - `ROLESTORE_BATCH_THRESHOLD`: Rows that trigger a drain pass
//! - `RUST_LOG`: Log filter (overrides `--log-level`)
//!
//! Each producer queues roles for its own range of members, the same shape of work as a
//! full guild scan. Ctrl+C stops the producers early; whatever was queued is still drained
//! before the report is printed.

use anyhow::Context;
use rolestore::batch::{BatchHandle, DrainStats};
use rolestore::config::Config;
use rolestore::observability::metrics::init_metrics_with_endpoint;
use rolestore::observability::tracing::init_tracing;
use rolestore::storage::{RoleStore, SqliteConnector};
use serde::Serialize;
use std::fs;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Role ids handed out by producers start here.
const ROLE_ID_BASE: u64 = 1000;

/// Summary printed once the worker has closed.
#[derive(Debug, Serialize)]
struct Report {
    rows_queued: u64,
    rows_stored: u64,
    elapsed_ms: u128,
    rows_per_second: f64,
    drain: DrainStats,
}

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  Rolestore v{} - batched member role storage

  Configuration:
    Database:   {}
    Threshold:  {}
    Producers:  {} x {} members x {} roles ({} rows)
    Flush:      {}
    Log Level:  {}

  Press Ctrl+C to stop producers early.
"#,
        version,
        config.db_path.display(),
        config.batch_threshold,
        config.producers,
        config.members_per_producer,
        config.roles_per_member,
        config.total_rows(),
        config
            .flush_interval()
            .map_or_else(|| "threshold only".to_string(), |d| format!("every {d:?}")),
        config.log_level
    );
}

/// Queue roles for one producer's members. Returns the number of rows queued.
fn produce(
    worker: &BatchHandle<SqliteConnector>,
    producer: u64,
    config: &Config,
    shutdown: &watch::Receiver<bool>,
) -> u64 {
    let first_member = producer * config.members_per_producer + 1;
    let mut queued = 0;

    for member in first_member..first_member + config.members_per_producer {
        if *shutdown.borrow() {
            tracing::info!(producer, queued, "Producer stopped early");
            break;
        }
        worker.add_member_roles(
            member,
            config.guild_id,
            ROLE_ID_BASE..ROLE_ID_BASE + config.roles_per_member,
        );
        queued += config.roles_per_member;
    }

    tracing::debug!(producer, queued, "Producer finished");
    queued
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse_args();

    init_tracing(&config.log_level, config.log_json);
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    if let Some(parent) = config.db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    print_banner(&config);

    let store = RoleStore::open(
        &config.db_path,
        config.reader_pool_size,
        config.batch_threshold,
    )
    .context("failed to open role store")?;
    let worker = Arc::new(store.batch_worker().context("failed to start batch worker")?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, stopping producers...");
            let _ = ctrl_c_tx.send(true);
        }
    });

    let ticker = config.flush_interval().map(|period| {
        let worker = Arc::clone(&worker);
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => worker.flush(),
                    _ = shutdown.changed() => break,
                }
            }
        })
    });

    let start = Instant::now();
    let producers = (0..config.producers).map(|producer| {
        let worker = Arc::clone(&worker);
        let config = config.clone();
        let shutdown = shutdown_rx.clone();
        tokio::task::spawn_blocking(move || produce(&worker, producer, &config, &shutdown))
    });
    let rows_queued: u64 = futures::future::try_join_all(producers)
        .await
        .context("producer task failed")?
        .into_iter()
        .sum();
    if rows_queued < config.total_rows() {
        tracing::warn!(
            rows_queued,
            expected = config.total_rows(),
            "Producers stopped before queueing every row"
        );
    }

    let _ = shutdown_tx.send(true);
    if let Some(ticker) = ticker {
        let _ = ticker.await;
    }

    let closing = Arc::clone(&worker);
    let drain = tokio::task::spawn_blocking(move || closing.close())
        .await
        .context("close task failed")?
        .context("batch worker failed to close")?;

    let elapsed = start.elapsed();
    let report = Report {
        rows_queued,
        rows_stored: store.role_count()?,
        elapsed_ms: elapsed.as_millis(),
        rows_per_second: drain.rows_applied() as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        drain,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    tracing::info!("Rolestore run complete");
    Ok(())
}
