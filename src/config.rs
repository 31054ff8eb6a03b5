//! Configuration parsing for the rolestore binary.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::builder::TypedValueParser;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::DEFAULT_BATCH_THRESHOLD;

/// Rolestore: write-coalescing member role storage.
#[derive(Parser, Debug, Clone)]
#[command(name = "rolestore")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Path to the SQLite role database
    #[arg(short, long, env = "ROLESTORE_DB_PATH", default_value = "./data/roles.db")]
    pub db_path: PathBuf,

    /// Combined queue size that triggers a drain pass
    #[arg(short = 't', long, env = "ROLESTORE_BATCH_THRESHOLD", default_value_t = DEFAULT_BATCH_THRESHOLD,
          value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize))]
    pub batch_threshold: usize,

    /// Size of the reader connection pool
    #[arg(long, env = "ROLESTORE_READER_POOL_SIZE", default_value_t = 4)]
    pub reader_pool_size: u32,

    /// Flush the queues on this interval in milliseconds (0 disables)
    #[arg(long, env = "ROLESTORE_FLUSH_INTERVAL_MS", default_value_t = 0)]
    pub flush_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ROLESTORE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "ROLESTORE_LOG_JSON")]
    pub log_json: bool,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// Number of concurrent producers feeding the worker
    #[arg(short, long, env = "ROLESTORE_PRODUCERS", default_value_t = 4)]
    pub producers: u64,

    /// Members each producer enqueues roles for
    #[arg(long, env = "ROLESTORE_MEMBERS_PER_PRODUCER", default_value_t = 1000)]
    pub members_per_producer: u64,

    /// Roles given to each member
    #[arg(long, env = "ROLESTORE_ROLES_PER_MEMBER", default_value_t = 5)]
    pub roles_per_member: u64,

    /// Guild id the generated roles belong to
    #[arg(long, env = "ROLESTORE_GUILD_ID", default_value_t = 1)]
    pub guild_id: u64,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Periodic flush interval, if enabled.
    pub fn flush_interval(&self) -> Option<Duration> {
        (self.flush_interval_ms > 0).then(|| Duration::from_millis(self.flush_interval_ms))
    }

    /// Rows the configured producers will enqueue in total.
    pub fn total_rows(&self) -> u64 {
        self.producers * self.members_per_producer * self.roles_per_member
    }

    /// Create a small configuration for testing.
    #[cfg(test)]
    pub fn test_config(db_path: PathBuf) -> Self {
        Self {
            db_path,
            batch_threshold: 10,
            reader_pool_size: 2,
            log_level: "debug".into(),
            producers: 2,
            members_per_producer: 10,
            roles_per_member: 3,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/roles.db"),
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            reader_pool_size: 4,
            flush_interval_ms: 0,
            log_level: "info".into(),
            log_json: false,
            otel_endpoint: None,
            producers: 4,
            members_per_producer: 1000,
            roles_per_member: 5,
            guild_id: 1,
        }
    }
}
