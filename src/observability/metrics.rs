//! OpenTelemetry metrics for the batch worker.
//!
//! Key metrics:
//! - rolestore_rows_drained_total: Counter for rows applied by the sink
//! - rolestore_drain_failures_total: Counter for rejected bulk operations
//! - rolestore_drain_latency_seconds: Histogram for bulk operation latency
//! - rolestore_queue_depth: Gauge for rows left in a queue after a pass

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

use crate::sink::BatchOp;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Rolestore metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Total number of rows applied by the sink.
    pub rows_drained: Counter<u64>,
    /// Total number of bulk operations the sink rejected.
    pub drain_failures: Counter<u64>,
    /// Histogram of bulk operation latency in seconds.
    pub drain_latency: Histogram<f64>,
    /// Rows still queued after the most recent pass.
    pub queue_depth: Gauge<u64>,
}

impl Metrics {
    /// Create a new metrics registry from a meter.
    fn new(meter: &Meter) -> Self {
        Self {
            rows_drained: meter
                .u64_counter("rolestore_rows_drained_total")
                .with_description("Total number of rows applied by the sink")
                .with_unit("1")
                .init(),
            drain_failures: meter
                .u64_counter("rolestore_drain_failures_total")
                .with_description("Bulk operations rejected by the sink")
                .with_unit("1")
                .init(),
            drain_latency: meter
                .f64_histogram("rolestore_drain_latency_seconds")
                .with_description("Latency of one bulk operation")
                .with_unit("s")
                .init(),
            queue_depth: meter
                .u64_gauge("rolestore_queue_depth")
                .with_description("Rows left in a queue after a drain pass")
                .with_unit("1")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    install_manual_reader();
                }
            }
        } else {
            install_manual_reader();
        }

        let meter = global::meter("rolestore");
        Metrics::new(&meter)
    });
}

// Metrics are recorded but never exported.
fn install_manual_reader() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

fn op_attrs(op: BatchOp) -> [KeyValue; 1] {
    [KeyValue::new("op", op.as_str())]
}

/// Record a bulk operation the sink applied.
pub fn record_drain(op: BatchOp, rows: usize, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = op_attrs(op);
        m.rows_drained.add(rows as u64, &attrs);
        m.drain_latency.record(latency_seconds, &attrs);
    }
}

/// Record a bulk operation the sink rejected.
pub fn record_drain_failure(op: BatchOp) {
    if let Some(m) = METRICS.get() {
        m.drain_failures.add(1, &op_attrs(op));
    }
}

/// Record the rows still waiting in a queue.
pub fn record_queue_depth(op: BatchOp, depth: usize) {
    if let Some(m) = METRICS.get() {
        m.queue_depth.record(depth as u64, &op_attrs(op));
    }
}
