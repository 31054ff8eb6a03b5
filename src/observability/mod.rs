//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via `tracing`
//! - OpenTelemetry metrics for drain passes, with optional OTLP export

pub mod metrics;
pub mod tracing;
