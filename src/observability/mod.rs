//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing via tracing-subscriber
//! - OpenTelemetry metrics for commits, refreshes and workload rounds

pub mod metrics;
pub mod tracing;
