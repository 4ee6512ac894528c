//! OpenTelemetry metrics implementation.
//!
//! Key metrics:
//! - listsync_commit_total: Counter for committed batches
//! - listsync_commit_latency_seconds: Histogram for commit latency on the writer
//! - listsync_commit_failures_total: Counter for rejected or failed commits
//! - listsync_refresh_failures_total: Counter for failed read-session refreshes
//! - listsync_workload_rounds_total: Counter for completed workload rounds
//! - listsync_records: Gauge for the record count after seeding

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Listsync metrics registry.
#[derive(Debug)]
pub struct Metrics {
    pub commit_total: Counter<u64>,
    pub commit_latency: Histogram<f64>,
    pub commit_failures: Counter<u64>,
    pub refresh_failures: Counter<u64>,
    pub workload_rounds: Counter<u64>,
    pub records: Gauge<i64>,
}

impl Metrics {
    /// Create a new metrics registry from a meter.
    fn new(meter: &Meter) -> Self {
        Self {
            commit_total: meter
                .u64_counter("listsync_commit_total")
                .with_description("Total number of committed batches")
                .with_unit("1")
                .init(),
            commit_latency: meter
                .f64_histogram("listsync_commit_latency_seconds")
                .with_description("Time spent applying a batch on the writer thread")
                .with_unit("s")
                .init(),
            commit_failures: meter
                .u64_counter("listsync_commit_failures_total")
                .with_description("Commits rejected or failed, by error kind")
                .with_unit("1")
                .init(),
            refresh_failures: meter
                .u64_counter("listsync_refresh_failures_total")
                .with_description("Read session refreshes that failed")
                .with_unit("1")
                .init(),
            workload_rounds: meter
                .u64_counter("listsync_workload_rounds_total")
                .with_description("Scheduled update rounds completed")
                .with_unit("1")
                .init(),
            records: meter
                .i64_gauge("listsync_records")
                .with_description("Number of records in the store")
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
                    set_manual_provider();
                }
            }
        } else {
            // Metrics are recorded but not exported
            set_manual_provider();
        }

        let meter = global::meter("listsync");
        Metrics::new(&meter)
    });
}

fn set_manual_provider() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Record a committed batch.
pub fn record_commit(kind: &'static str, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new("kind", kind)];
        m.commit_total.add(1, &attrs);
        m.commit_latency.record(latency_seconds, &attrs);
    }
}

/// Record a commit that did not apply.
pub fn record_commit_failure(error_kind: &'static str) {
    if let Some(m) = METRICS.get() {
        m.commit_failures
            .add(1, &[KeyValue::new("error", error_kind)]);
    }
}

/// Record a read session refresh that failed.
pub fn record_refresh_failure() {
    if let Some(m) = METRICS.get() {
        m.refresh_failures.add(1, &[]);
    }
}

/// Record a completed workload round.
pub fn record_workload_round(records_touched: usize) {
    if let Some(m) = METRICS.get() {
        m.workload_rounds
            .add(1, &[KeyValue::new("batch_size", records_touched as i64)]);
    }
}

/// Record the current number of records.
pub fn record_record_count(count: u64) {
    if let Some(m) = METRICS.get() {
        m.records.record(count as i64, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
        assert!(METRICS.get().is_some());
    }

    #[test]
    fn test_recorders_do_not_panic() {
        init_metrics();
        record_commit("update", 0.002);
        record_commit_failure("conflict");
        record_refresh_failure();
        record_workload_round(500);
        record_record_count(3000);
    }
}
