use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the idempotency gate.
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_gate_outcome(&self, outcome: &str) {
        counter!("idempotency_requests_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_downstream_latency(&self, duration_ms: f64, success: bool) {
        histogram!("idempotency_downstream_duration_ms", "success" => success.to_string()).record(duration_ms);
    }

    pub fn record_poll_wait(&self, polls: u32, found: bool) {
        histogram!("idempotency_poll_attempts", "found" => found.to_string()).record(polls as f64);
    }

    pub fn record_lock_overrun(&self) {
        counter!("idempotency_lock_overruns_total").increment(1);
    }

    pub fn record_store_operation(&self, operation: &str, duration_ms: f64, success: bool) {
        counter!("store_operations_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("store_operation_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    describe_metrics();

    METRICS.get_or_init(Metrics::new);

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("idempotency_requests_total", Unit::Count, "Requests seen by the idempotency gate, by outcome");
    describe_histogram!("idempotency_downstream_duration_ms", Unit::Milliseconds, "First-attempt downstream latency in milliseconds");
    describe_histogram!("idempotency_poll_attempts", Unit::Count, "Cache polls made by duplicate in-flight requests");
    describe_counter!("idempotency_lock_overruns_total", Unit::Count, "First attempts that ran longer than the lock TTL");

    describe_counter!("store_operations_total", Unit::Count, "Total shared store operations");
    describe_histogram!("store_operation_duration_ms", Unit::Milliseconds, "Shared store operation latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
