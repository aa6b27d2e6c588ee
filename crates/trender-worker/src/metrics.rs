//! Worker metrics and the Prometheus exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric name constants.
pub mod names {
    /// Finished jobs by action and outcome (`completed`, `retrying`, `failed`).
    pub const JOBS_TOTAL: &str = "worker_jobs_total";

    /// Job duration in seconds by action.
    pub const JOB_DURATION_SECONDS: &str = "worker_job_duration_seconds";

    /// Jobs currently executing.
    pub const JOBS_IN_FLIGHT: &str = "worker_jobs_in_flight";
}

pub fn record_job(action: &str, outcome: &'static str, duration_ms: u64) {
    counter!(
        names::JOBS_TOTAL,
        "action" => action.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(names::JOB_DURATION_SECONDS, "action" => action.to_string())
        .record(duration_ms as f64 / 1000.0);
}

pub fn set_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

/// Serve `/metrics` on `0.0.0.0:{port}`.
pub fn install_exporter(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to start metrics exporter: {}", e)))
}
