//! Pipeline metrics.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Stage runs by stage and outcome.
    pub const STAGE_TOTAL: &str = "pipeline_stage_total";

    /// Stage duration in seconds by stage.
    pub const STAGE_DURATION_SECONDS: &str = "pipeline_stage_duration_seconds";

    /// Non-critical enrichment calls that failed and were skipped.
    pub const ENRICHMENT_DEGRADED_TOTAL: &str = "pipeline_enrichment_degraded_total";
}

/// Record a finished stage (`outcome` is `success` or `failure`).
pub fn record_stage(stage: &str, outcome: &'static str, duration_ms: u64) {
    counter!(
        names::STAGE_TOTAL,
        "stage" => stage.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage.to_string())
        .record(duration_ms as f64 / 1000.0);
}

/// Record a skipped enrichment (`metadata`, `resize`, `options`).
pub fn record_degraded(kind: &'static str) {
    counter!(names::ENRICHMENT_DEGRADED_TOTAL, "kind" => kind).increment(1);
}
