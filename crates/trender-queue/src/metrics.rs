//! Queue metrics.

use metrics::counter;

/// Metric name constants.
pub mod names {
    /// Job lifecycle events by queue and event.
    pub const JOB_EVENTS_TOTAL: &str = "queue_job_events_total";
}

/// Record a job lifecycle event (`added`, `completed`, `failed`, ...).
pub fn record_event(queue: &str, event: &'static str) {
    counter!(
        names::JOB_EVENTS_TOTAL,
        "queue" => queue.to_string(),
        "event" => event
    )
    .increment(1);
}
