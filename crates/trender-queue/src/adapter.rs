//! Queue adapter contract.
//!
//! [`QueueAdapter`] is the read/manage surface the job service consumes, one
//! per work queue. [`WorkQueue`] is the producer/worker surface used by the
//! processes that enqueue and execute jobs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use trender_models::{JobProgress, JobStatus, JobType, QueueState};

use crate::error::QueueResult;

/// A job as stored by its queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueJob {
    pub id: String,
    /// Job name given by the producer (usually the action)
    pub name: String,
    pub state: QueueState,
    /// Raw payload
    pub data: Value,
    pub progress: JobProgress,
    /// Raw return value, `Null` until completed
    pub return_value: Value,
    /// Number of times a worker has started this job
    pub attempts_made: u32,
    pub failed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl QueueJob {
    pub fn new(id: impl Into<String>, name: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: QueueState::Waiting,
            data,
            progress: JobProgress::default(),
            return_value: Value::Null,
            attempts_made: 0,
            failed_reason: None,
            created_at: Utc::now(),
            processed_at: None,
            finished_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }
}

/// Read and manage jobs of one queue.
#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// Logical type of every job in this queue.
    fn job_type(&self) -> JobType;

    /// Fetch a job by id. `Ok(None)` means the queue does not hold it.
    async fn get_job(&self, id: &str) -> QueueResult<Option<QueueJob>>;

    /// Jobs in any of `states`, newest first, windowed by `offset`/`limit`.
    async fn list_jobs(
        &self,
        states: &[QueueState],
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<QueueJob>>;

    /// Remove a job. Returns false if the queue does not hold it.
    async fn remove_job(&self, id: &str) -> QueueResult<bool>;

    /// Move a failed job back to waiting. Returns false unless the job is failed.
    async fn retry_job(&self, id: &str) -> QueueResult<bool>;
}

/// Options for enqueueing a job.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Hold the job in `delayed` for this long before it becomes runnable
    pub delay: Option<Duration>,
}

/// What happened to a job reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Re-scheduled into `delayed`; runnable again after `delay`
    Retrying { attempt: u32, delay: Duration },
    /// Moved to `failed` for good
    Failed,
    /// The job was no longer in the queue (removed or evicted)
    Missing,
}

/// Producer and worker operations.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Enqueue a job. Returns false if a job with this id already exists.
    async fn add(&self, id: &str, name: &str, data: Value, options: AddOptions) -> QueueResult<bool>;

    /// Atomically move the oldest waiting job to active and return it.
    async fn take_next(&self) -> QueueResult<Option<QueueJob>>;

    async fn update_progress(&self, id: &str, progress: &JobProgress) -> QueueResult<()>;

    /// Mark an active job completed. Returns false if it is no longer active.
    async fn complete(&self, id: &str, return_value: Value) -> QueueResult<bool>;

    /// Record a failed attempt. Retryable failures are re-scheduled with
    /// exponential backoff until attempts run out.
    async fn fail(&self, id: &str, reason: &str, retryable: bool) -> QueueResult<FailOutcome>;

    /// Move delayed jobs whose due time has passed back to waiting.
    async fn promote_delayed(&self) -> QueueResult<usize>;
}

/// Backoff before attempt `attempt + 1`: `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(2u32.pow(exp))
}
