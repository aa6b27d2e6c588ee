//! Structured job logging utilities.
//!
//! Every line carries the job id, the pipeline action and the reel, so one
//! job can be followed through the worker logs.

use tracing::{error, info, warn, Span};

use trender_models::{PipelineAction, ReelId};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    action: String,
    reel_id: String,
}

impl JobLogger {
    pub fn new(job_id: &str, action: PipelineAction, reel_id: &ReelId) -> Self {
        Self {
            job_id: job_id.to_string(),
            action: action.as_str().to_string(),
            reel_id: reel_id.to_string(),
        }
    }

    /// Logger for a job whose payload could not be read.
    pub fn unparsed(job_id: &str, name: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            action: name.to_string(),
            reel_id: String::new(),
        }
    }

    pub fn log_start(&self, attempt: u32) {
        info!(
            job_id = %self.job_id,
            action = %self.action,
            reel_id = %self.reel_id,
            attempt,
            "Job started"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            action = %self.action,
            reel_id = %self.reel_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            action = %self.action,
            reel_id = %self.reel_id,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, duration_ms: u64) {
        info!(
            job_id = %self.job_id,
            action = %self.action,
            reel_id = %self.reel_id,
            duration_ms,
            "Job completed"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Span wrapping the whole job, so pipeline logs inherit the job id.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            action = %self.action,
            reel_id = %self.reel_id
        )
    }
}
