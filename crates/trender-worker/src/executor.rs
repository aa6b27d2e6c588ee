//! Pipeline job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use trender_models::{
    AnalysisType, JobProgress, JobRecord, JobStatus, PipelineAction, PipelineJobData,
    PipelineResult as RunResult, PipelineRunRecord,
};
use trender_pipeline::{PipelineError, ReelPipeline};
use trender_queue::{FailOutcome, QueueJob, WorkQueue};
use trender_store::JobRecordRepository;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Pause after a failed poll before trying the queue again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Everything a spawned job needs.
struct JobContext {
    queue: Arc<dyn WorkQueue>,
    pipeline: ReelPipeline,
    records: Arc<dyn JobRecordRepository>,
}

/// Drains the reel pipeline queue into the state machine.
pub struct PipelineWorker {
    config: WorkerConfig,
    ctx: Arc<JobContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    worker_name: String,
}

impl PipelineWorker {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn WorkQueue>,
        pipeline: ReelPipeline,
        records: Arc<dyn JobRecordRepository>,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.concurrency));
        let (shutdown, _) = watch::channel(false);
        let worker_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            ctx: Arc::new(JobContext {
                queue,
                pipeline,
                records,
            }),
            job_semaphore,
            shutdown,
            worker_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.worker_name
    }

    /// Poll until shutdown, then wait for in-flight jobs up to the shutdown timeout.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            worker = %self.worker_name,
            queue = %self.ctx.queue.job_type().queue_name(),
            concurrency = self.config.concurrency,
            "Starting pipeline worker"
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping worker");
                break;
            }

            let pause = match self.dispatch_next().await {
                Ok(true) => None,
                Ok(false) => Some(self.config.poll_interval),
                Err(e) => {
                    error!(error = %e, "Failed to poll pipeline queue");
                    Some(ERROR_BACKOFF)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Shutdown timeout reached with jobs still running"
            );
        }

        info!("Pipeline worker stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Take one job and run it to completion on the current task.
    ///
    /// Returns false when no job was runnable.
    pub async fn run_once(&self) -> WorkerResult<bool> {
        match self.take_job().await? {
            Some(job) => {
                Self::execute_job(Arc::clone(&self.ctx), job).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Wait for a free slot, take a job and spawn it.
    async fn dispatch_next(&self) -> WorkerResult<bool> {
        let mut shutdown_rx = self.shutdown.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return Ok(false);
        }

        let permit = tokio::select! {
            permit = self.job_semaphore.clone().acquire_owned() => {
                permit.map_err(|_| WorkerError::job_failed("Semaphore closed"))?
            }
            _ = shutdown_rx.changed() => return Ok(false),
        };

        if *self.shutdown.borrow() {
            return Ok(false);
        }

        let Some(job) = self.take_job().await? else {
            return Ok(false);
        };

        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let concurrency = self.config.concurrency;
        metrics::set_in_flight(concurrency - semaphore.available_permits());

        tokio::spawn(async move {
            Self::execute_job(ctx, job).await;
            drop(permit);
            metrics::set_in_flight(concurrency - semaphore.available_permits());
        });
        Ok(true)
    }

    async fn take_job(&self) -> WorkerResult<Option<QueueJob>> {
        let promoted = self.ctx.queue.promote_delayed().await?;
        if promoted > 0 {
            debug!(promoted, "Promoted delayed jobs");
        }
        Ok(self.ctx.queue.take_next().await?)
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.concurrency {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Run one job and settle it in the queue. Never returns an error: every
    /// outcome ends as a completed or failed queue job.
    ///
    /// A durable record is written once, for the terminal outcome only. A job
    /// removed from the queue while it ran leaves no record behind.
    async fn execute_job(ctx: Arc<JobContext>, job: QueueJob) {
        let data: PipelineJobData = match serde_json::from_value(job.data.clone()) {
            Ok(data) => data,
            Err(e) => {
                let logger = JobLogger::unparsed(&job.id, &job.name);
                let err = WorkerError::invalid_payload(e.to_string());
                logger.log_error(&err.to_string());
                Self::fail_job(&ctx, &job, &err, &logger).await;
                return;
            }
        };

        let logger = JobLogger::new(&job.id, data.action, &data.reel_id);
        let started_at = Utc::now();
        let timer = Instant::now();
        logger.log_start(job.attempts_made);

        let progress = JobProgress::detailed(
            0.0,
            data.action.as_str(),
            format!("Starting {}", data.action),
        );
        if let Err(e) = ctx.queue.update_progress(&job.id, &progress).await {
            logger.log_warning(&format!("Failed to update job progress: {}", e));
        }

        let outcome = Self::run_action(&ctx.pipeline, &data)
            .instrument(logger.create_span())
            .await;
        let duration_ms = timer.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                // Completed jobs may be evicted from the queue right away, so
                // the record lands first.
                let mut record = run_record(&job, &data, JobStatus::Completed, started_at);
                record.result = Some(result.clone());
                Self::save_record(&ctx, record, &logger).await;

                let value = serde_json::to_value(&result).unwrap_or(Value::Null);
                let label = match ctx.queue.complete(&job.id, value).await {
                    Ok(true) => "completed",
                    Ok(false) => {
                        logger.log_warning("Job was removed while running, dropping its record");
                        Self::drop_record(&ctx, &job.id, &logger).await;
                        "cancelled"
                    }
                    Err(e) => {
                        logger.log_error(&format!("Failed to complete job: {}", e));
                        "completed"
                    }
                };
                metrics::record_job(logger.action(), label, duration_ms);
                logger.log_completion(duration_ms);
            }
            Err(e) => {
                let err = WorkerError::from(e);
                logger.log_error(&err.to_string());

                let outcome = Self::fail_job(&ctx, &job, &err, &logger).await;
                let label = match outcome {
                    Some(FailOutcome::Retrying { .. }) => "retrying",
                    Some(FailOutcome::Missing) => "cancelled",
                    _ => "failed",
                };
                // Only a final failure is recorded; retries stay queue-resident.
                if let Some(FailOutcome::Failed) = outcome {
                    let mut record = run_record(&job, &data, JobStatus::Failed, started_at);
                    record.error = Some(err.job_message());
                    Self::save_record(&ctx, record, &logger).await;
                }
                metrics::record_job(logger.action(), label, duration_ms);
            }
        }
    }

    async fn run_action(
        pipeline: &ReelPipeline,
        data: &PipelineJobData,
    ) -> Result<RunResult, PipelineError> {
        let reel_id = &data.reel_id;
        let mut result = RunResult::new(reel_id.clone());

        match data.action {
            PipelineAction::Process => {
                let template = pipeline.process_reel(reel_id, data.options).await?;
                result.analysis_id = Some(template.analysis_id.clone());
                result.template_id = Some(template.id);
            }
            PipelineAction::Download => {
                let location = pipeline.download_reel(reel_id).await?;
                result.video_location = Some(location.as_str().to_string());
            }
            PipelineAction::Analyze => {
                let analysis = pipeline.analyze_with(reel_id, analysis_mode(data)).await?;
                result.analysis_id = Some(analysis.id);
            }
        }
        Ok(result)
    }

    async fn fail_job(
        ctx: &JobContext,
        job: &QueueJob,
        err: &WorkerError,
        logger: &JobLogger,
    ) -> Option<FailOutcome> {
        let retryable = !err.is_permanent_failure();
        match ctx.queue.fail(&job.id, &err.job_message(), retryable).await {
            Ok(outcome) => {
                match outcome {
                    FailOutcome::Retrying { attempt, delay } => info!(
                        job_id = %job.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Job will be retried"
                    ),
                    FailOutcome::Failed => warn!(job_id = %job.id, retryable, "Job failed"),
                    FailOutcome::Missing => {
                        logger.log_warning("Job left the queue before it failed")
                    }
                }
                Some(outcome)
            }
            Err(e) => {
                logger.log_error(&format!("Failed to mark job as failed: {}", e));
                None
            }
        }
    }

    /// Durable record write. Failures are logged; the queue stays authoritative.
    async fn save_record(ctx: &JobContext, record: PipelineRunRecord, logger: &JobLogger) {
        if let Err(e) = ctx.records.save_job_record(&JobRecord::Pipeline(record)).await {
            logger.log_warning(&format!("Failed to save job record: {}", e));
        }
    }

    async fn drop_record(ctx: &JobContext, job_id: &str, logger: &JobLogger) {
        if let Err(e) = ctx.records.delete_pipeline_record(job_id).await {
            logger.log_warning(&format!("Failed to drop job record: {}", e));
        }
    }
}

/// Strategy for a standalone analyze job.
fn analysis_mode(data: &PipelineJobData) -> AnalysisType {
    match data.options.analysis_mode {
        Some(mode) => mode,
        None if data.options.use_frames => AnalysisType::Frames,
        None => AnalysisType::Standard,
    }
}

fn run_record(
    job: &QueueJob,
    data: &PipelineJobData,
    status: JobStatus,
    started_at: DateTime<Utc>,
) -> PipelineRunRecord {
    PipelineRunRecord {
        job_id: job.id.clone(),
        reel_id: data.reel_id.clone(),
        action: data.action,
        status,
        result: None,
        error: None,
        attempts: job.attempts_made,
        created_at: job.created_at,
        started_at: Some(started_at),
        finished_at: Some(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trender_models::{ProcessOptions, ReelId};

    #[test]
    fn test_analysis_mode_selection() {
        let data = PipelineJobData::new(ReelId::from("r1"), PipelineAction::Analyze);
        assert_eq!(analysis_mode(&data), AnalysisType::Standard);

        let frames = data.clone().with_options(ProcessOptions {
            use_frames: true,
            ..ProcessOptions::default()
        });
        assert_eq!(analysis_mode(&frames), AnalysisType::Frames);

        let enchanting = data.with_options(ProcessOptions {
            use_frames: true,
            analysis_mode: Some(AnalysisType::Enchanting),
            ..ProcessOptions::default()
        });
        assert_eq!(analysis_mode(&enchanting), AnalysisType::Enchanting);
    }
}
