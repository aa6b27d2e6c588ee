//! Conversions from queue jobs and durable records to [`UnifiedJobResponse`].

use trender_models::{
    clamp_percent, EntityRef, EntityType, GenerationRecord, GenerationResult, JobPayload,
    JobRecord, JobResult, JobStatus, JobType, PipelineJobData, PipelineRunRecord,
    ScrapeRunRecord, ScrapeResult, UnifiedJobResponse,
};
use trender_queue::QueueJob;

/// Map a live job using the owning queue's type.
pub fn from_queue_job(job: QueueJob, job_type: JobType) -> UnifiedJobResponse {
    let payload = JobPayload::decode(job_type, job.data);

    let stage = match job.progress.stage() {
        Some(stage) => stage.to_string(),
        None => match job_type {
            JobType::Pipeline => payload
                .declared_action()
                .unwrap_or(job_type.default_stage())
                .to_string(),
            _ => job_type.default_stage().to_string(),
        },
    };
    let message = job
        .progress
        .message()
        .unwrap_or(job_type.default_message())
        .to_string();
    let entity = payload.entity(job_type);

    UnifiedJobResponse {
        id: job.id,
        job_type,
        status: job.state.status(),
        progress: job.progress.percent(),
        stage,
        message,
        entity_id: None,
        entity_type: None,
        data: Some(payload),
        result: JobResult::decode(job_type, job.return_value),
        error: job.failed_reason,
        attempts: job.attempts_made,
        created_at: job.created_at,
        started_at: job.processed_at,
        finished_at: job.finished_at,
    }
    .with_entity(entity)
}

/// Map a durable record found under `job_id`.
pub fn from_record(record: JobRecord, job_id: &str) -> UnifiedJobResponse {
    match record {
        JobRecord::Scrape(r) => from_scrape_record(r, job_id),
        JobRecord::Pipeline(r) => from_pipeline_record(r),
        JobRecord::Generation(r) => from_generation_record(r, job_id),
    }
}

/// Historical jobs carry no granular progress; terminal ones report 100.
fn record_percent(status: JobStatus) -> u8 {
    if status.is_terminal() {
        100
    } else {
        0
    }
}

fn record_stage(status: JobStatus, job_type: JobType) -> String {
    if status.is_terminal() {
        status.as_str().to_string()
    } else {
        job_type.default_stage().to_string()
    }
}

fn record_message(status: JobStatus, error: Option<&str>, job_type: JobType) -> String {
    match (status, error) {
        (_, Some(error)) => error.to_string(),
        (JobStatus::Completed, None) => "Completed".to_string(),
        _ => job_type.default_message().to_string(),
    }
}

fn from_scrape_record(r: ScrapeRunRecord, job_id: &str) -> UnifiedJobResponse {
    let job_type = JobType::Scrape;
    let status = r.status.job_status();
    UnifiedJobResponse {
        id: job_id.to_string(),
        job_type,
        status,
        progress: record_percent(status),
        stage: record_stage(status, job_type),
        message: record_message(status, r.error.as_deref(), job_type),
        entity_id: None,
        entity_type: None,
        data: None,
        result: Some(JobResult::Scrape(ScrapeResult {
            reels_count: r.found,
            downloaded_count: r.downloaded,
        })),
        error: r.error,
        attempts: 1,
        created_at: r.created_at,
        started_at: None,
        finished_at: status.is_terminal().then_some(r.updated_at),
    }
    .with_entity(EntityRef::new(EntityType::Scrape, None))
}

fn from_pipeline_record(r: PipelineRunRecord) -> UnifiedJobResponse {
    let job_type = JobType::Pipeline;
    let stage = if r.status.is_terminal() {
        r.status.as_str().to_string()
    } else {
        r.action.as_str().to_string()
    };
    let entity = EntityRef::new(EntityType::Reel, Some(r.reel_id.to_string()));

    UnifiedJobResponse {
        id: r.job_id,
        job_type,
        status: r.status,
        progress: record_percent(r.status),
        stage,
        message: record_message(r.status, r.error.as_deref(), job_type),
        entity_id: None,
        entity_type: None,
        data: Some(JobPayload::Pipeline(PipelineJobData::new(r.reel_id, r.action))),
        result: r.result.map(JobResult::Pipeline),
        error: r.error,
        attempts: r.attempts,
        created_at: r.created_at,
        started_at: r.started_at,
        finished_at: r.finished_at,
    }
    .with_entity(entity)
}

fn from_generation_record(r: GenerationRecord, job_id: &str) -> UnifiedJobResponse {
    let job_type = JobType::VideoGen;
    let status = r.status.job_status();
    let progress = match r.progress {
        Some(p) => clamp_percent(p),
        None => record_percent(status),
    };

    UnifiedJobResponse {
        id: job_id.to_string(),
        job_type,
        status,
        progress,
        stage: r
            .progress_stage
            .clone()
            .unwrap_or_else(|| record_stage(status, job_type)),
        message: r
            .progress_message
            .clone()
            .unwrap_or_else(|| record_message(status, r.error.as_deref(), job_type)),
        entity_id: None,
        entity_type: None,
        data: None,
        result: Some(JobResult::Generation(GenerationResult {
            generation_id: r.id.clone(),
            video_url: r.video_url,
            s3_key: r.s3_key,
        })),
        error: r.error,
        attempts: 1,
        created_at: r.created_at,
        started_at: None,
        finished_at: r.completed_at,
    }
    .with_entity(EntityRef::new(EntityType::Generation, Some(r.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use trender_models::{
        GenerationStatus, JobProgress, PipelineAction, PipelineResult, QueueState, ReelId,
        ScrapeRunStatus,
    };

    fn job(id: &str, state: QueueState, data: serde_json::Value) -> QueueJob {
        let mut job = QueueJob::new(id, "job", data);
        job.state = state;
        job
    }

    #[test]
    fn test_structured_progress_wins() {
        let mut j = job("download-r1-1", QueueState::Active, json!({"reelId": "r1", "action": "download"}));
        j.progress = JobProgress::detailed(42.4, "uploading", "Uploading to storage...");

        let response = from_queue_job(j, JobType::Pipeline);
        assert_eq!(response.status, JobStatus::Running);
        assert_eq!(response.progress, 42);
        assert_eq!(response.stage, "uploading");
        assert_eq!(response.message, "Uploading to storage...");
        assert_eq!(response.entity_type, Some(EntityType::Reel));
        assert_eq!(response.entity_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_bare_progress_uses_defaults() {
        let mut j = job("analyze-r2-1", QueueState::Waiting, json!({"reelId": "r2", "action": "analyze"}));
        j.progress = JobProgress::Percent(250.0);

        let response = from_queue_job(j, JobType::Pipeline);
        assert_eq!(response.progress, 100);
        assert_eq!(response.stage, "analyze");
        assert_eq!(response.message, "processing video");

        let mut j = job("scrape-1", QueueState::Delayed, json!({}));
        j.progress = JobProgress::Percent(-3.0);
        let response = from_queue_job(j, JobType::Scrape);
        assert_eq!(response.progress, 0);
        assert_eq!(response.stage, "scraping");
        assert_eq!(response.message, "scraping in progress");
        assert_eq!(response.entity_type, Some(EntityType::Scrape));
        assert_eq!(response.entity_id, None);
    }

    #[test]
    fn test_pipeline_without_action_defaults_to_processing() {
        let response = from_queue_job(job("process-r3-1", QueueState::Unknown, json!({"reelId": "r3"})), JobType::Pipeline);
        assert_eq!(response.stage, "processing");
        assert_eq!(response.status, JobStatus::Pending);
        assert_eq!(response.entity_id.as_deref(), Some("r3"));
    }

    #[test]
    fn test_generation_job_links_generation() {
        let mut j = job("video-gen-g1-1", QueueState::Completed, json!({"generationId": "g1"}));
        j.return_value = json!({"generationId": "g1", "videoUrl": "https://cdn/g1.mp4"});

        let response = from_queue_job(j, JobType::VideoGen);
        assert_eq!(response.entity_type, Some(EntityType::Generation));
        assert_eq!(response.entity_id.as_deref(), Some("g1"));
        assert!(matches!(response.result, Some(JobResult::Generation(_))));
    }

    #[test]
    fn test_scrape_record() {
        let now = Utc::now();
        let record = JobRecord::Scrape(ScrapeRunRecord {
            job_id: "scrape-9".to_string(),
            status: ScrapeRunStatus::Completed,
            found: 12,
            downloaded: 10,
            error: None,
            created_at: now,
            updated_at: now,
        });

        let response = from_record(record, "scrape-9");
        assert_eq!(response.status, JobStatus::Completed);
        assert_eq!(response.progress, 100);
        assert_eq!(response.stage, "completed");
        assert_eq!(
            response.result,
            Some(JobResult::Scrape(ScrapeResult { reels_count: 12, downloaded_count: 10 }))
        );
        assert_eq!(response.finished_at, Some(now));
    }

    #[test]
    fn test_failed_pipeline_record() {
        let record = JobRecord::Pipeline(PipelineRunRecord {
            job_id: "process-r4-1".to_string(),
            reel_id: ReelId::from("r4"),
            action: PipelineAction::Process,
            status: JobStatus::Failed,
            result: Some(PipelineResult::new(ReelId::from("r4"))),
            error: Some("download failed: timeout".to_string()),
            attempts: 3,
            created_at: Utc::now(),
            started_at: None,
            finished_at: Some(Utc::now()),
        });

        let response = from_record(record, "process-r4-1");
        assert_eq!(response.progress, 100);
        assert_eq!(response.message, "download failed: timeout");
        assert_eq!(response.attempts, 3);
        assert_eq!(response.entity_id.as_deref(), Some("r4"));
    }

    #[test]
    fn test_generation_record_keeps_its_progress() {
        let record = JobRecord::Generation(GenerationRecord {
            id: "g2".to_string(),
            job_id: Some("video-gen-g2-1".to_string()),
            status: GenerationStatus::Processing,
            progress: Some(63.0),
            progress_stage: Some("rendering".to_string()),
            progress_message: None,
            video_url: None,
            s3_key: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        });

        let response = from_record(record, "video-gen-g2-1");
        assert_eq!(response.status, JobStatus::Running);
        assert_eq!(response.progress, 63);
        assert_eq!(response.stage, "rendering");
        assert_eq!(response.message, "generating video");
        assert_eq!(response.entity_id.as_deref(), Some("g2"));
    }
}
