//! Repository contracts for the store of record.
//!
//! Method names are unique across traits so a `dyn Store` can call any of
//! them without disambiguation.

use async_trait::async_trait;

use trender_models::{
    Analysis, JobRecord, JobType, Reel, ReelId, ReelLog, ReelMetadata, ReelStatus, Template,
    VideoLocation,
};

use crate::error::StoreResult;

/// Reels and their processing state.
#[async_trait]
pub trait ReelRepository: Send + Sync {
    async fn get_reel(&self, id: &ReelId) -> StoreResult<Option<Reel>>;

    /// Fails with `AlreadyExists` if the id is taken.
    async fn create_reel(&self, reel: &Reel) -> StoreResult<()>;

    /// Overwrite status and error message.
    async fn update_reel_status(
        &self,
        id: &ReelId,
        status: ReelStatus,
        error: Option<&str>,
    ) -> StoreResult<()>;

    /// Write the progress triple and bump the last-activity timestamp.
    async fn update_reel_progress(
        &self,
        id: &ReelId,
        stage: &str,
        percent: u8,
        message: &str,
    ) -> StoreResult<()>;

    /// Record where the video lives and mark the reel `downloaded` at 100%.
    async fn set_video_location(&self, id: &ReelId, location: &VideoLocation) -> StoreResult<()>;

    /// Replace the source metadata (caption, counts, author, thumbnail).
    async fn update_reel_metadata(&self, id: &ReelId, metadata: &ReelMetadata) -> StoreResult<()>;

    async fn delete_reel(&self, id: &ReelId) -> StoreResult<()>;
}

/// Analysis artifacts.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    async fn get_analysis(&self, id: &str) -> StoreResult<Option<Analysis>>;

    /// Most recent analysis for the reel.
    async fn find_analysis_for_reel(&self, reel_id: &ReelId) -> StoreResult<Option<Analysis>>;

    /// All analyses for the reel, newest first.
    async fn list_analyses_for_reel(&self, reel_id: &ReelId) -> StoreResult<Vec<Analysis>>;

    async fn create_analysis(&self, analysis: &Analysis) -> StoreResult<()>;

    async fn delete_analysis(&self, id: &str) -> StoreResult<()>;
}

/// Template artifacts.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn get_template(&self, id: &str) -> StoreResult<Option<Template>>;

    async fn find_template_for_reel(&self, reel_id: &ReelId) -> StoreResult<Option<Template>>;

    async fn create_template(&self, template: &Template) -> StoreResult<()>;

    /// Deleting a template leaves its analysis in place.
    async fn delete_template(&self, id: &str) -> StoreResult<()>;
}

/// Durable projections of finished jobs.
#[async_trait]
pub trait JobRecordRepository: Send + Sync {
    async fn find_job_record(&self, job_type: JobType, job_id: &str) -> StoreResult<Option<JobRecord>>;

    /// Insert or replace.
    async fn save_job_record(&self, record: &JobRecord) -> StoreResult<()>;

    /// Drop the record of a pipeline run. Missing records are not an error.
    async fn delete_pipeline_record(&self, job_id: &str) -> StoreResult<()>;
}

/// Per-reel pipeline log rows.
#[async_trait]
pub trait ReelLogRepository: Send + Sync {
    async fn append_reel_log(&self, log: &ReelLog) -> StoreResult<()>;

    /// Newest first, at most `limit` rows.
    async fn list_reel_logs(&self, reel_id: &ReelId, limit: u32) -> StoreResult<Vec<ReelLog>>;

    /// Returns the number of rows removed.
    async fn delete_reel_logs(&self, reel_id: &ReelId) -> StoreResult<usize>;
}

/// The whole store of record.
pub trait Store:
    ReelRepository + AnalysisRepository + TemplateRepository + JobRecordRepository + ReelLogRepository
{
}

impl<T> Store for T where
    T: ReelRepository
        + AnalysisRepository
        + TemplateRepository
        + JobRecordRepository
        + ReelLogRepository
{
}
