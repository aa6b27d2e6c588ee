//! Writes to a reel's durable processing state.

use std::sync::Arc;

use tracing::warn;

use trender_models::{ReelId, ReelStatus, VideoLocation};
use trender_store::Store;

use crate::error::PipelineResult;
use crate::logger::PipelineLogger;

/// Stage label used for status transition log rows.
pub const STATUS_STAGE: &str = "status";

/// Status and progress writer shared by the stage services.
///
/// Transitions are not validated; callers write them in order.
#[derive(Clone)]
pub struct ReelTracker {
    store: Arc<dyn Store>,
    logger: PipelineLogger,
}

impl ReelTracker {
    pub fn new(store: Arc<dyn Store>, logger: PipelineLogger) -> Self {
        Self { store, logger }
    }

    pub fn logger(&self) -> &PipelineLogger {
        &self.logger
    }

    /// Persist status and error message. `None` clears a previous error.
    pub async fn update_status(
        &self,
        reel_id: &ReelId,
        status: ReelStatus,
        error: Option<&str>,
    ) -> PipelineResult<()> {
        self.store.update_reel_status(reel_id, status, error).await?;
        self.logger
            .info(reel_id, STATUS_STAGE, format!("Status changed to: {}", status))
            .await;
        Ok(())
    }

    /// Persist the progress triple and bump last activity.
    pub async fn update_progress(
        &self,
        reel_id: &ReelId,
        stage: &str,
        percent: u8,
        message: &str,
    ) -> PipelineResult<()> {
        self.store
            .update_reel_progress(reel_id, stage, percent.min(100), message)
            .await?;
        Ok(())
    }

    /// Record where the video landed; marks the reel downloaded at 100%.
    pub async fn record_download(
        &self,
        reel_id: &ReelId,
        location: &VideoLocation,
    ) -> PipelineResult<()> {
        self.store.set_video_location(reel_id, location).await?;
        self.logger
            .info(
                reel_id,
                STATUS_STAGE,
                format!("Status changed to: {}", ReelStatus::Downloaded),
            )
            .await;
        Ok(())
    }

    /// Record a stage failure: progress back to 0 and status `failed`.
    ///
    /// Runs on the error path, so its own write errors are traced, not returned.
    pub async fn record_failure(&self, reel_id: &ReelId, stage: &str, message: &str) {
        if let Err(e) = self
            .update_progress(reel_id, stage, 0, &format!("Error: {}", message))
            .await
        {
            warn!(reel_id = %reel_id, error = %e, "Failed to reset progress after stage failure");
        }
        if let Err(e) = self
            .update_status(reel_id, ReelStatus::Failed, Some(message))
            .await
        {
            warn!(reel_id = %reel_id, error = %e, "Failed to mark reel as failed");
        }
    }
}
