//! Download stage: fetch a reel's video and store it.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use trender_models::{Reel, ReelId, ReelMetadata, ReelStatus, VideoLocation};
use trender_store::Store;

use crate::collaborators::{FrameService, VideoSource};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::state::ReelTracker;
use crate::video::VideoVault;

const STAGE: &str = "download";

/// Fetches videos from the acquisition source into object storage or local disk.
#[derive(Clone)]
pub struct DownloadService {
    store: Arc<dyn Store>,
    tracker: ReelTracker,
    source: Arc<dyn VideoSource>,
    frames: Arc<dyn FrameService>,
    vault: VideoVault,
    config: PipelineConfig,
}

impl DownloadService {
    pub fn new(
        store: Arc<dyn Store>,
        tracker: ReelTracker,
        source: Arc<dyn VideoSource>,
        frames: Arc<dyn FrameService>,
        vault: VideoVault,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            source,
            frames,
            vault,
            config,
        }
    }

    /// Download the reel's video, moving it `downloading -> downloaded`.
    ///
    /// On failure the reel is marked `failed` with the error message and the
    /// error is returned.
    pub async fn download(&self, reel_id: &ReelId) -> PipelineResult<VideoLocation> {
        let reel = self
            .store
            .get_reel(reel_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("Reel {} not found", reel_id)))?;

        self.tracker
            .update_status(reel_id, ReelStatus::Downloading, None)
            .await?;
        self.tracker
            .update_progress(reel_id, STAGE, 0, "Starting download...")
            .await?;

        let timer = self
            .tracker
            .logger()
            .start_timer(reel_id, STAGE, "Downloading video")
            .await;

        match self.run(&reel).await {
            Ok((location, size)) => {
                timer
                    .stop(
                        "Download complete",
                        Some(json!({ "location": location.to_string(), "sizeBytes": size })),
                    )
                    .await;
                Ok(location)
            }
            Err(e) => {
                self.tracker
                    .record_failure(reel_id, STAGE, &e.reel_message())
                    .await;
                timer.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn run(&self, reel: &Reel) -> PipelineResult<(VideoLocation, usize)> {
        let reel_id = &reel.id;

        self.tracker
            .update_progress(reel_id, STAGE, 5, "Fetching metadata...")
            .await?;
        self.refresh_metadata(reel).await;

        self.tracker
            .update_progress(reel_id, STAGE, 15, "Downloading video...")
            .await?;
        let bytes = self.fetch_video(reel_id).await?;
        self.tracker
            .update_progress(
                reel_id,
                STAGE,
                50,
                &format!("Downloaded {:.2} MB", megabytes(bytes.len())),
            )
            .await?;

        self.tracker
            .update_progress(reel_id, STAGE, 55, "Checking resolution...")
            .await?;
        let bytes = self.resize(reel_id, bytes).await?;

        let size = bytes.len();
        self.tracker
            .update_progress(
                reel_id,
                STAGE,
                70,
                &format!("Video loaded ({:.2} MB)", megabytes(size)),
            )
            .await?;

        if self.vault.has_object_store() {
            self.tracker
                .update_progress(reel_id, "uploading", 80, "Uploading to storage...")
                .await?;
            match self.vault.upload(reel_id, bytes.clone()).await {
                Some(Ok(location)) => return self.finish(reel_id, location, size).await,
                Some(Err(e)) => {
                    warn!(reel_id = %reel_id, error = %e, "Upload failed, saving to local disk");
                    self.tracker
                        .logger()
                        .warn(reel_id, STAGE, format!("Upload failed, saving locally: {}", e))
                        .await;
                }
                None => {}
            }
        }

        self.tracker
            .update_progress(reel_id, STAGE, 90, "Saving to local disk...")
            .await?;
        let location = self
            .vault
            .write_local(folder_for(reel), reel_id, &bytes)
            .await?;
        self.finish(reel_id, location, size).await
    }

    async fn finish(
        &self,
        reel_id: &ReelId,
        location: VideoLocation,
        size: usize,
    ) -> PipelineResult<(VideoLocation, usize)> {
        self.tracker.record_download(reel_id, &location).await?;
        self.tracker
            .update_progress(reel_id, STAGE, 100, "Download complete")
            .await?;
        Ok((location, size))
    }

    /// Download with the configured hard timeout.
    async fn fetch_video(&self, reel_id: &ReelId) -> PipelineResult<Vec<u8>> {
        let timeout = self.config.download_timeout;
        let bytes = tokio::time::timeout(timeout, self.source.download(reel_id))
            .await
            .map_err(|_| {
                PipelineError::stage_failure(
                    STAGE,
                    format!("Download timed out after {}s", timeout.as_secs()),
                )
            })??;

        if bytes.is_empty() {
            return Err(PipelineError::stage_failure(STAGE, "Downloaded video is empty"));
        }
        Ok(bytes)
    }

    /// Refresh caption and engagement counts. Failures are logged and skipped.
    async fn refresh_metadata(&self, reel: &Reel) {
        let reel_id = &reel.id;
        let fetched = match self.source.fetch_metadata(reel_id).await {
            Ok(Some(fetched)) => fetched,
            Ok(None) => return,
            Err(e) => {
                metrics::record_degraded("metadata");
                self.tracker
                    .logger()
                    .warn(reel_id, STAGE, format!("Metadata fetch failed: {}", e))
                    .await;
                return;
            }
        };

        let metadata = ReelMetadata {
            caption: fetched.caption,
            author: fetched.author,
            thumbnail_url: fetched.thumbnail_url,
            duration: reel.metadata.duration,
            view_count: fetched.view_count,
            like_count: fetched.like_count,
            comment_count: fetched.comment_count,
        };
        if let Err(e) = self.store.update_reel_metadata(reel_id, &metadata).await {
            metrics::record_degraded("metadata");
            warn!(reel_id = %reel_id, error = %e, "Failed to save refreshed metadata");
        }
    }

    /// Upscale narrow videos. On failure the original bytes are kept.
    async fn resize(&self, reel_id: &ReelId, bytes: Vec<u8>) -> PipelineResult<Vec<u8>> {
        let resized = self
            .frames
            .resize_if_needed(
                &bytes,
                self.config.resize_min_width,
                self.config.resize_target_width,
            )
            .await;

        match resized {
            Ok(Some(resized)) => {
                self.tracker
                    .update_progress(
                        reel_id,
                        STAGE,
                        60,
                        &format!(
                            "Upscaled {}px → {}px",
                            resized.original_width, resized.new_width
                        ),
                    )
                    .await?;
                Ok(resized.bytes)
            }
            Ok(None) => Ok(bytes),
            Err(e) => {
                metrics::record_degraded("resize");
                self.tracker
                    .logger()
                    .warn(reel_id, STAGE, format!("Resize failed, keeping original: {}", e))
                    .await;
                Ok(bytes)
            }
        }
    }
}

/// Local folder for a reel's video: its acquisition source.
fn folder_for(reel: &Reel) -> &str {
    if reel.source.is_empty() {
        "reels"
    } else {
        &reel.source
    }
}

fn megabytes(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
