//! Contracts for the external services the stages call.
//!
//! Implementations live with the worker (HTTP sidecars) or in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use trender_models::{AnalysisDraft, DetectedElement, ReelId, RemixOption};

use crate::error::PipelineResult;

/// Metadata reported by the acquisition source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub comment_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// A video that was upscaled.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizedVideo {
    pub bytes: Vec<u8>,
    pub original_width: u32,
    pub new_width: u32,
}

/// Frames sampled from a video, base64-encoded JPEGs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExtractedFrames {
    pub frames: Vec<String>,
    pub count: usize,
    #[serde(default)]
    pub duration_sec: Option<f64>,
}

/// Remix options generated for one element, matched by element id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementOptions {
    pub id: String,
    #[serde(default)]
    pub remix_options: Vec<RemixOption>,
}

/// Acquisition sidecar.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// `None` when the source has nothing for this reel.
    async fn fetch_metadata(&self, reel_id: &ReelId) -> PipelineResult<Option<SourceMetadata>>;

    /// Raw MP4 bytes.
    async fn download(&self, reel_id: &ReelId) -> PipelineResult<Vec<u8>>;
}

/// Video frame tooling sidecar.
#[async_trait]
pub trait FrameService: Send + Sync {
    async fn extract_frames(&self, video: &[u8], interval_sec: f64) -> PipelineResult<ExtractedFrames>;

    /// `None` when the video is already wide enough.
    async fn resize_if_needed(
        &self,
        video: &[u8],
        min_width: u32,
        target_width: u32,
    ) -> PipelineResult<Option<ResizedVideo>>;
}

/// Analysis provider detecting elements in a video.
#[async_trait]
pub trait ElementAnalyzer: Send + Sync {
    async fn analyze_video(&self, video: &[u8], file_name: &str) -> PipelineResult<AnalysisDraft>;

    async fn analyze_frames(&self, frames: &ExtractedFrames) -> PipelineResult<AnalysisDraft>;
}

/// Enrichment provider generating remix options.
#[async_trait]
pub trait OptionsGenerator: Send + Sync {
    async fn generate_options(&self, elements: &[DetectedElement]) -> PipelineResult<Vec<ElementOptions>>;
}
