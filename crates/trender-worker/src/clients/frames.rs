//! Video frames sidecar: frame sampling and resolution upscaling.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use trender_pipeline::{ExtractedFrames, FrameService, PipelineError, PipelineResult, ResizedVideo};

use super::{check_status, endpoint, request_failed};

const SERVICE: &str = "Video frames service";

#[derive(Debug, Deserialize)]
struct FramesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    frames: Vec<String>,
    #[serde(default)]
    count: usize,
    #[serde(default)]
    duration_sec: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the frames sidecar.
#[derive(Clone)]
pub struct FramesClient {
    client: Client,
    base_url: String,
}

impl FramesClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

fn video_part(stage: &str, video: &[u8]) -> PipelineResult<Part> {
    Part::bytes(video.to_vec())
        .file_name("video.mp4")
        .mime_str("video/mp4")
        .map_err(|e| PipelineError::stage_failure(stage, format!("Invalid video part: {}", e)))
}

fn header_u32(response: &reqwest::Response, name: &str) -> u32 {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl FrameService for FramesClient {
    async fn extract_frames(&self, video: &[u8], interval_sec: f64) -> PipelineResult<ExtractedFrames> {
        let form = Form::new()
            .part("video", video_part("processing", video)?)
            .text("interval_sec", interval_sec.to_string());

        let response = self
            .client
            .post(endpoint(&self.base_url, "extract-frames"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_failed("processing", SERVICE, e))?;
        let response = check_status("processing", SERVICE, response).await?;

        let body: FramesResponse = response.json().await.map_err(|e| {
            PipelineError::stage_failure("processing", format!("Invalid frames response: {}", e))
        })?;

        if !body.success || body.frames.is_empty() {
            return Err(PipelineError::stage_failure(
                "processing",
                body.error
                    .unwrap_or_else(|| "No frames extracted from video".to_string()),
            ));
        }

        Ok(ExtractedFrames {
            count: body.count.max(body.frames.len()),
            frames: body.frames,
            duration_sec: body.duration_sec,
        })
    }

    async fn resize_if_needed(
        &self,
        video: &[u8],
        min_width: u32,
        target_width: u32,
    ) -> PipelineResult<Option<ResizedVideo>> {
        let form = Form::new()
            .part("video", video_part("resize", video)?)
            .text("min_width", min_width.to_string())
            .text("target_width", target_width.to_string());

        let response = self
            .client
            .post(endpoint(&self.base_url, "resize"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_failed("resize", SERVICE, e))?;
        let response = check_status("resize", SERVICE, response).await?;

        let resized = response
            .headers()
            .get("X-Resized")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if !resized {
            return Ok(None);
        }

        let original_width = header_u32(&response, "X-Original-Width");
        let new_width = header_u32(&response, "X-New-Width");
        let bytes = response
            .bytes()
            .await
            .map_err(|e| request_failed("resize", SERVICE, e))?;

        Ok(Some(ResizedVideo {
            bytes: bytes.to_vec(),
            original_width,
            new_width,
        }))
    }
}
