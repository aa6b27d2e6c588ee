//! Element analysis provider.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use trender_models::AnalysisDraft;
use trender_pipeline::{ElementAnalyzer, ExtractedFrames, PipelineError, PipelineResult};

use super::{check_status, endpoint, request_failed};

const SERVICE: &str = "Analyzer service";
const STAGE: &str = "analyze";

/// Client for the analysis provider.
///
/// `POST /analyze/video` takes the video as multipart, `POST /analyze/frames`
/// takes the sampled frames as JSON. Both answer with an analysis draft.
#[derive(Clone)]
pub struct AnalyzerClient {
    client: Client,
    base_url: String,
}

impl AnalyzerClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn read_draft(response: reqwest::Response) -> PipelineResult<AnalysisDraft> {
        let response = check_status(STAGE, SERVICE, response).await?;
        response.json().await.map_err(|e| {
            PipelineError::stage_failure(STAGE, format!("Invalid analysis response: {}", e))
        })
    }
}

#[async_trait]
impl ElementAnalyzer for AnalyzerClient {
    async fn analyze_video(&self, video: &[u8], file_name: &str) -> PipelineResult<AnalysisDraft> {
        let part = Part::bytes(video.to_vec())
            .file_name(file_name.to_string())
            .mime_str("video/mp4")
            .map_err(|e| PipelineError::stage_failure(STAGE, format!("Invalid video part: {}", e)))?;

        let response = self
            .client
            .post(endpoint(&self.base_url, "analyze/video"))
            .multipart(Form::new().part("video", part))
            .send()
            .await
            .map_err(|e| request_failed(STAGE, SERVICE, e))?;

        Self::read_draft(response).await
    }

    async fn analyze_frames(&self, frames: &ExtractedFrames) -> PipelineResult<AnalysisDraft> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "analyze/frames"))
            .json(frames)
            .send()
            .await
            .map_err(|e| request_failed(STAGE, SERVICE, e))?;

        Self::read_draft(response).await
    }
}
