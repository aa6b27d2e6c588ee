//! Acquisition sidecar: reel metadata and video download.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use trender_models::ReelId;
use trender_pipeline::{PipelineError, PipelineResult, SourceMetadata, VideoSource};

use super::{check_status, endpoint, request_failed};

const SERVICE: &str = "Scraper service";

#[derive(Debug, Serialize)]
struct ShortcodeRequest<'a> {
    shortcode: &'a str,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    success: bool,
    #[serde(flatten)]
    metadata: SourceMetadata,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Client for the scraper sidecar.
#[derive(Clone)]
pub struct ScraperClient {
    client: Client,
    base_url: String,
}

impl ScraperClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl VideoSource for ScraperClient {
    async fn fetch_metadata(&self, reel_id: &ReelId) -> PipelineResult<Option<SourceMetadata>> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "metadata"))
            .json(&ShortcodeRequest { shortcode: reel_id.as_str() })
            .send()
            .await
            .map_err(|e| request_failed("metadata", SERVICE, e))?;
        let response = check_status("metadata", SERVICE, response).await?;

        let body: MetadataResponse = response.json().await.map_err(|e| {
            PipelineError::stage_failure("metadata", format!("Invalid metadata response: {}", e))
        })?;

        if !body.success {
            debug!(reel_id = %reel_id, "Scraper has no metadata for reel");
            return Ok(None);
        }
        Ok(Some(body.metadata))
    }

    async fn download(&self, reel_id: &ReelId) -> PipelineResult<Vec<u8>> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "download"))
            .json(&ShortcodeRequest { shortcode: reel_id.as_str() })
            .send()
            .await
            .map_err(|e| request_failed("download", SERVICE, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        // The sidecar answers with JSON `{error}` whenever it has no video.
        if !content_type.contains("video/mp4") {
            let message = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("Download failed: {}", status.as_u16()));
            return Err(PipelineError::stage_failure("download", message));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| request_failed("download", SERVICE, e))?;
        Ok(bytes.to_vec())
    }
}
