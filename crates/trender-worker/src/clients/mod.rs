//! HTTP clients for the stage sidecars.
//!
//! Each client implements one of the pipeline's collaborator traits and
//! reports failures as stage failures, so the pipeline decides whether a
//! failure degrades the stage or fails it.

mod analyzer;
mod enrichment;
mod frames;
mod scraper;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};
use tracing::info;

use trender_pipeline::{OptionsGenerator, PipelineError, StageServices};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

pub use analyzer::AnalyzerClient;
pub use enrichment::EnrichmentClient;
pub use frames::FramesClient;
pub use scraper::ScraperClient;

/// Build the shared HTTP client.
pub fn http_client(timeout: Duration) -> WorkerResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| WorkerError::config_error(format!("Failed to build HTTP client: {}", e)))
}

/// Wire every stage collaborator to its sidecar.
///
/// Enrichment stays unset without `ENRICHMENT_SERVICE_URL`; enchanting
/// analysis then fails its precondition check.
pub fn stage_services(config: &WorkerConfig) -> WorkerResult<StageServices> {
    let client = http_client(config.request_timeout)?;

    let options = config.enrichment_url.as_ref().map(|url| {
        Arc::new(EnrichmentClient::new(client.clone(), url.clone())) as Arc<dyn OptionsGenerator>
    });
    info!(
        scraper = %config.scraper_url,
        frames = %config.frames_url,
        analyzer = %config.analyzer_url,
        enrichment = options.is_some(),
        "Stage services configured"
    );

    Ok(StageServices {
        source: Arc::new(ScraperClient::new(client.clone(), config.scraper_url.clone())),
        frames: Arc::new(FramesClient::new(client.clone(), config.frames_url.clone())),
        analyzer: Arc::new(AnalyzerClient::new(client, config.analyzer_url.clone())),
        options,
    })
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn request_failed(stage: &str, service: &str, e: reqwest::Error) -> PipelineError {
    if e.is_timeout() {
        PipelineError::stage_failure(stage, format!("{} request timed out", service))
    } else {
        PipelineError::stage_failure(stage, format!("{} request failed: {}", service, e))
    }
}

/// Turn a non-2xx response into a stage failure carrying the body text.
async fn check_status(stage: &str, service: &str, response: Response) -> Result<Response, PipelineError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::stage_failure(
        stage,
        format!("{} returned {}: {}", service, status, body.trim()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrichment_is_optional() {
        let services = stage_services(&WorkerConfig::default()).unwrap();
        assert!(services.options.is_none());

        let config = WorkerConfig {
            enrichment_url: Some("http://enrich:9000".to_string()),
            ..WorkerConfig::default()
        };
        assert!(stage_services(&config).unwrap().options.is_some());
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(endpoint("http://svc:8000/", "/metadata"), "http://svc:8000/metadata");
        assert_eq!(endpoint("http://svc:8000", "resize"), "http://svc:8000/resize");
    }
}
