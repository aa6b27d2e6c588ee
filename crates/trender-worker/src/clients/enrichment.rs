//! Remix-option enrichment provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use trender_models::DetectedElement;
use trender_pipeline::{ElementOptions, OptionsGenerator, PipelineError, PipelineResult};

use super::{check_status, endpoint, request_failed};

const SERVICE: &str = "Enrichment service";
const STAGE: &str = "enrichment";

#[derive(Debug, Serialize)]
struct OptionsRequest<'a> {
    elements: &'a [DetectedElement],
}

#[derive(Debug, Deserialize)]
struct OptionsResponse {
    #[serde(default)]
    elements: Vec<ElementOptions>,
}

/// Client for `POST /remix-options`.
#[derive(Clone)]
pub struct EnrichmentClient {
    client: Client,
    base_url: String,
}

impl EnrichmentClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl OptionsGenerator for EnrichmentClient {
    async fn generate_options(&self, elements: &[DetectedElement]) -> PipelineResult<Vec<ElementOptions>> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "remix-options"))
            .json(&OptionsRequest { elements })
            .send()
            .await
            .map_err(|e| request_failed(STAGE, SERVICE, e))?;
        let response = check_status(STAGE, SERVICE, response).await?;

        let body: OptionsResponse = response.json().await.map_err(|e| {
            PipelineError::stage_failure(STAGE, format!("Invalid enrichment response: {}", e))
        })?;
        Ok(body.elements)
    }
}
