//! Typed job payloads and results, keyed by logical job type.
//!
//! Queue engines store payloads and return values as JSON blobs. They are
//! decoded with the owning queue's [`JobType`]; blobs that do not fit the
//! typed shape are kept verbatim in the `Other` variants so nothing is lost.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::AnalysisType;
use crate::job::{EntityRef, EntityType, JobType};
use crate::ReelId;

/// Options accepted by the reel orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOptions {
    #[serde(default)]
    pub skip_download: bool,
    #[serde(default)]
    pub skip_analysis: bool,
    #[serde(default)]
    pub force_reprocess: bool,
    #[serde(default)]
    pub use_frames: bool,
    /// Strategy for standalone `analyze` jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_mode: Option<AnalysisType>,
}

impl ProcessOptions {
    pub fn forced() -> Self {
        Self {
            force_reprocess: true,
            ..Self::default()
        }
    }
}

/// What a pipeline job asks the worker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineAction {
    /// Full orchestration: download, analyze, template
    Process,
    Download,
    Analyze,
}

impl PipelineAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineAction::Process => "process",
            PipelineAction::Download => "download",
            PipelineAction::Analyze => "analyze",
        }
    }

    /// Job id for this action. The prefix keeps the id classifiable.
    pub fn job_id(&self, reel_id: &ReelId, timestamp_ms: i64) -> String {
        format!("{}-{}-{}", self.as_str(), reel_id, timestamp_ms)
    }
}

impl fmt::Display for PipelineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Acquisition run parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeJobData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_likes: Option<u64>,
}

/// Work item on the reel pipeline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineJobData {
    pub reel_id: ReelId,
    pub action: PipelineAction,
    #[serde(default)]
    pub options: ProcessOptions,
}

impl PipelineJobData {
    pub fn new(reel_id: impl Into<ReelId>, action: PipelineAction) -> Self {
        Self {
            reel_id: reel_id.into(),
            action,
            options: ProcessOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProcessOptions) -> Self {
        self.options = options;
        self
    }
}

/// Video generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJobData {
    pub generation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Job payload as a union over job types.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum JobPayload {
    Scrape(ScrapeJobData),
    Pipeline(PipelineJobData),
    Generation(GenerationJobData),
    /// Payload that does not match the queue's typed shape
    Other(serde_json::Value),
}

impl JobPayload {
    /// Decode a raw payload stored by the queue owning `job_type`.
    pub fn decode(job_type: JobType, raw: serde_json::Value) -> Self {
        let typed = match job_type {
            JobType::Scrape => serde_json::from_value(raw.clone()).map(JobPayload::Scrape),
            JobType::Pipeline => serde_json::from_value(raw.clone()).map(JobPayload::Pipeline),
            JobType::VideoGen => serde_json::from_value(raw.clone()).map(JobPayload::Generation),
        };
        typed.unwrap_or(JobPayload::Other(raw))
    }

    /// Encode for storage in a queue.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Action declared by a pipeline payload, if any.
    pub fn declared_action(&self) -> Option<&str> {
        match self {
            JobPayload::Pipeline(data) => Some(data.action.as_str()),
            JobPayload::Other(raw) => raw.get("action").and_then(|v| v.as_str()),
            _ => None,
        }
    }

    /// Entity this job is about, read from the payload.
    pub fn entity(&self, job_type: JobType) -> EntityRef {
        match (job_type, self) {
            (JobType::Scrape, _) => EntityRef::new(EntityType::Scrape, None),
            (JobType::Pipeline, JobPayload::Pipeline(data)) => {
                EntityRef::new(EntityType::Reel, Some(data.reel_id.to_string()))
            }
            (JobType::VideoGen, JobPayload::Generation(data)) => {
                EntityRef::new(EntityType::Generation, Some(data.generation_id.clone()))
            }
            (JobType::Pipeline, other) => EntityRef::new(EntityType::Reel, other.raw_str("reelId")),
            (JobType::VideoGen, other) => {
                EntityRef::new(EntityType::Generation, other.raw_str("generationId"))
            }
        }
    }

    fn raw_str(&self, field: &str) -> Option<String> {
        match self {
            JobPayload::Other(raw) => raw.get(field).and_then(|v| v.as_str()).map(str::to_string),
            _ => None,
        }
    }
}

/// Outcome of an acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub reels_count: u32,
    pub downloaded_count: u32,
}

/// Outcome of a pipeline job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub reel_id: ReelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_location: Option<String>,
}

impl PipelineResult {
    pub fn new(reel_id: ReelId) -> Self {
        Self {
            reel_id,
            template_id: None,
            analysis_id: None,
            video_location: None,
        }
    }
}

/// Outcome of a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub generation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
}

/// Job result as a union over job types.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum JobResult {
    Scrape(ScrapeResult),
    Pipeline(PipelineResult),
    Generation(GenerationResult),
    Other(serde_json::Value),
}

impl JobResult {
    /// Decode a raw return value stored by the queue owning `job_type`.
    /// `null` means the job produced no result.
    pub fn decode(job_type: JobType, raw: serde_json::Value) -> Option<Self> {
        if raw.is_null() {
            return None;
        }
        let typed = match job_type {
            JobType::Scrape => serde_json::from_value(raw.clone()).map(JobResult::Scrape),
            JobType::Pipeline => serde_json::from_value(raw.clone()).map(JobResult::Pipeline),
            JobType::VideoGen => serde_json::from_value(raw.clone()).map(JobResult::Generation),
        };
        Some(typed.unwrap_or(JobResult::Other(raw)))
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pipeline_payload_decodes_and_links_reel() {
        let raw = json!({"reelId": "r1", "action": "download"});
        let payload = JobPayload::decode(JobType::Pipeline, raw.clone());

        assert!(matches!(payload, JobPayload::Pipeline(_)));
        assert_eq!(payload.declared_action(), Some("download"));
        assert_eq!(
            payload.entity(JobType::Pipeline),
            EntityRef::new(EntityType::Reel, Some("r1".to_string()))
        );
        // Serialized back to the same wire shape, with default options filled in.
        assert_eq!(payload.to_value()["reelId"], raw["reelId"]);
        assert_eq!(payload.to_value()["options"]["forceReprocess"], false);
    }

    #[test]
    fn test_unknown_pipeline_action_is_kept_raw() {
        let raw = json!({"reelId": "r2", "action": "refresh-duration"});
        let payload = JobPayload::decode(JobType::Pipeline, raw.clone());

        assert_eq!(payload, JobPayload::Other(raw));
        assert_eq!(payload.declared_action(), Some("refresh-duration"));
        assert_eq!(
            payload.entity(JobType::Pipeline),
            EntityRef::new(EntityType::Reel, Some("r2".to_string()))
        );
    }

    #[test]
    fn test_scrape_entity_has_no_id() {
        let payload = JobPayload::decode(JobType::Scrape, json!({"sortMode": "top", "limit": 10}));
        assert_eq!(payload.entity(JobType::Scrape), EntityRef::new(EntityType::Scrape, None));
    }

    #[test]
    fn test_generation_entity() {
        let payload = JobPayload::decode(JobType::VideoGen, json!({"generationId": "g1"}));
        assert_eq!(
            payload.entity(JobType::VideoGen),
            EntityRef::new(EntityType::Generation, Some("g1".to_string()))
        );
    }

    #[test]
    fn test_job_id_is_classifiable() {
        let id = PipelineAction::Analyze.job_id(&ReelId::from("r1"), 1_700_000_000_000);
        assert_eq!(id, "analyze-r1-1700000000000");
        assert_eq!(crate::classify(&id), Some(JobType::Pipeline));
    }

    #[test]
    fn test_result_decode() {
        assert_eq!(JobResult::decode(JobType::Scrape, serde_json::Value::Null), None);
        assert_eq!(
            JobResult::decode(JobType::Scrape, json!({"reelsCount": 4, "downloadedCount": 3})),
            Some(JobResult::Scrape(ScrapeResult { reels_count: 4, downloaded_count: 3 }))
        );
        assert!(matches!(
            JobResult::decode(JobType::VideoGen, json!("done")),
            Some(JobResult::Other(_))
        ));
    }
}
