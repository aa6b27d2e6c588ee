//! Durable job records that outlive queue retention.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobStatus, JobType};
use crate::payload::{PipelineAction, PipelineResult};
use crate::ReelId;

/// Stored status of an acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeRunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScrapeRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeRunStatus::Pending => "pending",
            ScrapeRunStatus::Running => "running",
            ScrapeRunStatus::Completed => "completed",
            ScrapeRunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => ScrapeRunStatus::Running,
            "completed" => ScrapeRunStatus::Completed,
            "failed" => ScrapeRunStatus::Failed,
            _ => ScrapeRunStatus::Pending,
        }
    }

    pub fn job_status(&self) -> JobStatus {
        match self {
            ScrapeRunStatus::Pending => JobStatus::Pending,
            ScrapeRunStatus::Running => JobStatus::Running,
            ScrapeRunStatus::Completed => JobStatus::Completed,
            ScrapeRunStatus::Failed => JobStatus::Failed,
        }
    }
}

/// Historical acquisition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScrapeRunRecord {
    pub job_id: String,
    pub status: ScrapeRunStatus,
    #[serde(default)]
    pub found: u32,
    #[serde(default)]
    pub downloaded: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored status of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Processing => "processing",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => GenerationStatus::Processing,
            "completed" => GenerationStatus::Completed,
            "failed" => GenerationStatus::Failed,
            _ => GenerationStatus::Pending,
        }
    }

    pub fn job_status(&self) -> JobStatus {
        match self {
            GenerationStatus::Pending => JobStatus::Pending,
            GenerationStatus::Processing => JobStatus::Running,
            GenerationStatus::Completed => JobStatus::Completed,
            GenerationStatus::Failed => JobStatus::Failed,
        }
    }
}

/// Historical video generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRecord {
    /// Generation id
    pub id: String,
    /// Queue job that produced it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub status: GenerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Historical pipeline job, written by the worker before the queue settles it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineRunRecord {
    pub job_id: String,
    pub reel_id: ReelId,
    pub action: PipelineAction,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Durable projection of a finished job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRecord {
    Scrape(ScrapeRunRecord),
    Pipeline(PipelineRunRecord),
    Generation(GenerationRecord),
}

impl JobRecord {
    pub fn job_type(&self) -> JobType {
        match self {
            JobRecord::Scrape(_) => JobType::Scrape,
            JobRecord::Pipeline(_) => JobType::Pipeline,
            JobRecord::Generation(_) => JobType::VideoGen,
        }
    }

    /// Queue job id this record belongs to.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            JobRecord::Scrape(r) => Some(&r.job_id),
            JobRecord::Pipeline(r) => Some(&r.job_id),
            JobRecord::Generation(r) => r.job_id.as_deref(),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobRecord::Scrape(r) => r.status.job_status(),
            JobRecord::Pipeline(r) => r.status,
            JobRecord::Generation(r) => r.status.job_status(),
        }
    }
}
