//! Job identity, status and progress types shared by queues and the job service.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical job type. One per work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum JobType {
    /// Acquisition runs (scraping)
    #[serde(rename = "scrape")]
    Scrape,
    /// Download / analyze / template pipeline for a reel
    #[serde(rename = "pipeline")]
    Pipeline,
    /// Video generation
    #[serde(rename = "video-gen")]
    VideoGen,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::Scrape, JobType::Pipeline, JobType::VideoGen];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Scrape => "scrape",
            JobType::Pipeline => "pipeline",
            JobType::VideoGen => "video-gen",
        }
    }

    /// Name of the work queue holding jobs of this type.
    pub fn queue_name(&self) -> &'static str {
        match self {
            JobType::Scrape => "scrape-reels",
            JobType::Pipeline => "reel-pipeline",
            JobType::VideoGen => "video-generation",
        }
    }

    /// Stage reported when a job carries no structured progress.
    pub fn default_stage(&self) -> &'static str {
        match self {
            JobType::Scrape => "scraping",
            JobType::Pipeline => "processing",
            JobType::VideoGen => "generating",
        }
    }

    /// Message reported when a job carries no structured progress.
    pub fn default_message(&self) -> &'static str {
        match self {
            JobType::Scrape => "scraping in progress",
            JobType::Pipeline => "processing video",
            JobType::VideoGen => "generating video",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scrape" => Ok(JobType::Scrape),
            "pipeline" => Ok(JobType::Pipeline),
            "video-gen" => Ok(JobType::VideoGen),
            other => Err(format!("unknown job type: {}", other)),
        }
    }
}

/// Job id prefixes and the type they denote.
///
/// Historical ids must stay classifiable, so entries are only ever added.
/// `gen-` is the legacy generation prefix.
pub const JOB_ID_PREFIXES: &[(&str, JobType)] = &[
    ("scrape-", JobType::Scrape),
    ("process-", JobType::Pipeline),
    ("download-", JobType::Pipeline),
    ("analyze-", JobType::Pipeline),
    ("video-gen-", JobType::VideoGen),
    ("gen-", JobType::VideoGen),
];

/// Derive a job's logical type from its id. `None` means "search every queue".
pub fn classify(job_id: &str) -> Option<JobType> {
    JOB_ID_PREFIXES
        .iter()
        .find(|(prefix, _)| job_id.starts_with(prefix))
        .map(|(_, job_type)| *job_type)
}

/// Externally visible job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Native queue states that map onto this status.
    pub fn queue_states(&self) -> &'static [QueueState] {
        match self {
            JobStatus::Pending => &[QueueState::Waiting, QueueState::Delayed, QueueState::Prioritized],
            JobStatus::Running => &[QueueState::Active],
            JobStatus::Completed => &[QueueState::Completed],
            JobStatus::Failed => &[QueueState::Failed],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Queue-native job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
    Prioritized,
    /// Anything the queue engine reports that this model does not know.
    Unknown,
}

impl QueueState {
    /// Every state a job can be listed under.
    pub const LISTABLE: [QueueState; 6] = [
        QueueState::Waiting,
        QueueState::Active,
        QueueState::Completed,
        QueueState::Failed,
        QueueState::Delayed,
        QueueState::Prioritized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Waiting => "waiting",
            QueueState::Active => "active",
            QueueState::Completed => "completed",
            QueueState::Failed => "failed",
            QueueState::Delayed => "delayed",
            QueueState::Prioritized => "prioritized",
            QueueState::Unknown => "unknown",
        }
    }

    /// Parse a native state name. Unrecognized names become `Unknown`.
    pub fn from_native(s: &str) -> Self {
        match s {
            "waiting" | "wait" => QueueState::Waiting,
            "active" => QueueState::Active,
            "completed" => QueueState::Completed,
            "failed" => QueueState::Failed,
            "delayed" => QueueState::Delayed,
            "prioritized" => QueueState::Prioritized,
            _ => QueueState::Unknown,
        }
    }

    /// Map onto the external status. Unknown states stay visible as pending.
    pub fn status(&self) -> JobStatus {
        match self {
            QueueState::Waiting | QueueState::Delayed | QueueState::Prioritized => JobStatus::Pending,
            QueueState::Active => JobStatus::Running,
            QueueState::Completed => JobStatus::Completed,
            QueueState::Failed => JobStatus::Failed,
            QueueState::Unknown => JobStatus::Pending,
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Native states to fetch for an optional status filter.
pub fn queue_states_for(status: Option<JobStatus>) -> &'static [QueueState] {
    match status {
        Some(status) => status.queue_states(),
        None => &QueueState::LISTABLE,
    }
}

/// Kind of entity a job is linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Reel,
    Generation,
    Scrape,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Reel => "reel",
            EntityType::Generation => "generation",
            EntityType::Scrape => "scrape",
        }
    }
}

/// Entity a job is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityType,
    pub id: Option<String>,
}

impl EntityRef {
    pub fn new(kind: EntityType, id: Option<String>) -> Self {
        Self { kind, id }
    }
}

/// Native job progress: a bare percentage or a structured triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum JobProgress {
    Percent(f64),
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl Default for JobProgress {
    fn default() -> Self {
        JobProgress::Percent(0.0)
    }
}

impl JobProgress {
    pub fn detailed(percent: f64, stage: impl Into<String>, message: impl Into<String>) -> Self {
        JobProgress::Detailed {
            percent: Some(percent),
            stage: Some(stage.into()),
            message: Some(message.into()),
        }
    }

    /// Parse whatever the queue engine stored. Unparseable input is treated as 0%.
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    /// Percentage clamped to 0..=100.
    pub fn percent(&self) -> u8 {
        let raw = match self {
            JobProgress::Percent(p) => *p,
            JobProgress::Detailed { percent, .. } => percent.unwrap_or(0.0),
        };
        clamp_percent(raw)
    }

    pub fn stage(&self) -> Option<&str> {
        match self {
            JobProgress::Detailed { stage: Some(s), .. } if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            JobProgress::Detailed { message: Some(m), .. } if !m.is_empty() => Some(m),
            _ => None,
        }
    }
}

/// Clamp an arbitrary float into a 0..=100 percentage.
pub fn clamp_percent(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
