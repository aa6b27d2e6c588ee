//! Analysis artifacts produced by the analysis stage.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ReelId;

/// Which analysis strategy produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Whole video sent to the analysis provider
    #[default]
    Standard,
    /// Frames sampled at a fixed interval
    Frames,
    /// Full video with mandatory remix-option enrichment
    Enchanting,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Standard => "standard",
            AnalysisType::Frames => "frames",
            AnalysisType::Enchanting => "enchanting",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(AnalysisType::Standard),
            "frames" => Ok(AnalysisType::Frames),
            "enchanting" => Ok(AnalysisType::Enchanting),
            other => Err(format!("unknown analysis type: {}", other)),
        }
    }
}

/// Kind of element detected in a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Character,
    Object,
    Background,
}

/// A suggested replacement for a detected element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RemixOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub icon: String,
    pub prompt: String,
}

/// Element detected by the analysis provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedElement {
    pub id: String,
    pub kind: ElementKind,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub remix_options: Vec<RemixOption>,
}

/// Raw provider output before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct AnalysisDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub aspect_ratio: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub elements: Vec<DetectedElement>,
}

/// Persisted analysis of one reel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Analysis {
    pub id: String,
    pub reel_id: ReelId,
    pub analysis_type: AnalysisType,

    /// Name of the analysed file (object key or local file name)
    #[serde(default)]
    pub file_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub aspect_ratio: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub elements: Vec<DetectedElement>,

    pub created_at: DateTime<Utc>,
}

impl Analysis {
    /// Build an artifact from provider output.
    pub fn from_draft(
        reel_id: ReelId,
        analysis_type: AnalysisType,
        file_name: impl Into<String>,
        draft: AnalysisDraft,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reel_id,
            analysis_type,
            file_name: file_name.into(),
            duration: draft.duration,
            aspect_ratio: draft.aspect_ratio,
            subject: draft.subject,
            environment: draft.environment,
            style: draft.style,
            tags: draft.tags,
            elements: draft.elements,
            created_at: Utc::now(),
        }
    }
}
