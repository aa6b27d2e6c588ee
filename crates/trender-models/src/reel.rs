//! Reel entity and its processing state.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a reel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ReelId(pub String);

impl ReelId {
    /// Generate a new random reel ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ReelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reel lifecycle status.
///
/// Happy path is `scraped -> downloading -> downloaded -> analyzing -> analyzed`.
/// `failed` can be reached from any in-flight status. Transitions are not
/// enforced here; the pipeline is responsible for writing them in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReelStatus {
    #[default]
    Scraped,
    Downloading,
    Downloaded,
    Analyzing,
    Analyzed,
    Failed,
}

impl ReelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReelStatus::Scraped => "scraped",
            ReelStatus::Downloading => "downloading",
            ReelStatus::Downloaded => "downloaded",
            ReelStatus::Analyzing => "analyzing",
            ReelStatus::Analyzed => "analyzed",
            ReelStatus::Failed => "failed",
        }
    }

    /// True while a stage worker owns the reel.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ReelStatus::Downloading | ReelStatus::Analyzing)
    }
}

impl fmt::Display for ReelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scraped" => Ok(ReelStatus::Scraped),
            "downloading" => Ok(ReelStatus::Downloading),
            "downloaded" => Ok(ReelStatus::Downloaded),
            "analyzing" => Ok(ReelStatus::Analyzing),
            "analyzed" => Ok(ReelStatus::Analyzed),
            "failed" => Ok(ReelStatus::Failed),
            other => Err(format!("unknown reel status: {}", other)),
        }
    }
}

/// Where a reel's video bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VideoLocation {
    /// Key in the object store.
    Object { key: String },
    /// Path on the worker's local disk.
    Local { path: String },
}

impl VideoLocation {
    pub fn object(key: impl Into<String>) -> Self {
        Self::Object { key: key.into() }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self::Local { path: path.into() }
    }

    /// The key or path, whichever applies.
    pub fn as_str(&self) -> &str {
        match self {
            VideoLocation::Object { key } => key,
            VideoLocation::Local { path } => path,
        }
    }
}

impl fmt::Display for VideoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoLocation::Object { key } => write!(f, "object:{}", key),
            VideoLocation::Local { path } => write!(f, "local:{}", path),
        }
    }
}

/// Durable processing state, one per reel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ProcessingState {
    #[serde(default)]
    pub status: ReelStatus,

    /// Progress percentage (0-100)
    #[serde(default)]
    pub progress: u8,

    #[serde(default)]
    pub progress_stage: String,

    #[serde(default)]
    pub progress_message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Metadata refreshed from the acquisition source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ReelMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
}

impl ReelMetadata {
    pub fn is_empty(&self) -> bool {
        *self == ReelMetadata::default()
    }
}

/// A short-form video flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Reel {
    pub id: ReelId,

    /// Source URL the reel was scraped from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Acquisition source (e.g. "reels", "manual")
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub metadata: ReelMetadata,

    #[serde(flatten)]
    pub state: ProcessingState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reel {
    /// Create a freshly scraped reel.
    pub fn new(id: impl Into<ReelId>, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            url: None,
            source: source.into(),
            metadata: ReelMetadata::default(),
            state: ProcessingState::default(),
            s3_key: None,
            local_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, metadata: ReelMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_location(mut self, location: VideoLocation) -> Self {
        self.set_location(location);
        self
    }

    pub fn status(&self) -> ReelStatus {
        self.state.status
    }

    /// Stored video location, preferring the object store.
    pub fn video_location(&self) -> Option<VideoLocation> {
        match (&self.s3_key, &self.local_path) {
            (Some(key), _) => Some(VideoLocation::object(key.clone())),
            (None, Some(path)) => Some(VideoLocation::local(path.clone())),
            (None, None) => None,
        }
    }

    pub fn has_video(&self) -> bool {
        self.s3_key.is_some() || self.local_path.is_some()
    }

    pub fn set_location(&mut self, location: VideoLocation) {
        match location {
            VideoLocation::Object { key } => self.s3_key = Some(key),
            VideoLocation::Local { path } => self.local_path = Some(path),
        }
    }
}
