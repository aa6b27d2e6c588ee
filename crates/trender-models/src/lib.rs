//! Shared data models for the trender backend.
//!
//! This crate provides Serde-serializable types for:
//! - Reels and their durable processing state
//! - Analysis and template artifacts, reel log rows
//! - Job identity resolution and the queue-state to status mapping
//! - Typed job payloads and results
//! - Durable job records and the unified job view

pub mod analysis;
pub mod job;
pub mod payload;
pub mod reel;
pub mod record;
pub mod response;
pub mod template;

pub use analysis::{Analysis, AnalysisDraft, AnalysisType, DetectedElement, ElementKind, RemixOption};
pub use job::{
    clamp_percent, classify, queue_states_for, EntityRef, EntityType, JobProgress, JobStatus,
    JobType, QueueState, JOB_ID_PREFIXES,
};
pub use payload::{
    GenerationJobData, GenerationResult, JobPayload, JobResult, PipelineAction, PipelineJobData,
    PipelineResult, ProcessOptions, ScrapeJobData, ScrapeResult,
};
pub use reel::{ProcessingState, Reel, ReelId, ReelMetadata, ReelStatus, VideoLocation};
pub use record::{
    GenerationRecord, GenerationStatus, JobRecord, PipelineRunRecord, ScrapeRunRecord,
    ScrapeRunStatus,
};
pub use response::{JobFilters, UnifiedJobResponse, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use template::{LogLevel, ReelLog, Template, DEFAULT_CATEGORY};
