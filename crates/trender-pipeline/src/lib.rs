//! Reel processing pipeline for the trender backend.
//!
//! This crate provides:
//! - `ReelPipeline`, the per-reel state machine (download, analyze, template)
//! - Download and analysis stage services with progress reporting
//! - Contracts for the external stage services
//! - The keyword classifier for template tags and category
//! - A log sink writing reel log rows and stage timings

pub mod analysis;
pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod download;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod pipeline;
pub mod state;
pub mod video;

pub use analysis::AnalysisService;
pub use classifier::{detect_category, extract_tags};
pub use collaborators::{
    ElementAnalyzer, ElementOptions, ExtractedFrames, FrameService, OptionsGenerator,
    ResizedVideo, SourceMetadata, VideoSource,
};
pub use config::PipelineConfig;
pub use download::DownloadService;
pub use error::{PipelineError, PipelineResult};
pub use logger::{PipelineLogger, StageTimer};
pub use pipeline::{ReelDetails, ReelPipeline, StageServices, TemplateDetails};
pub use state::ReelTracker;
pub use video::VideoVault;
