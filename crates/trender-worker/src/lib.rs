//! Reel pipeline worker.
//!
//! This crate provides:
//! - `PipelineWorker`, which drains the reel pipeline queue into `ReelPipeline`
//! - HTTP clients for the scraper, frames, analyzer and enrichment sidecars
//! - Worker configuration, structured job logging and metrics

pub mod clients;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;

pub use clients::{stage_services, AnalyzerClient, EnrichmentClient, FramesClient, ScraperClient};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::PipelineWorker;
pub use logging::JobLogger;
