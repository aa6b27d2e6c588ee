//! Worker configuration.

use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent pipeline jobs
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Acquisition sidecar (metadata and video download)
    pub scraper_url: String,
    /// Frame extraction and resize sidecar
    pub frames_url: String,
    /// Element analysis provider
    pub analyzer_url: String,
    /// Remix-option enrichment; `None` disables enrichment
    pub enrichment_url: Option<String>,
    /// Timeout for sidecar calls other than the video download
    pub request_timeout: Duration,
    /// Port for the Prometheus exporter; `None` disables it
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_secs(60),
            scraper_url: "http://localhost:8001".to_string(),
            frames_url: "http://localhost:8002".to_string(),
            analyzer_url: "http://localhost:8003".to_string(),
            enrichment_url: None,
            request_timeout: Duration::from_secs(300),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.concurrency),
            poll_interval: Duration::from_millis(
                std::env::var("WORKER_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            scraper_url: std::env::var("SCRAPER_SERVICE_URL").unwrap_or(defaults.scraper_url),
            frames_url: std::env::var("VIDEO_FRAMES_SERVICE_URL").unwrap_or(defaults.frames_url),
            analyzer_url: std::env::var("ANALYZER_SERVICE_URL").unwrap_or(defaults.analyzer_url),
            enrichment_url: std::env::var("ENRICHMENT_SERVICE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            request_timeout: Duration::from_secs(
                std::env::var("SIDECAR_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            metrics_port: std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()),
        }
    }

    /// Reject configurations the worker cannot start with.
    pub fn validate(&self) -> WorkerResult<()> {
        for (name, url) in [
            ("SCRAPER_SERVICE_URL", &self.scraper_url),
            ("VIDEO_FRAMES_SERVICE_URL", &self.frames_url),
            ("ANALYZER_SERVICE_URL", &self.analyzer_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(WorkerError::config_error(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }
        Ok(())
    }
}
