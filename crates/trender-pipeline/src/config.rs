//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Stage tuning shared by the download and analysis services.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root for videos kept on local disk
    pub downloads_dir: PathBuf,
    /// Hard ceiling on the acquisition download call
    pub download_timeout: Duration,
    /// Seconds between sampled frames in frame analysis
    pub frame_interval_sec: f64,
    /// Videos narrower than this are upscaled
    pub resize_min_width: u32,
    pub resize_target_width: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("downloads"),
            download_timeout: Duration::from_secs(120),
            frame_interval_sec: 2.0,
            resize_min_width: 720,
            resize_target_width: 1080,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            downloads_dir: std::env::var("DOWNLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.downloads_dir),
            download_timeout: std::env::var("DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            frame_interval_sec: std::env::var("FRAME_INTERVAL_SEC")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|v: &f64| *v > 0.0)
                .unwrap_or(defaults.frame_interval_sec),
            resize_min_width: std::env::var("RESIZE_MIN_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.resize_min_width),
            resize_target_width: std::env::var("RESIZE_TARGET_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.resize_target_width),
        }
    }
}
