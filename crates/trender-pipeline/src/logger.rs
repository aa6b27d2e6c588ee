//! Pipeline log sink.
//!
//! Every event goes to `tracing` and is persisted as a [`ReelLog`] row so the
//! dashboard can show a per-reel timeline. Persisting is best effort: a store
//! failure is traced and swallowed, never returned to the stage.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, warn, Span};

use trender_models::{LogLevel, ReelId, ReelLog};
use trender_store::Store;

use crate::error::PipelineError;
use crate::metrics;

/// Writes reel log rows alongside structured tracing events.
#[derive(Clone)]
pub struct PipelineLogger {
    store: Arc<dyn Store>,
}

impl PipelineLogger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn info(&self, reel_id: &ReelId, stage: &str, message: impl Into<String>) {
        self.write(ReelLog::new(reel_id.clone(), LogLevel::Info, stage, message))
            .await;
    }

    pub async fn info_with(
        &self,
        reel_id: &ReelId,
        stage: &str,
        message: impl Into<String>,
        metadata: Value,
    ) {
        self.write(
            ReelLog::new(reel_id.clone(), LogLevel::Info, stage, message).with_metadata(metadata),
        )
        .await;
    }

    pub async fn warn(&self, reel_id: &ReelId, stage: &str, message: impl Into<String>) {
        self.write(ReelLog::new(reel_id.clone(), LogLevel::Warn, stage, message))
            .await;
    }

    pub async fn error(&self, reel_id: &ReelId, stage: &str, message: impl Into<String>) {
        self.write(ReelLog::new(reel_id.clone(), LogLevel::Error, stage, message))
            .await;
    }

    /// Start timing a stage. The returned timer logs the elapsed time on
    /// [`StageTimer::stop`] or [`StageTimer::fail`].
    pub async fn start_timer(&self, reel_id: &ReelId, stage: &str, message: &str) -> StageTimer {
        self.info(reel_id, stage, format!("Started: {}", message)).await;
        StageTimer {
            logger: self.clone(),
            reel_id: reel_id.clone(),
            stage: stage.to_string(),
            message: message.to_string(),
            started: Instant::now(),
        }
    }

    /// Span carrying the reel id and stage.
    pub fn create_span(reel_id: &ReelId, stage: &str) -> Span {
        tracing::info_span!("reel_stage", reel_id = %reel_id, stage = %stage)
    }

    async fn write(&self, log: ReelLog) {
        match log.level {
            LogLevel::Debug => debug!(reel_id = %log.reel_id, stage = %log.stage, "{}", log.message),
            LogLevel::Info => info!(reel_id = %log.reel_id, stage = %log.stage, "{}", log.message),
            LogLevel::Warn => warn!(reel_id = %log.reel_id, stage = %log.stage, "{}", log.message),
            LogLevel::Error => error!(reel_id = %log.reel_id, stage = %log.stage, "{}", log.message),
        }

        if let Err(e) = self.store.append_reel_log(&log).await {
            warn!(reel_id = %log.reel_id, error = %e, "Failed to persist reel log");
        }
    }
}

/// Elapsed-time tracker for one stage run.
pub struct StageTimer {
    logger: PipelineLogger,
    reel_id: ReelId,
    stage: String,
    message: String,
    started: Instant,
}

impl StageTimer {
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Log a successful finish.
    pub async fn stop(self, message: &str, metadata: Option<Value>) {
        let elapsed = self.elapsed_ms();
        metrics::record_stage(&self.stage, "success", elapsed);

        let mut log = ReelLog::new(self.reel_id, LogLevel::Info, self.stage, message)
            .with_duration(elapsed);
        if let Some(metadata) = metadata {
            log = log.with_metadata(metadata);
        }
        self.logger.write(log).await;
    }

    /// Log a failed finish.
    pub async fn fail(self, err: &PipelineError) {
        let elapsed = self.elapsed_ms();
        metrics::record_stage(&self.stage, "failure", elapsed);

        let log = ReelLog::new(
            self.reel_id,
            LogLevel::Error,
            self.stage,
            format!("Failed: {}", self.message),
        )
        .with_duration(elapsed)
        .with_metadata(serde_json::json!({ "error": err.to_string() }));
        self.logger.write(log).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trender_store::{MemoryStore, ReelLogRepository};

    #[tokio::test]
    async fn test_timer_records_duration() {
        let store = Arc::new(MemoryStore::new());
        let logger = PipelineLogger::new(store.clone());
        let reel_id = ReelId::from("r1");

        let timer = logger.start_timer(&reel_id, "download", "Downloading video").await;
        timer
            .stop("Download complete", Some(serde_json::json!({"sizeBytes": 3})))
            .await;

        let logs = store.list_reel_logs(&reel_id, 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        let finished = logs
            .iter()
            .find(|l| l.message == "Download complete")
            .unwrap();
        assert_eq!(finished.stage, "download");
        assert!(finished.duration_ms.is_some());
        assert_eq!(finished.metadata.as_ref().unwrap()["sizeBytes"], 3);
    }

    #[tokio::test]
    async fn test_fail_logs_error_level() {
        let store = Arc::new(MemoryStore::new());
        let logger = PipelineLogger::new(store.clone());
        let reel_id = ReelId::from("r2");

        let timer = logger.start_timer(&reel_id, "analyze", "Analyzing video").await;
        let err = crate::PipelineError::stage_failure("analyze", "provider timeout");
        timer.fail(&err).await;

        let logs = store.list_reel_logs(&reel_id, 10).await.unwrap();
        let failed = logs.iter().find(|l| l.level == LogLevel::Error).unwrap();
        assert_eq!(failed.message, "Failed: Analyzing video");
        assert_eq!(
            failed.metadata.as_ref().unwrap()["error"],
            "analyze failed: provider timeout"
        );
    }
}
