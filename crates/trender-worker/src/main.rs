//! Reel pipeline worker binary.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trender_models::JobType;
use trender_pipeline::{PipelineConfig, ReelPipeline, VideoVault};
use trender_queue::RedisQueue;
use trender_storage::{LocalStore, ObjectStore, S3Client, S3Config};
use trender_store::FirestoreStore;
use trender_worker::{metrics, stage_services, PipelineWorker, WorkerConfig};

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?
        .add_directive("trender=info".parse()?)
        .add_directive("hyper=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting trender-worker");

    let config = WorkerConfig::from_env();
    config.validate()?;
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        metrics::install_exporter(port)?;
        info!(port, "Prometheus exporter listening");
    }

    let queue = RedisQueue::from_env(JobType::Pipeline).context("Failed to create pipeline queue")?;
    queue.ping().await.context("Redis is not reachable")?;

    let store = Arc::new(
        FirestoreStore::from_env()
            .await
            .context("Failed to create Firestore store")?,
    );

    let objects = S3Config::from_env_optional()
        .map(|c| Arc::new(S3Client::new(c)) as Arc<dyn ObjectStore>);
    if objects.is_none() {
        info!("Object storage not configured, videos are kept on local disk");
    }

    let pipeline_config = PipelineConfig::from_env();
    let vault = VideoVault::new(objects, LocalStore::new(pipeline_config.downloads_dir.clone()));
    let pipeline = ReelPipeline::new(
        store.clone(),
        vault,
        stage_services(&config)?,
        pipeline_config,
    );

    let worker = Arc::new(PipelineWorker::new(config, Arc::new(queue), pipeline, store));

    let signal_worker = Arc::clone(&worker);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_worker.shutdown();
        }
    });

    worker.run().await?;

    info!("Worker shutdown complete");
    Ok(())
}
