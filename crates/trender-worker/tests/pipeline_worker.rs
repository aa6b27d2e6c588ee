//! Worker tests over the in-memory queue, store and object storage.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use trender_models::{
    AnalysisDraft, AnalysisType, DetectedElement, ElementKind, JobRecord, JobStatus, JobType,
    PipelineAction, PipelineJobData, ProcessOptions, QueueState, Reel, ReelId, ReelStatus,
};
use trender_pipeline::{
    ElementAnalyzer, ExtractedFrames, FrameService, PipelineConfig, PipelineError, PipelineResult,
    ReelPipeline, ResizedVideo, SourceMetadata, StageServices, VideoSource, VideoVault,
};
use trender_queue::{AddOptions, MemoryQueue, QueueAdapter, QueueJob, WorkQueue};
use trender_storage::{LocalStore, MemoryObjectStore, ObjectStore};
use trender_store::{JobRecordRepository, MemoryStore, ReelRepository};
use trender_worker::{PipelineWorker, WorkerConfig};

#[derive(Default)]
struct FakeSource {
    downloads: AtomicUsize,
    fail: AtomicBool,
    gate: tokio::sync::Mutex<()>,
}

#[async_trait]
impl VideoSource for FakeSource {
    async fn fetch_metadata(&self, _reel_id: &ReelId) -> PipelineResult<Option<SourceMetadata>> {
        Ok(None)
    }

    async fn download(&self, _reel_id: &ReelId) -> PipelineResult<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let _open = self.gate.lock().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::stage_failure("download", "connection reset by peer"));
        }
        Ok(b"fake-mp4".to_vec())
    }
}

struct NoResize;

#[async_trait]
impl FrameService for NoResize {
    async fn extract_frames(&self, _video: &[u8], _interval_sec: f64) -> PipelineResult<ExtractedFrames> {
        Ok(ExtractedFrames {
            frames: vec!["AAAA".to_string()],
            count: 1,
            duration_sec: Some(3.0),
        })
    }

    async fn resize_if_needed(
        &self,
        _video: &[u8],
        _min_width: u32,
        _target_width: u32,
    ) -> PipelineResult<Option<ResizedVideo>> {
        Ok(None)
    }
}

struct Analyzer;

fn draft() -> AnalysisDraft {
    AnalysisDraft {
        duration: Some(8.0),
        aspect_ratio: "9:16".to_string(),
        subject: "dog on a beach".to_string(),
        environment: "ocean at sunset".to_string(),
        style: "vlog".to_string(),
        tags: vec![],
        elements: vec![DetectedElement {
            id: "el-1".to_string(),
            kind: ElementKind::Character,
            label: "Dog".to_string(),
            description: String::new(),
            remix_options: vec![],
        }],
    }
}

#[async_trait]
impl ElementAnalyzer for Analyzer {
    async fn analyze_video(&self, _video: &[u8], _file_name: &str) -> PipelineResult<AnalysisDraft> {
        Ok(draft())
    }

    async fn analyze_frames(&self, _frames: &ExtractedFrames) -> PipelineResult<AnalysisDraft> {
        Ok(draft())
    }
}

struct Harness {
    queue: Arc<MemoryQueue>,
    store: Arc<MemoryStore>,
    source: Arc<FakeSource>,
    worker: Arc<PipelineWorker>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(
        MemoryQueue::new(JobType::Pipeline).with_attempts(3, Duration::from_millis(10)),
    );
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(FakeSource::default());

    let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
    let pipeline = ReelPipeline::new(
        store.clone(),
        VideoVault::new(Some(objects), LocalStore::new(dir.path())),
        StageServices {
            source: source.clone(),
            frames: Arc::new(NoResize),
            analyzer: Arc::new(Analyzer),
            options: None,
        },
        PipelineConfig {
            downloads_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        },
    );

    let config = WorkerConfig {
        concurrency: 2,
        poll_interval: Duration::from_millis(10),
        shutdown_timeout: Duration::from_secs(5),
        ..WorkerConfig::default()
    };
    let worker = Arc::new(PipelineWorker::new(
        config,
        queue.clone(),
        pipeline,
        store.clone(),
    ));

    Harness {
        queue,
        store,
        source,
        worker,
        _dir: dir,
    }
}

impl Harness {
    async fn add_reel(&self, id: &str) -> ReelId {
        let reel = Reel::new(id, "reels");
        self.store.create_reel(&reel).await.unwrap();
        reel.id
    }

    async fn enqueue(&self, reel_id: &ReelId, action: PipelineAction, options: ProcessOptions) -> String {
        let job_id = action.job_id(reel_id, 1_700_000_000_000);
        let data = PipelineJobData::new(reel_id.clone(), action).with_options(options);
        let added = self
            .queue
            .add(
                &job_id,
                action.as_str(),
                serde_json::to_value(&data).unwrap(),
                AddOptions::default(),
            )
            .await
            .unwrap();
        assert!(added);
        job_id
    }

    async fn job(&self, id: &str) -> QueueJob {
        self.queue.get_job(id).await.unwrap().expect("job in queue")
    }

    async fn record(&self, id: &str) -> trender_models::PipelineRunRecord {
        match self.store.find_job_record(JobType::Pipeline, id).await.unwrap() {
            Some(JobRecord::Pipeline(record)) => record,
            other => panic!("expected pipeline record, got {:?}", other),
        }
    }

    /// Queue states of `ids`, sorted so the assertion ignores pick order.
    async fn states(&self, ids: &[String]) -> Vec<QueueState> {
        let mut states = Vec::new();
        for id in ids {
            states.push(self.job(id).await.state);
        }
        states.sort_by_key(|s| match s {
            QueueState::Active => 0,
            QueueState::Completed => 1,
            _ => 2,
        });
        states
    }

    async fn reel_status(&self, id: &ReelId) -> ReelStatus {
        self.store.get_reel(id).await.unwrap().unwrap().status()
    }
}

#[tokio::test]
async fn test_empty_queue() {
    let h = harness();
    assert!(!h.worker.run_once().await.unwrap());
}

#[tokio::test]
async fn test_process_job_completes_and_records_result() {
    let h = harness();
    let reel_id = h.add_reel("C1abc").await;
    let job_id = h
        .enqueue(&reel_id, PipelineAction::Process, ProcessOptions::default())
        .await;

    assert!(h.worker.run_once().await.unwrap());

    let job = h.job(&job_id).await;
    assert_eq!(job.state, QueueState::Completed);
    assert!(job.return_value["templateId"].is_string());
    assert_eq!(job.return_value["reelId"], json!("C1abc"));

    let record = h.record(&job_id).await;
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.action, PipelineAction::Process);
    let result = record.result.expect("result recorded");
    assert_eq!(
        result.template_id.as_deref(),
        job.return_value["templateId"].as_str()
    );
    assert!(result.analysis_id.is_some());

    assert_eq!(h.reel_status(&reel_id).await, ReelStatus::Analyzed);
}

#[tokio::test]
async fn test_download_job_records_location() {
    let h = harness();
    let reel_id = h.add_reel("C2dl").await;
    let job_id = h
        .enqueue(&reel_id, PipelineAction::Download, ProcessOptions::default())
        .await;

    h.worker.run_once().await.unwrap();

    let record = h.record(&job_id).await;
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(
        record.result.unwrap().video_location.as_deref(),
        Some("reels/C2dl.mp4")
    );
    assert_eq!(h.reel_status(&reel_id).await, ReelStatus::Downloaded);
}

#[tokio::test]
async fn test_precondition_failure_skips_retries() {
    let h = harness();
    let reel_id = h.add_reel("C3nofile").await;
    let job_id = h
        .enqueue(
            &reel_id,
            PipelineAction::Analyze,
            ProcessOptions {
                analysis_mode: Some(AnalysisType::Standard),
                ..ProcessOptions::default()
            },
        )
        .await;

    h.worker.run_once().await.unwrap();

    let job = h.job(&job_id).await;
    assert_eq!(job.state, QueueState::Failed);
    assert_eq!(job.attempts_made, 1);
    assert!(job.failed_reason.unwrap().contains("Download first"));

    let record = h.record(&job_id).await;
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error.unwrap().contains("has no video file"));
}

#[tokio::test]
async fn test_enchanting_without_enrichment_fails_permanently() {
    let h = harness();
    let reel_id = h.add_reel("C4ench").await;
    h.enqueue(&reel_id, PipelineAction::Download, ProcessOptions::default())
        .await;
    h.worker.run_once().await.unwrap();

    let job_id = h
        .enqueue(
            &reel_id,
            PipelineAction::Analyze,
            ProcessOptions {
                analysis_mode: Some(AnalysisType::Enchanting),
                ..ProcessOptions::default()
            },
        )
        .await;
    h.worker.run_once().await.unwrap();

    let job = h.job(&job_id).await;
    assert_eq!(job.state, QueueState::Failed);
    assert!(job.failed_reason.unwrap().contains("ENRICHMENT_SERVICE_URL"));
    // The reel keeps its downloaded state.
    assert_eq!(h.reel_status(&reel_id).await, ReelStatus::Downloaded);
}

#[tokio::test]
async fn test_stage_failure_is_retried_until_attempts_run_out() {
    let h = harness();
    h.source.fail.store(true, Ordering::SeqCst);
    let reel_id = h.add_reel("C5flaky").await;
    let job_id = h
        .enqueue(&reel_id, PipelineAction::Download, ProcessOptions::default())
        .await;

    h.worker.run_once().await.unwrap();
    let job = h.job(&job_id).await;
    assert_eq!(job.state, QueueState::Delayed);
    assert!(h
        .store
        .find_job_record(JobType::Pipeline, &job_id)
        .await
        .unwrap()
        .is_none());

    for _ in 0..2 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.worker.run_once().await.unwrap());
    }

    let job = h.job(&job_id).await;
    assert_eq!(job.state, QueueState::Failed);
    assert_eq!(job.attempts_made, 3);
    assert_eq!(job.failed_reason.as_deref(), Some("connection reset by peer"));
    assert_eq!(h.source.downloads.load(Ordering::SeqCst), 3);

    let record = h.record(&job_id).await;
    assert_eq!(record.attempts, 3);
    assert_eq!(h.reel_status(&reel_id).await, ReelStatus::Failed);
}

#[tokio::test]
async fn test_retry_after_recovery_completes() {
    let h = harness();
    h.source.fail.store(true, Ordering::SeqCst);
    let reel_id = h.add_reel("C6recover").await;
    let job_id = h
        .enqueue(&reel_id, PipelineAction::Download, ProcessOptions::default())
        .await;

    h.worker.run_once().await.unwrap();
    h.source.fail.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.worker.run_once().await.unwrap();

    assert_eq!(h.job(&job_id).await.state, QueueState::Completed);
    let record = h.record(&job_id).await;
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.error.is_none());
}

#[tokio::test]
async fn test_job_removed_while_running_leaves_no_record() {
    let h = harness();
    let reel_id = h.add_reel("C8gone").await;
    let job_id = h
        .enqueue(&reel_id, PipelineAction::Download, ProcessOptions::default())
        .await;

    let gate = h.source.gate.lock().await;
    let worker = Arc::clone(&h.worker);
    let run = tokio::spawn(async move { worker.run_once().await });

    for _ in 0..200 {
        if h.source.downloads.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.job(&job_id).await.state, QueueState::Active);
    assert!(h.queue.remove_job(&job_id).await.unwrap());
    drop(gate);

    assert!(run.await.unwrap().unwrap());
    assert!(h.queue.get_job(&job_id).await.unwrap().is_none());
    assert!(h
        .store
        .find_job_record(JobType::Pipeline, &job_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_shutdown_is_seen_while_every_slot_is_busy() {
    let h = harness();
    let mut jobs = Vec::new();
    for id in ["C9a", "C9b", "C9c"] {
        let reel_id = h.add_reel(id).await;
        jobs.push(
            h.enqueue(&reel_id, PipelineAction::Download, ProcessOptions::default())
                .await,
        );
    }

    let gate = h.source.gate.lock().await;
    let worker = Arc::clone(&h.worker);
    let handle = tokio::spawn(async move { worker.run().await });

    for _ in 0..200 {
        if h.source.downloads.load(Ordering::SeqCst) >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // Both slots are held; the third job is still waiting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.states(&jobs).await, vec![QueueState::Active, QueueState::Active, QueueState::Waiting]);

    h.worker.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(gate);

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker stops after shutdown")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(
        h.states(&jobs).await,
        vec![QueueState::Completed, QueueState::Completed, QueueState::Waiting]
    );
}

#[tokio::test]
async fn test_invalid_payload_fails_without_retry() {
    let h = harness();
    h.queue
        .add(
            "process-broken-1",
            "process",
            json!({"action": "process"}),
            AddOptions::default(),
        )
        .await
        .unwrap();

    h.worker.run_once().await.unwrap();

    let job = h.job("process-broken-1").await;
    assert_eq!(job.state, QueueState::Failed);
    assert!(job.failed_reason.unwrap().starts_with("Invalid job payload"));
    assert!(h
        .store
        .find_job_record(JobType::Pipeline, "process-broken-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_run_drains_queue_and_stops_on_shutdown() {
    let h = harness();
    let mut jobs = Vec::new();
    for id in ["C7a", "C7b", "C7c"] {
        let reel_id = h.add_reel(id).await;
        jobs.push(
            h.enqueue(&reel_id, PipelineAction::Process, ProcessOptions::default())
                .await,
        );
    }

    let worker = Arc::clone(&h.worker);
    let handle = tokio::spawn(async move { worker.run().await });

    let mut done = false;
    for _ in 0..200 {
        let mut completed = 0;
        for id in &jobs {
            if h.job(id).await.state == QueueState::Completed {
                completed += 1;
            }
        }
        if completed == jobs.len() {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(done, "worker did not drain the queue");

    h.worker.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker stops after shutdown")
        .unwrap();
    assert!(result.is_ok());
}
