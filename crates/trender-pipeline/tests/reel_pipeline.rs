//! End-to-end tests for the reel state machine over the in-memory store,
//! in-memory object storage and recording stage fakes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use trender_models::{
    AnalysisDraft, AnalysisType, DetectedElement, ElementKind, LogLevel, ProcessOptions, Reel,
    ReelId, ReelStatus, RemixOption, VideoLocation,
};
use trender_pipeline::{
    ElementAnalyzer, ElementOptions, ExtractedFrames, FrameService, OptionsGenerator,
    PipelineConfig, PipelineError, PipelineResult, ReelPipeline, ResizedVideo, SourceMetadata,
    StageServices, VideoSource, VideoVault,
};
use trender_storage::{LocalStore, MemoryObjectStore, ObjectStore, VIDEO_CONTENT_TYPE};
use trender_store::{
    AnalysisRepository, MemoryStore, ReelLogRepository, ReelRepository, TemplateRepository,
};

const VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42fake-video";

#[derive(Default)]
struct FakeSource {
    downloads: AtomicUsize,
    metadata_calls: AtomicUsize,
    fail_download: AtomicBool,
    fail_metadata: AtomicBool,
    delay: Option<Duration>,
}

#[async_trait]
impl VideoSource for FakeSource {
    async fn fetch_metadata(&self, _reel_id: &ReelId) -> PipelineResult<Option<SourceMetadata>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(PipelineError::stage_failure("metadata", "scraper unavailable"));
        }
        Ok(Some(SourceMetadata {
            caption: Some("Sunrise hike".to_string()),
            like_count: Some(1200),
            view_count: Some(45000),
            author: Some("alpine.daily".to_string()),
            ..SourceMetadata::default()
        }))
    }

    async fn download(&self, _reel_id: &ReelId) -> PipelineResult<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(PipelineError::stage_failure("download", "Video not available"));
        }
        Ok(VIDEO.to_vec())
    }
}

#[derive(Default)]
struct FakeFrames {
    extract_calls: AtomicUsize,
    upscale: bool,
    fail_resize: bool,
}

#[async_trait]
impl FrameService for FakeFrames {
    async fn extract_frames(&self, _video: &[u8], interval_sec: f64) -> PipelineResult<ExtractedFrames> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        assert!(interval_sec > 0.0);
        Ok(ExtractedFrames {
            frames: vec!["AAAA".to_string(), "BBBB".to_string(), "CCCC".to_string()],
            count: 3,
            duration_sec: Some(6.0),
        })
    }

    async fn resize_if_needed(
        &self,
        video: &[u8],
        _min_width: u32,
        target_width: u32,
    ) -> PipelineResult<Option<ResizedVideo>> {
        if self.fail_resize {
            return Err(PipelineError::stage_failure("resize", "ffmpeg crashed"));
        }
        if !self.upscale {
            return Ok(None);
        }
        let mut bytes = video.to_vec();
        bytes.extend_from_slice(b"-upscaled");
        Ok(Some(ResizedVideo {
            bytes,
            original_width: 540,
            new_width: target_width,
        }))
    }
}

#[derive(Default)]
struct FakeAnalyzer {
    video_calls: AtomicUsize,
    frame_calls: AtomicUsize,
}

impl FakeAnalyzer {
    fn calls(&self) -> usize {
        self.video_calls.load(Ordering::SeqCst) + self.frame_calls.load(Ordering::SeqCst)
    }
}

fn draft() -> AnalysisDraft {
    AnalysisDraft {
        duration: Some(12.5),
        aspect_ratio: "9:16".to_string(),
        subject: "woman hiking".to_string(),
        environment: "mountain trail at dawn".to_string(),
        style: "cinematic drone shots".to_string(),
        tags: vec![],
        elements: vec![
            DetectedElement {
                id: "el-1".to_string(),
                kind: ElementKind::Character,
                label: "Hiker".to_string(),
                description: "Woman in a red jacket".to_string(),
                remix_options: vec![],
            },
            DetectedElement {
                id: "el-2".to_string(),
                kind: ElementKind::Background,
                label: "Mountains".to_string(),
                description: String::new(),
                remix_options: vec![],
            },
        ],
    }
}

#[async_trait]
impl ElementAnalyzer for FakeAnalyzer {
    async fn analyze_video(&self, video: &[u8], file_name: &str) -> PipelineResult<AnalysisDraft> {
        self.video_calls.fetch_add(1, Ordering::SeqCst);
        assert!(!video.is_empty());
        assert!(file_name.ends_with(".mp4"));
        Ok(draft())
    }

    async fn analyze_frames(&self, frames: &ExtractedFrames) -> PipelineResult<AnalysisDraft> {
        self.frame_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(frames.count, 3);
        Ok(draft())
    }
}

#[derive(Default)]
struct FakeOptions {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl OptionsGenerator for FakeOptions {
    async fn generate_options(&self, elements: &[DetectedElement]) -> PipelineResult<Vec<ElementOptions>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::stage_failure("options", "rate limited"));
        }
        Ok(elements
            .iter()
            .map(|e| ElementOptions {
                id: e.id.clone(),
                remix_options: vec![RemixOption {
                    id: format!("{}-opt", e.id),
                    label: "Astronaut".to_string(),
                    icon: "🚀".to_string(),
                    prompt: format!("Replace {} with an astronaut", e.label),
                }],
            })
            .collect())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    objects: Arc<MemoryObjectStore>,
    source: Arc<FakeSource>,
    frames: Arc<FakeFrames>,
    analyzer: Arc<FakeAnalyzer>,
    options: Arc<FakeOptions>,
    pipeline: ReelPipeline,
    dir: TempDir,
}

struct Setup {
    object_store: bool,
    enrichment: bool,
    source: FakeSource,
    frames: FakeFrames,
    options: FakeOptions,
    config: PipelineConfig,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            object_store: true,
            enrichment: true,
            source: FakeSource::default(),
            frames: FakeFrames::default(),
            options: FakeOptions::default(),
            config: PipelineConfig::default(),
        }
    }
}

fn harness_with(setup: Setup) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let source = Arc::new(setup.source);
    let frames = Arc::new(setup.frames);
    let analyzer = Arc::new(FakeAnalyzer::default());
    let options = Arc::new(setup.options);

    let object_store: Option<Arc<dyn ObjectStore>> = if setup.object_store {
        Some(objects.clone())
    } else {
        None
    };
    let vault = VideoVault::new(object_store, LocalStore::new(dir.path()));
    let enrichment: Option<Arc<dyn OptionsGenerator>> = if setup.enrichment {
        Some(options.clone())
    } else {
        None
    };

    let pipeline = ReelPipeline::new(
        store.clone(),
        vault,
        StageServices {
            source: source.clone(),
            frames: frames.clone(),
            analyzer: analyzer.clone(),
            options: enrichment,
        },
        PipelineConfig {
            downloads_dir: dir.path().to_path_buf(),
            ..setup.config
        },
    );

    Harness {
        store,
        objects,
        source,
        frames,
        analyzer,
        options,
        pipeline,
        dir,
    }
}

fn harness() -> Harness {
    harness_with(Setup::default())
}

impl Harness {
    async fn add_reel(&self, reel: Reel) -> ReelId {
        let id = reel.id.clone();
        self.store.create_reel(&reel).await.unwrap();
        id
    }

    /// A reel whose video is already in object storage.
    async fn add_downloaded_reel(&self, id: &str) -> ReelId {
        let key = format!("reels/{}.mp4", id);
        self.objects
            .put(&key, VIDEO.to_vec(), VIDEO_CONTENT_TYPE)
            .await
            .unwrap();
        self.add_reel(Reel::new(id, "reels").with_location(VideoLocation::object(key)))
            .await
    }

    async fn reel(&self, id: &ReelId) -> Reel {
        self.store.get_reel(id).await.unwrap().unwrap()
    }

    /// Status transitions in the order they were written.
    async fn status_history(&self, id: &ReelId) -> Vec<String> {
        let mut logs = self.store.list_reel_logs(id, 1000).await.unwrap();
        logs.reverse();
        logs.iter()
            .filter_map(|l| l.message.strip_prefix("Status changed to: "))
            .map(str::to_string)
            .collect()
    }

    fn stage_calls(&self) -> usize {
        self.source.downloads.load(Ordering::SeqCst) + self.analyzer.calls()
    }
}

#[tokio::test]
async fn test_process_new_reel_runs_all_stages_then_short_circuits() {
    let h = harness();
    let id = h.add_reel(Reel::new("R1", "reels")).await;
    assert_eq!(h.reel(&id).await.status(), ReelStatus::Scraped);

    let template = h.pipeline.process_reel(&id, ProcessOptions::default()).await.unwrap();

    assert_eq!(
        h.status_history(&id).await,
        vec!["downloading", "downloaded", "analyzing", "analyzed"]
    );
    let reel = h.reel(&id).await;
    assert_eq!(reel.status(), ReelStatus::Analyzed);
    assert_eq!(reel.video_location(), Some(VideoLocation::object("reels/R1.mp4")));
    assert_eq!(reel.metadata.author.as_deref(), Some("alpine.daily"));

    let analysis = h.store.find_analysis_for_reel(&id).await.unwrap().unwrap();
    assert_eq!(template.analysis_id, analysis.id);
    assert_eq!(template.reel_id, id);
    assert_eq!(template.tags, vec!["nature", "cinematic"]);
    assert_eq!(template.category, "cinematic");
    assert!(template.is_published);
    assert_eq!(analysis.analysis_type, AnalysisType::Standard);
    assert_eq!(analysis.elements[0].remix_options.len(), 1);

    let calls_before = h.stage_calls();
    let again = h.pipeline.process_reel(&id, ProcessOptions::default()).await.unwrap();
    assert_eq!(again.id, template.id);
    assert_eq!(h.stage_calls(), calls_before);
    assert_eq!(h.store.template_count().await, 1);
}

#[tokio::test]
async fn test_forced_reprocess_replaces_template_and_reanalyzes() {
    let h = harness();
    let id = h.add_downloaded_reel("R2").await;
    let first = h.pipeline.process_reel(&id, ProcessOptions::default()).await.unwrap();
    assert_eq!(h.analyzer.calls(), 1);

    let second = h.pipeline.process_reel(&id, ProcessOptions::forced()).await.unwrap();

    assert_ne!(second.id, first.id);
    assert_eq!(h.analyzer.calls(), 2);
    assert!(h.store.get_template(&first.id).await.unwrap().is_none());
    assert_eq!(h.store.template_count().await, 1);
    // The previous analysis survives its template.
    assert!(h.store.get_analysis(&first.analysis_id).await.unwrap().is_some());
    assert_eq!(h.store.analysis_count().await, 2);
    assert_ne!(second.analysis_id, first.analysis_id);
    // Video already stored, so nothing was downloaded.
    assert_eq!(h.source.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_video_with_skip_download_fails_before_analysis() {
    let h = harness();
    let id = h.add_reel(Reel::new("R3", "reels")).await;

    let options = ProcessOptions {
        skip_download: true,
        ..ProcessOptions::default()
    };
    let err = h.pipeline.process_reel(&id, options).await.unwrap_err();

    assert!(matches!(err, PipelineError::PreconditionFailed(_)));
    assert!(err.is_permanent());
    assert_eq!(h.analyzer.calls(), 0);
    assert_eq!(h.source.downloads.load(Ordering::SeqCst), 0);

    let reel = h.reel(&id).await;
    assert_eq!(reel.status(), ReelStatus::Failed);
    assert!(reel.state.error_message.unwrap().contains("has no video file"));
    assert_eq!(h.store.template_count().await, 0);
}

#[tokio::test]
async fn test_existing_analysis_is_reused() {
    let h = harness();
    let id = h.add_downloaded_reel("R4").await;
    let analysis = h.pipeline.analyze_reel(&id).await.unwrap();
    assert_eq!(h.analyzer.calls(), 1);

    let template = h.pipeline.process_reel(&id, ProcessOptions::default()).await.unwrap();

    assert_eq!(template.analysis_id, analysis.id);
    assert_eq!(h.analyzer.calls(), 1);
}

#[tokio::test]
async fn test_skip_analysis_without_analysis_is_rejected() {
    let h = harness();
    let id = h.add_downloaded_reel("R5").await;

    let options = ProcessOptions {
        skip_analysis: true,
        ..ProcessOptions::default()
    };
    let err = h.pipeline.process_reel(&id, options).await.unwrap_err();

    assert!(matches!(err, PipelineError::PreconditionFailed(ref m) if m.contains("Analysis is required")));
    assert_eq!(h.analyzer.calls(), 0);
    assert_eq!(h.reel(&id).await.status(), ReelStatus::Failed);
}

#[tokio::test]
async fn test_frame_analysis() {
    let h = harness();
    let id = h.add_downloaded_reel("R6").await;

    let options = ProcessOptions {
        use_frames: true,
        ..ProcessOptions::default()
    };
    let template = h.pipeline.process_reel(&id, options).await.unwrap();

    assert_eq!(h.frames.extract_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.analyzer.frame_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.analyzer.video_calls.load(Ordering::SeqCst), 0);
    let analysis = h.store.get_analysis(&template.analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.analysis_type, AnalysisType::Frames);
}

#[tokio::test]
async fn test_unknown_reel_is_not_found() {
    let h = harness();
    let err = h
        .pipeline
        .process_reel(&ReelId::from("missing"), ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn test_download_failure_marks_reel_failed() {
    let h = harness();
    h.source.fail_download.store(true, Ordering::SeqCst);
    let id = h.add_reel(Reel::new("R7", "reels")).await;

    let err = h.pipeline.process_reel(&id, ProcessOptions::default()).await.unwrap_err();

    assert!(err.is_retryable());
    let reel = h.reel(&id).await;
    assert_eq!(reel.status(), ReelStatus::Failed);
    assert_eq!(reel.state.error_message.as_deref(), Some("Video not available"));
    assert_eq!(reel.state.progress, 0);
    assert_eq!(reel.state.progress_message, "Error: Video not available");
    assert_eq!(h.analyzer.calls(), 0);
    // Recorded once by the download stage, not again by the orchestrator.
    assert_eq!(
        h.status_history(&id).await,
        vec!["downloading", "failed"]
    );
}

#[tokio::test]
async fn test_download_times_out() {
    let h = harness_with(Setup {
        source: FakeSource {
            delay: Some(Duration::from_secs(5)),
            ..FakeSource::default()
        },
        config: PipelineConfig {
            download_timeout: Duration::from_millis(50),
            ..PipelineConfig::default()
        },
        ..Setup::default()
    });
    let id = h.add_reel(Reel::new("R8", "reels")).await;

    let err = h.pipeline.download_reel(&id).await.unwrap_err();

    assert!(matches!(err, PipelineError::StageFailure { ref stage, .. } if stage == "download"));
    assert_eq!(h.reel(&id).await.status(), ReelStatus::Failed);
}

#[tokio::test]
async fn test_upload_failure_falls_back_to_local_disk() {
    let h = harness();
    h.objects.fail_puts(true);
    let id = h.add_reel(Reel::new("R9", "travel")).await;

    let location = h.pipeline.download_reel(&id).await.unwrap();

    let VideoLocation::Local { path } = &location else {
        panic!("expected a local location, got {}", location);
    };
    assert!(path.starts_with(h.dir.path().to_str().unwrap()));
    assert!(path.ends_with("travel/R9.mp4"));
    assert_eq!(tokio::fs::read(path).await.unwrap(), VIDEO);

    let reel = h.reel(&id).await;
    assert_eq!(reel.status(), ReelStatus::Downloaded);
    assert_eq!(reel.state.progress, 100);
    assert_eq!(reel.local_path.as_deref(), Some(path.as_str()));
}

#[tokio::test]
async fn test_local_only_storage() {
    let h = harness_with(Setup {
        object_store: false,
        ..Setup::default()
    });
    let id = h.add_reel(Reel::new("R10", "reels")).await;

    let template = h.pipeline.process_reel(&id, ProcessOptions::default()).await.unwrap();

    assert!(matches!(h.reel(&id).await.video_location(), Some(VideoLocation::Local { .. })));
    assert!(h.objects.keys().await.is_empty());
    assert_eq!(template.reel_id, id);
}

#[tokio::test]
async fn test_metadata_and_resize_failures_are_degraded() {
    let h = harness_with(Setup {
        frames: FakeFrames {
            fail_resize: true,
            ..FakeFrames::default()
        },
        ..Setup::default()
    });
    h.source.fail_metadata.store(true, Ordering::SeqCst);
    let id = h.add_reel(Reel::new("R11", "reels")).await;

    h.pipeline.download_reel(&id).await.unwrap();

    assert_eq!(h.reel(&id).await.status(), ReelStatus::Downloaded);
    assert_eq!(h.objects.get("reels/R11.mp4").await.unwrap(), VIDEO);
    let warnings: Vec<_> = h
        .store
        .list_reel_logs(&id, 100)
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.level == LogLevel::Warn)
        .collect();
    assert_eq!(warnings.len(), 2);
}

#[tokio::test]
async fn test_upscaled_video_is_stored() {
    let h = harness_with(Setup {
        frames: FakeFrames {
            upscale: true,
            ..FakeFrames::default()
        },
        ..Setup::default()
    });
    let id = h.add_reel(Reel::new("R12", "reels")).await;

    h.pipeline.download_reel(&id).await.unwrap();

    let stored = h.objects.get("reels/R12.mp4").await.unwrap();
    assert!(stored.ends_with(b"-upscaled"));
}

#[tokio::test]
async fn test_option_failure_keeps_analysis() {
    let h = harness_with(Setup {
        options: FakeOptions {
            fail: true,
            ..FakeOptions::default()
        },
        ..Setup::default()
    });
    let id = h.add_downloaded_reel("R13").await;

    let analysis = h.pipeline.analyze_reel(&id).await.unwrap();

    assert_eq!(h.options.calls.load(Ordering::SeqCst), 1);
    assert_eq!(analysis.elements.len(), 2);
    assert!(analysis.elements.iter().all(|e| e.remix_options.is_empty()));
    assert_eq!(h.reel(&id).await.status(), ReelStatus::Analyzed);
}

#[tokio::test]
async fn test_enchanting_requires_enrichment() {
    let h = harness_with(Setup {
        enrichment: false,
        ..Setup::default()
    });
    let id = h.add_downloaded_reel("R14").await;

    let err = h.pipeline.analyze_reel_enchanting(&id).await.unwrap_err();

    assert!(matches!(err, PipelineError::PreconditionFailed(_)));
    assert_eq!(h.analyzer.calls(), 0);
    // Rejected before any write.
    assert_eq!(h.reel(&id).await.status(), ReelStatus::Scraped);
    assert!(h.status_history(&id).await.is_empty());
}

#[tokio::test]
async fn test_enchanting_attaches_options() {
    let h = harness();
    let id = h.add_downloaded_reel("R15").await;

    let analysis = h.pipeline.analyze_reel_enchanting(&id).await.unwrap();

    assert_eq!(analysis.analysis_type, AnalysisType::Enchanting);
    assert!(analysis.elements.iter().all(|e| e.remix_options.len() == 1));
    assert_eq!(h.reel(&id).await.state.progress, 100);
}

#[tokio::test]
async fn test_enchanting_option_failure_fails_stage() {
    let h = harness_with(Setup {
        options: FakeOptions {
            fail: true,
            ..FakeOptions::default()
        },
        ..Setup::default()
    });
    let id = h.add_downloaded_reel("R16").await;

    let err = h.pipeline.analyze_reel_enchanting(&id).await.unwrap_err();

    assert!(matches!(err, PipelineError::StageFailure { .. }));
    let reel = h.reel(&id).await;
    assert_eq!(reel.status(), ReelStatus::Failed);
    assert_eq!(reel.state.progress, 0);
    assert_eq!(h.store.analysis_count().await, 0);
}

#[tokio::test]
async fn test_template_requires_matching_analysis() {
    let h = harness();
    let a = h.add_downloaded_reel("R17").await;
    let b = h.add_downloaded_reel("R18").await;
    let analysis = h.pipeline.analyze_reel(&a).await.unwrap();

    let err = h.pipeline.create_template(&b, &analysis.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::PreconditionFailed(_)));

    let err = h.pipeline.create_template(&a, "no-such-analysis").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn test_reel_details() {
    let h = harness();
    let id = h.add_downloaded_reel("R19").await;
    let template = h.pipeline.process_reel(&id, ProcessOptions::default()).await.unwrap();

    let details = h.pipeline.get_reel_with_details(&id).await.unwrap().unwrap();

    assert_eq!(details.reel.id, id);
    let template_details = details.template.unwrap();
    assert_eq!(template_details.template.id, template.id);
    assert_eq!(template_details.analysis.unwrap().id, template.analysis_id);
    assert!(!details.logs.is_empty());
    assert_eq!(details.logs[0].message, "Starting full pipeline processing");
    assert_eq!(
        details.logs.last().unwrap().message,
        "Pipeline completed successfully"
    );

    assert!(h
        .pipeline
        .get_reel_with_details(&ReelId::from("missing"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_delete_reel_removes_records_and_video() {
    let h = harness();
    let id = h.add_downloaded_reel("R20").await;
    h.pipeline.process_reel(&id, ProcessOptions::default()).await.unwrap();

    assert!(h.pipeline.delete_reel(&id).await.unwrap());

    assert!(h.store.get_reel(&id).await.unwrap().is_none());
    assert!(h.store.find_template_for_reel(&id).await.unwrap().is_none());
    assert!(h.store.list_analyses_for_reel(&id).await.unwrap().is_empty());
    assert!(h.store.list_reel_logs(&id, 10).await.unwrap().is_empty());

    // Video removal runs in the background.
    for _ in 0..50 {
        if !h.objects.contains("reels/R20.mp4").await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!h.objects.contains("reels/R20.mp4").await);

    assert!(!h.pipeline.delete_reel(&id).await.unwrap());
}

fn assert_send<T: Send>(_: T) {}

#[test]
fn test_pipeline_futures_can_be_spawned() {
    let h = harness();
    let id = ReelId::from("R-send");
    assert_send(h.pipeline.process_reel(&id, ProcessOptions::default()));
    assert_send(h.pipeline.download_reel(&id));
    assert_send(h.pipeline.analyze_with(&id, AnalysisType::Frames));
    assert_send(h.pipeline.create_template(&id, "a-1"));
}
