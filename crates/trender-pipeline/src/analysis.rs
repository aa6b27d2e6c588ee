//! Analysis stage: detect elements in a reel's video and persist an [`Analysis`].
//!
//! Three strategies share the same lifecycle:
//! - `standard` sends the whole video to the analysis provider
//! - `frames` samples frames first and analyzes those
//! - `enchanting` is `standard` with mandatory remix-option enrichment
//!
//! Preconditions (a stored video, and an enrichment provider for
//! `enchanting`) are checked before the reel is touched.

use std::sync::Arc;

use serde_json::json;

use trender_models::{
    Analysis, AnalysisDraft, AnalysisType, DetectedElement, Reel, ReelId, ReelStatus,
    VideoLocation,
};
use trender_store::Store;

use crate::collaborators::{ElementAnalyzer, ElementOptions, FrameService, OptionsGenerator};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::state::ReelTracker;
use crate::video::VideoVault;

const STAGE: &str = "analyze";
const PROCESSING_STAGE: &str = "processing";

/// Runs the analysis strategies against the stored video.
#[derive(Clone)]
pub struct AnalysisService {
    store: Arc<dyn Store>,
    tracker: ReelTracker,
    vault: VideoVault,
    analyzer: Arc<dyn ElementAnalyzer>,
    frames: Arc<dyn FrameService>,
    options: Option<Arc<dyn OptionsGenerator>>,
    config: PipelineConfig,
}

impl AnalysisService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        tracker: ReelTracker,
        vault: VideoVault,
        analyzer: Arc<dyn ElementAnalyzer>,
        frames: Arc<dyn FrameService>,
        options: Option<Arc<dyn OptionsGenerator>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            vault,
            analyzer,
            frames,
            options,
            config,
        }
    }

    /// True when remix-option enrichment is available.
    pub fn has_enrichment(&self) -> bool {
        self.options.is_some()
    }

    /// Analyze the reel with the given strategy, moving it `analyzing -> analyzed`.
    pub async fn analyze(
        &self,
        reel_id: &ReelId,
        analysis_type: AnalysisType,
    ) -> PipelineResult<Analysis> {
        let reel = self
            .store
            .get_reel(reel_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("Reel {} not found", reel_id)))?;

        let location = reel.video_location().ok_or_else(|| {
            PipelineError::precondition(format!(
                "Reel {} has no video file (neither object storage nor local). Download first.",
                reel_id
            ))
        })?;

        let enrichment = match (analysis_type, &self.options) {
            (AnalysisType::Enchanting, None) => {
                return Err(PipelineError::precondition(
                    "Enrichment service is not configured. Set ENRICHMENT_SERVICE_URL.",
                ))
            }
            (_, options) => options.clone(),
        };

        self.tracker
            .update_status(reel_id, ReelStatus::Analyzing, None)
            .await?;
        self.tracker
            .update_progress(reel_id, STAGE, 0, start_message(analysis_type))
            .await?;

        let timer = self
            .tracker
            .logger()
            .start_timer(reel_id, STAGE, timer_message(analysis_type))
            .await;

        let result = match analysis_type {
            AnalysisType::Standard => self.run_standard(&reel, &location, enrichment).await,
            AnalysisType::Frames => self.run_frames(&reel, &location, enrichment).await,
            AnalysisType::Enchanting => self.run_enchanting(&reel, &location, enrichment).await,
        };

        match result {
            Ok((analysis, frame_count)) => {
                self.tracker
                    .update_status(reel_id, ReelStatus::Analyzed, None)
                    .await?;
                let mut summary = json!({
                    "analysisId": analysis.id,
                    "analysisType": analysis_type.as_str(),
                    "elementsCount": analysis.elements.len(),
                    "tags": analysis.tags,
                });
                if let Some(count) = frame_count {
                    summary["frameCount"] = json!(count);
                }
                timer.stop("Video analyzed successfully", Some(summary)).await;
                Ok(analysis)
            }
            Err(e) => {
                self.tracker
                    .record_failure(reel_id, STAGE, &e.reel_message())
                    .await;
                timer.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn run_standard(
        &self,
        reel: &Reel,
        location: &VideoLocation,
        enrichment: Option<Arc<dyn OptionsGenerator>>,
    ) -> PipelineResult<(Analysis, Option<usize>)> {
        let bytes = self.load_video(&reel.id, location).await?;

        self.progress(&reel.id, STAGE, 10, "Detecting video elements...")
            .await?;
        let mut draft = self.analyzer.analyze_video(&bytes, &file_name(&reel.id)).await?;

        if let Some(generator) = enrichment {
            draft.elements = self
                .enrich_optional(&reel.id, generator.as_ref(), draft.elements, 60)
                .await?;
        }

        let analysis = self.save(&reel.id, AnalysisType::Standard, draft).await?;
        Ok((analysis, None))
    }

    async fn run_frames(
        &self,
        reel: &Reel,
        location: &VideoLocation,
        enrichment: Option<Arc<dyn OptionsGenerator>>,
    ) -> PipelineResult<(Analysis, Option<usize>)> {
        let bytes = self.load_video(&reel.id, location).await?;

        self.progress(&reel.id, PROCESSING_STAGE, 5, "Extracting frames from video...")
            .await?;
        let frames = self
            .frames
            .extract_frames(&bytes, self.config.frame_interval_sec)
            .await?;
        if frames.frames.is_empty() {
            return Err(PipelineError::stage_failure(STAGE, "No frames extracted from video"));
        }

        self.progress(
            &reel.id,
            PROCESSING_STAGE,
            40,
            &format!("Extracted {} frames, analyzing...", frames.count),
        )
        .await?;
        let mut draft = self.analyzer.analyze_frames(&frames).await?;

        if let Some(generator) = enrichment {
            draft.elements = self
                .enrich_optional(&reel.id, generator.as_ref(), draft.elements, 70)
                .await?;
        }

        let analysis = self.save(&reel.id, AnalysisType::Frames, draft).await?;
        Ok((analysis, Some(frames.count)))
    }

    async fn run_enchanting(
        &self,
        reel: &Reel,
        location: &VideoLocation,
        enrichment: Option<Arc<dyn OptionsGenerator>>,
    ) -> PipelineResult<(Analysis, Option<usize>)> {
        let generator = enrichment.ok_or_else(|| {
            PipelineError::precondition("Enrichment service is not configured")
        })?;
        let bytes = self.load_video(&reel.id, location).await?;

        self.progress(&reel.id, STAGE, 10, "Detecting video elements...")
            .await?;
        let mut draft = self.analyzer.analyze_video(&bytes, &file_name(&reel.id)).await?;

        self.progress(
            &reel.id,
            STAGE,
            60,
            &format!("Generating options for {} elements...", draft.elements.len()),
        )
        .await?;
        let options = generator.generate_options(&draft.elements).await?;
        draft.elements = apply_options(draft.elements, options);

        let analysis = self.save(&reel.id, AnalysisType::Enchanting, draft).await?;
        Ok((analysis, None))
    }

    async fn load_video(&self, reel_id: &ReelId, location: &VideoLocation) -> PipelineResult<Vec<u8>> {
        self.progress(reel_id, STAGE, 2, "Loading video file...").await?;
        Ok(self.vault.load(location).await?)
    }

    /// Attach remix options. A failing provider leaves the elements as they are.
    async fn enrich_optional(
        &self,
        reel_id: &ReelId,
        generator: &dyn OptionsGenerator,
        elements: Vec<DetectedElement>,
        percent: u8,
    ) -> PipelineResult<Vec<DetectedElement>> {
        if elements.is_empty() {
            return Ok(elements);
        }

        self.progress(
            reel_id,
            STAGE,
            percent,
            &format!("Generating options for {} elements...", elements.len()),
        )
        .await?;

        match generator.generate_options(&elements).await {
            Ok(options) => Ok(apply_options(elements, options)),
            Err(e) => {
                metrics::record_degraded("options");
                self.tracker
                    .logger()
                    .warn(reel_id, STAGE, format!("Option generation failed: {}", e))
                    .await;
                Ok(elements)
            }
        }
    }

    async fn save(
        &self,
        reel_id: &ReelId,
        analysis_type: AnalysisType,
        draft: AnalysisDraft,
    ) -> PipelineResult<Analysis> {
        self.progress(reel_id, STAGE, 95, "Saving analysis results...")
            .await?;
        let analysis = Analysis::from_draft(reel_id.clone(), analysis_type, file_name(reel_id), draft);
        self.store.create_analysis(&analysis).await?;
        self.progress(reel_id, STAGE, 100, "Analysis complete").await?;
        Ok(analysis)
    }

    async fn progress(
        &self,
        reel_id: &ReelId,
        stage: &str,
        percent: u8,
        message: &str,
    ) -> PipelineResult<()> {
        self.tracker
            .update_progress(reel_id, stage, percent, message)
            .await
    }
}

/// Match generated options to elements by id. Unmatched elements get none.
fn apply_options(elements: Vec<DetectedElement>, options: Vec<ElementOptions>) -> Vec<DetectedElement> {
    elements
        .into_iter()
        .map(|mut element| {
            element.remix_options = options
                .iter()
                .find(|o| o.id == element.id)
                .map(|o| o.remix_options.clone())
                .unwrap_or_default();
            element
        })
        .collect()
}

fn file_name(reel_id: &ReelId) -> String {
    format!("{}.mp4", reel_id)
}

fn start_message(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::Standard => "Starting analysis...",
        AnalysisType::Frames => "Starting frame-by-frame analysis...",
        AnalysisType::Enchanting => "Starting enchanting analysis...",
    }
}

fn timer_message(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::Standard => "Analyzing video",
        AnalysisType::Frames => "Analyzing video by frames",
        AnalysisType::Enchanting => "Analyzing video with option enrichment",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trender_models::{ElementKind, RemixOption};

    fn element(id: &str) -> DetectedElement {
        DetectedElement {
            id: id.to_string(),
            kind: ElementKind::Character,
            label: id.to_string(),
            description: String::new(),
            remix_options: vec![],
        }
    }

    #[test]
    fn test_apply_options_matches_by_id() {
        let options = vec![ElementOptions {
            id: "b".to_string(),
            remix_options: vec![RemixOption {
                id: "b1".to_string(),
                label: "Astronaut".to_string(),
                icon: String::new(),
                prompt: "replace with an astronaut".to_string(),
            }],
        }];

        let merged = apply_options(vec![element("a"), element("b")], options);
        assert!(merged[0].remix_options.is_empty());
        assert_eq!(merged[1].remix_options.len(), 1);
        assert_eq!(merged[1].remix_options[0].label, "Astronaut");
    }
}
