//! Reel processing state machine.
//!
//! Stages run in a fixed order: download, analyze, template. Each stage
//! persists status and progress as it goes; a reel with a template is
//! returned as-is unless reprocessing is forced.
//!
//! There is no per-reel lock. Two concurrent `process_reel` calls for the
//! same reel may both run stages; the last write wins.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn, Instrument};

use trender_models::{
    Analysis, AnalysisType, ProcessOptions, Reel, ReelId, ReelLog, ReelStatus, Template,
    VideoLocation,
};
use trender_store::Store;

use crate::analysis::AnalysisService;
use crate::classifier::{detect_category, template_tags};
use crate::collaborators::{ElementAnalyzer, FrameService, OptionsGenerator, VideoSource};
use crate::config::PipelineConfig;
use crate::download::DownloadService;
use crate::error::{PipelineError, PipelineResult};
use crate::logger::PipelineLogger;
use crate::state::ReelTracker;
use crate::video::VideoVault;

const PIPELINE_STAGE: &str = "pipeline";
const TEMPLATE_STAGE: &str = "template";

/// Log rows returned with reel details.
pub const DETAIL_LOG_LIMIT: u32 = 100;

/// External services the stages call.
#[derive(Clone)]
pub struct StageServices {
    pub source: Arc<dyn VideoSource>,
    pub frames: Arc<dyn FrameService>,
    pub analyzer: Arc<dyn ElementAnalyzer>,
    /// Remix-option enrichment; required only by enchanting analysis
    pub options: Option<Arc<dyn OptionsGenerator>>,
}

/// A template together with the analysis it was built from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDetails {
    #[serde(flatten)]
    pub template: Template,
    pub analysis: Option<Analysis>,
}

/// A reel with its log timeline and current template.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReelDetails {
    #[serde(flatten)]
    pub reel: Reel,
    /// Oldest first
    pub logs: Vec<ReelLog>,
    pub template: Option<TemplateDetails>,
}

/// Drives reels through download, analysis and template creation.
#[derive(Clone)]
pub struct ReelPipeline {
    store: Arc<dyn Store>,
    tracker: ReelTracker,
    downloads: DownloadService,
    analyses: AnalysisService,
    vault: VideoVault,
}

impl ReelPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        vault: VideoVault,
        services: StageServices,
        config: PipelineConfig,
    ) -> Self {
        let logger = PipelineLogger::new(store.clone());
        let tracker = ReelTracker::new(store.clone(), logger);

        let downloads = DownloadService::new(
            store.clone(),
            tracker.clone(),
            services.source,
            services.frames.clone(),
            vault.clone(),
            config.clone(),
        );
        let analyses = AnalysisService::new(
            store.clone(),
            tracker.clone(),
            vault.clone(),
            services.analyzer,
            services.frames,
            services.options,
            config,
        );

        Self {
            store,
            tracker,
            downloads,
            analyses,
            vault,
        }
    }

    pub fn logger(&self) -> &PipelineLogger {
        self.tracker.logger()
    }

    /// Persist status and error. Transitions are not validated.
    pub async fn update_status(
        &self,
        reel_id: &ReelId,
        status: ReelStatus,
        error: Option<&str>,
    ) -> PipelineResult<()> {
        self.tracker.update_status(reel_id, status, error).await
    }

    pub async fn update_progress(
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

    pub async fn download_reel(&self, reel_id: &ReelId) -> PipelineResult<VideoLocation> {
        self.downloads
            .download(reel_id)
            .instrument(PipelineLogger::create_span(reel_id, "download"))
            .await
    }

    pub async fn analyze_reel(&self, reel_id: &ReelId) -> PipelineResult<Analysis> {
        self.analyze_with(reel_id, AnalysisType::Standard).await
    }

    pub async fn analyze_reel_by_frames(&self, reel_id: &ReelId) -> PipelineResult<Analysis> {
        self.analyze_with(reel_id, AnalysisType::Frames).await
    }

    pub async fn analyze_reel_enchanting(&self, reel_id: &ReelId) -> PipelineResult<Analysis> {
        self.analyze_with(reel_id, AnalysisType::Enchanting).await
    }

    /// Run one analysis strategy.
    pub async fn analyze_with(
        &self,
        reel_id: &ReelId,
        analysis_type: AnalysisType,
    ) -> PipelineResult<Analysis> {
        self.analyses
            .analyze(reel_id, analysis_type)
            .instrument(PipelineLogger::create_span(reel_id, "analyze"))
            .await
    }

    /// Build and persist a template from an analysis of this reel, then mark
    /// the reel `analyzed`.
    pub async fn create_template(
        &self,
        reel_id: &ReelId,
        analysis_id: &str,
    ) -> PipelineResult<Template> {
        let reel = self.require_reel(reel_id).await?;
        let analysis = self
            .store
            .get_analysis(analysis_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("Analysis {} not found", analysis_id)))?;
        if analysis.reel_id != *reel_id {
            return Err(PipelineError::precondition(format!(
                "Analysis {} belongs to reel {}, not {}",
                analysis_id, analysis.reel_id, reel_id
            )));
        }

        let timer = self
            .logger()
            .start_timer(reel_id, TEMPLATE_STAGE, "Creating template")
            .await;

        match self.insert_template(&reel, &analysis).await {
            Ok(template) => {
                timer
                    .stop(
                        "Template created successfully",
                        Some(json!({ "templateId": template.id, "tags": template.tags })),
                    )
                    .await;
                Ok(template)
            }
            Err(e) => {
                timer.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn insert_template(&self, reel: &Reel, analysis: &Analysis) -> PipelineResult<Template> {
        let template = Template::new(
            reel.id.clone(),
            analysis.id.clone(),
            template_tags(analysis),
            detect_category(&analysis.style),
        );
        self.store.create_template(&template).await?;

        if reel.status() != ReelStatus::Analyzed {
            self.tracker
                .update_status(&reel.id, ReelStatus::Analyzed, None)
                .await?;
        }
        Ok(template)
    }

    /// Full orchestration: download, analyze, template.
    ///
    /// Returns the existing template untouched unless `force_reprocess` is set.
    /// A failing stage stops the run; the failure is recorded on the reel and
    /// returned.
    ///
    /// `skip_analysis` skips running an analyzer but still reuses an analysis
    /// already stored for the reel. Only when none exists is the template
    /// stage rejected.
    pub async fn process_reel(
        &self,
        reel_id: &ReelId,
        options: ProcessOptions,
    ) -> PipelineResult<Template> {
        let reel = self.require_reel(reel_id).await?;

        if !options.force_reprocess {
            if let Some(template) = self.store.find_template_for_reel(reel_id).await? {
                self.logger()
                    .info(
                        reel_id,
                        PIPELINE_STAGE,
                        "Reel already processed, returning existing template",
                    )
                    .await;
                return Ok(template);
            }
        }

        self.logger()
            .info_with(
                reel_id,
                PIPELINE_STAGE,
                "Starting full pipeline processing",
                json!({ "currentStatus": reel.status(), "options": options }),
            )
            .await;

        match self.run_stages(&reel, options).await {
            Ok(template) => {
                self.logger()
                    .info_with(
                        reel_id,
                        PIPELINE_STAGE,
                        "Pipeline completed successfully",
                        json!({ "templateId": template.id }),
                    )
                    .await;
                Ok(template)
            }
            Err(e) => {
                self.ensure_failure_recorded(reel_id, &e).await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, reel: &Reel, options: ProcessOptions) -> PipelineResult<Template> {
        let reel_id = &reel.id;

        if !(options.skip_download || reel.has_video()) {
            self.download_reel(reel_id).await?;
        }

        let existing = self.store.find_analysis_for_reel(reel_id).await?;
        let analysis = if options.skip_analysis {
            existing
        } else {
            match existing {
                Some(analysis) if !options.force_reprocess => {
                    self.logger()
                        .info(reel_id, "analyze", "Using existing analysis")
                        .await;
                    Some(analysis)
                }
                _ if options.use_frames => {
                    self.logger()
                        .info(reel_id, "analyze", "Using frame-by-frame analysis")
                        .await;
                    Some(self.analyze_reel_by_frames(reel_id).await?)
                }
                _ => Some(self.analyze_reel(reel_id).await?),
            }
        };
        let analysis = analysis
            .ok_or_else(|| PipelineError::precondition("Analysis is required to create template"))?;

        match self.store.find_template_for_reel(reel_id).await? {
            Some(template) if !options.force_reprocess => Ok(template),
            previous => {
                if let Some(previous) = previous {
                    self.store.delete_template(&previous.id).await?;
                    info!(reel_id = %reel_id, template_id = %previous.id, "Deleted previous template");
                }
                self.create_template(reel_id, &analysis.id).await
            }
        }
    }

    /// Mark the reel failed unless the failing stage already did.
    async fn ensure_failure_recorded(&self, reel_id: &ReelId, err: &PipelineError) {
        let message = err.reel_message();
        let recorded = match self.store.get_reel(reel_id).await {
            Ok(Some(reel)) => {
                reel.status() == ReelStatus::Failed
                    && reel.state.error_message.as_deref() == Some(message.as_str())
            }
            Ok(None) => return,
            Err(e) => {
                warn!(reel_id = %reel_id, error = %e, "Failed to read reel after pipeline failure");
                false
            }
        };
        if !recorded {
            self.tracker
                .record_failure(reel_id, PIPELINE_STAGE, &message)
                .await;
        }
    }

    /// Reel with its latest log rows and current template.
    pub async fn get_reel_with_details(&self, reel_id: &ReelId) -> PipelineResult<Option<ReelDetails>> {
        let Some(reel) = self.store.get_reel(reel_id).await? else {
            return Ok(None);
        };

        let mut logs = self.store.list_reel_logs(reel_id, DETAIL_LOG_LIMIT).await?;
        logs.reverse();

        let template = match self.store.find_template_for_reel(reel_id).await? {
            Some(template) => {
                let analysis = self.store.get_analysis(&template.analysis_id).await?;
                Some(TemplateDetails { template, analysis })
            }
            None => None,
        };

        Ok(Some(ReelDetails {
            reel,
            logs,
            template,
        }))
    }

    /// Delete a reel with its logs, analyses and template. Stored videos are
    /// removed in the background; those failures are only logged.
    ///
    /// Returns `false` if the reel does not exist.
    pub async fn delete_reel(&self, reel_id: &ReelId) -> PipelineResult<bool> {
        let Some(reel) = self.store.get_reel(reel_id).await? else {
            return Ok(false);
        };

        let logs = self.store.delete_reel_logs(reel_id).await?;
        if let Some(template) = self.store.find_template_for_reel(reel_id).await? {
            self.store.delete_template(&template.id).await?;
        }
        let analyses = self.store.list_analyses_for_reel(reel_id).await?;
        for analysis in &analyses {
            self.store.delete_analysis(&analysis.id).await?;
        }
        self.store.delete_reel(reel_id).await?;

        info!(
            reel_id = %reel_id,
            logs = logs,
            analyses = analyses.len(),
            "Deleted reel"
        );

        let locations = stored_videos(&reel);
        if !locations.is_empty() {
            let vault = self.vault.clone();
            let reel_id = reel_id.clone();
            tokio::spawn(async move {
                for location in locations {
                    if let Err(e) = vault.delete(&location).await {
                        warn!(reel_id = %reel_id, location = %location, error = %e, "Failed to delete stored video");
                    }
                }
            });
        }

        Ok(true)
    }

    async fn require_reel(&self, reel_id: &ReelId) -> PipelineResult<Reel> {
        self.store
            .get_reel(reel_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("Reel {} not found", reel_id)))
    }
}

/// Every stored copy of the reel's video.
fn stored_videos(reel: &Reel) -> Vec<VideoLocation> {
    let mut locations = Vec::new();
    if let Some(key) = &reel.s3_key {
        locations.push(VideoLocation::object(key.clone()));
    }
    if let Some(path) = &reel.local_path {
        locations.push(VideoLocation::local(path.clone()));
    }
    locations
}
