//! In-process store of record.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use trender_models::{
    Analysis, GenerationRecord, JobRecord, JobType, PipelineRunRecord, Reel, ReelId, ReelLog,
    ReelMetadata, ReelStatus, ScrapeRunRecord, Template, VideoLocation,
};

use crate::error::{StoreError, StoreResult};
use crate::repository::{
    AnalysisRepository, JobRecordRepository, ReelLogRepository, ReelRepository,
    TemplateRepository,
};

#[derive(Default)]
struct Tables {
    reels: HashMap<ReelId, Reel>,
    analyses: HashMap<String, Analysis>,
    templates: HashMap<String, Template>,
    scrape_jobs: HashMap<String, ScrapeRunRecord>,
    pipeline_jobs: HashMap<String, PipelineRunRecord>,
    generations: HashMap<String, GenerationRecord>,
    logs: Vec<ReelLog>,
}

/// Store kept in process memory, with the same semantics as the Firestore store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of templates across all reels.
    pub async fn template_count(&self) -> usize {
        self.tables.read().await.templates.len()
    }

    /// Number of analyses across all reels.
    pub async fn analysis_count(&self) -> usize {
        self.tables.read().await.analyses.len()
    }

    async fn with_reel<F>(&self, id: &ReelId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Reel) + Send,
    {
        let mut tables = self.tables.write().await;
        let reel = tables
            .reels
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(format!("reels/{}", id)))?;
        f(reel);
        reel.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ReelRepository for MemoryStore {
    async fn get_reel(&self, id: &ReelId) -> StoreResult<Option<Reel>> {
        Ok(self.tables.read().await.reels.get(id).cloned())
    }

    async fn create_reel(&self, reel: &Reel) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.reels.contains_key(&reel.id) {
            return Err(StoreError::AlreadyExists(format!("reels/{}", reel.id)));
        }
        tables.reels.insert(reel.id.clone(), reel.clone());
        Ok(())
    }

    async fn update_reel_status(
        &self,
        id: &ReelId,
        status: ReelStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let error = error.map(str::to_string);
        self.with_reel(id, move |reel| {
            reel.state.status = status;
            reel.state.error_message = error;
        })
        .await
    }

    async fn update_reel_progress(
        &self,
        id: &ReelId,
        stage: &str,
        percent: u8,
        message: &str,
    ) -> StoreResult<()> {
        let (stage, message) = (stage.to_string(), message.to_string());
        self.with_reel(id, move |reel| {
            reel.state.progress = percent.min(100);
            reel.state.progress_stage = stage;
            reel.state.progress_message = message;
            reel.state.last_activity_at = Some(Utc::now());
        })
        .await
    }

    async fn set_video_location(&self, id: &ReelId, location: &VideoLocation) -> StoreResult<()> {
        let location = location.clone();
        self.with_reel(id, move |reel| {
            reel.set_location(location);
            reel.state.status = ReelStatus::Downloaded;
            reel.state.progress = 100;
        })
        .await
    }

    async fn update_reel_metadata(&self, id: &ReelId, metadata: &ReelMetadata) -> StoreResult<()> {
        let metadata = metadata.clone();
        self.with_reel(id, move |reel| reel.metadata = metadata).await
    }

    async fn delete_reel(&self, id: &ReelId) -> StoreResult<()> {
        self.tables.write().await.reels.remove(id);
        Ok(())
    }
}

#[async_trait]
impl AnalysisRepository for MemoryStore {
    async fn get_analysis(&self, id: &str) -> StoreResult<Option<Analysis>> {
        Ok(self.tables.read().await.analyses.get(id).cloned())
    }

    async fn find_analysis_for_reel(&self, reel_id: &ReelId) -> StoreResult<Option<Analysis>> {
        Ok(self.list_analyses_for_reel(reel_id).await?.into_iter().next())
    }

    async fn list_analyses_for_reel(&self, reel_id: &ReelId) -> StoreResult<Vec<Analysis>> {
        let tables = self.tables.read().await;
        let mut analyses: Vec<Analysis> = tables
            .analyses
            .values()
            .filter(|a| &a.reel_id == reel_id)
            .cloned()
            .collect();
        analyses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(analyses)
    }

    async fn create_analysis(&self, analysis: &Analysis) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.analyses.contains_key(&analysis.id) {
            return Err(StoreError::AlreadyExists(format!("analyses/{}", analysis.id)));
        }
        tables.analyses.insert(analysis.id.clone(), analysis.clone());
        Ok(())
    }

    async fn delete_analysis(&self, id: &str) -> StoreResult<()> {
        self.tables.write().await.analyses.remove(id);
        Ok(())
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn get_template(&self, id: &str) -> StoreResult<Option<Template>> {
        Ok(self.tables.read().await.templates.get(id).cloned())
    }

    async fn find_template_for_reel(&self, reel_id: &ReelId) -> StoreResult<Option<Template>> {
        let tables = self.tables.read().await;
        Ok(tables
            .templates
            .values()
            .filter(|t| &t.reel_id == reel_id)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn create_template(&self, template: &Template) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.templates.contains_key(&template.id) {
            return Err(StoreError::AlreadyExists(format!("templates/{}", template.id)));
        }
        tables.templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn delete_template(&self, id: &str) -> StoreResult<()> {
        self.tables.write().await.templates.remove(id);
        Ok(())
    }
}

#[async_trait]
impl JobRecordRepository for MemoryStore {
    async fn find_job_record(&self, job_type: JobType, job_id: &str) -> StoreResult<Option<JobRecord>> {
        let tables = self.tables.read().await;
        Ok(match job_type {
            JobType::Scrape => tables.scrape_jobs.get(job_id).cloned().map(JobRecord::Scrape),
            JobType::Pipeline => tables.pipeline_jobs.get(job_id).cloned().map(JobRecord::Pipeline),
            JobType::VideoGen => tables
                .generations
                .values()
                .find(|g| g.job_id.as_deref() == Some(job_id))
                .cloned()
                .map(JobRecord::Generation),
        })
    }

    async fn save_job_record(&self, record: &JobRecord) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match record {
            JobRecord::Scrape(r) => {
                tables.scrape_jobs.insert(r.job_id.clone(), r.clone());
            }
            JobRecord::Pipeline(r) => {
                tables.pipeline_jobs.insert(r.job_id.clone(), r.clone());
            }
            JobRecord::Generation(r) => {
                tables.generations.insert(r.id.clone(), r.clone());
            }
        }
        Ok(())
    }

    async fn delete_pipeline_record(&self, job_id: &str) -> StoreResult<()> {
        self.tables.write().await.pipeline_jobs.remove(job_id);
        Ok(())
    }
}

#[async_trait]
impl ReelLogRepository for MemoryStore {
    async fn append_reel_log(&self, log: &ReelLog) -> StoreResult<()> {
        self.tables.write().await.logs.push(log.clone());
        Ok(())
    }

    async fn list_reel_logs(&self, reel_id: &ReelId, limit: u32) -> StoreResult<Vec<ReelLog>> {
        let tables = self.tables.read().await;
        // Appended in time order; newest first.
        Ok(tables
            .logs
            .iter()
            .rev()
            .filter(|l| &l.reel_id == reel_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete_reel_logs(&self, reel_id: &ReelId) -> StoreResult<usize> {
        let mut tables = self.tables.write().await;
        let before = tables.logs.len();
        tables.logs.retain(|l| &l.reel_id != reel_id);
        Ok(before - tables.logs.len())
    }
}
