//! Store of record on Firestore.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use trender_models::{
    Analysis, JobRecord, JobType, Reel, ReelId, ReelLog, ReelMetadata, ReelStatus, Template,
    VideoLocation,
};

use crate::client::FirestoreClient;
use crate::codec::{self, Fields};
use crate::error::StoreResult;
use crate::repository::{
    AnalysisRepository, JobRecordRepository, ReelLogRepository, ReelRepository,
    TemplateRepository,
};
use crate::types::{Document, StructuredQuery, ToFirestoreValue, Value};

/// Collection names.
pub mod collections {
    pub const REELS: &str = "reels";
    pub const ANALYSES: &str = "analyses";
    pub const TEMPLATES: &str = "templates";
    pub const SCRAPE_JOBS: &str = "scrape_jobs";
    pub const VIDEO_GENERATIONS: &str = "video_generations";
    pub const PIPELINE_JOBS: &str = "pipeline_jobs";
    pub const REEL_LOGS: &str = "reel_logs";
}

/// Repositories backed by a [`FirestoreClient`].
#[derive(Clone)]
pub struct FirestoreStore {
    client: FirestoreClient,
}

impl FirestoreStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn from_env() -> StoreResult<Self> {
        Ok(Self::new(FirestoreClient::from_env().await?))
    }

    pub fn client(&self) -> &FirestoreClient {
        &self.client
    }

    async fn update(&self, collection: &str, id: &str, mut fields: Fields) -> StoreResult<()> {
        fields.insert("updatedAt".to_string(), Utc::now().to_firestore_value());
        self.client.update_document(collection, id, fields).await?;
        Ok(())
    }

    /// Documents in `collection` whose `reelId` equals `reel_id`.
    async fn by_reel(
        &self,
        collection: &str,
        reel_id: &ReelId,
        limit: Option<u32>,
    ) -> StoreResult<Vec<Document>> {
        let mut query = StructuredQuery::equal(
            collection,
            "reelId",
            Value::StringValue(reel_id.to_string()),
        );
        if let Some(limit) = limit {
            query = query.order_by_desc("createdAt").limit(limit);
        }
        self.client.run_query(query).await
    }

    /// Decode documents, skipping and logging the ones that do not parse.
    fn decode_all<T>(
        docs: Vec<Document>,
        collection: &str,
        decode: impl Fn(&Document, &str) -> StoreResult<T>,
    ) -> Vec<T> {
        docs.iter()
            .filter_map(|doc| {
                let id = doc.id()?;
                match decode(doc, id) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!(collection = %collection, doc_id = %id, error = %e, "Failed to parse document");
                        None
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl ReelRepository for FirestoreStore {
    async fn get_reel(&self, id: &ReelId) -> StoreResult<Option<Reel>> {
        match self.client.get_document(collections::REELS, id.as_str()).await? {
            Some(doc) => Ok(Some(codec::document_to_reel(&doc, id.as_str())?)),
            None => Ok(None),
        }
    }

    async fn create_reel(&self, reel: &Reel) -> StoreResult<()> {
        self.client
            .create_document(collections::REELS, reel.id.as_str(), codec::reel_to_fields(reel))
            .await?;
        info!("Created reel record: {}", reel.id);
        Ok(())
    }

    async fn update_reel_status(
        &self,
        id: &ReelId,
        status: ReelStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
        fields.insert("errorMessage".to_string(), error.to_firestore_value());
        self.update(collections::REELS, id.as_str(), fields).await
    }

    async fn update_reel_progress(
        &self,
        id: &ReelId,
        stage: &str,
        percent: u8,
        message: &str,
    ) -> StoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("progress".to_string(), percent.min(100).to_firestore_value());
        fields.insert("progressStage".to_string(), stage.to_firestore_value());
        fields.insert("progressMessage".to_string(), message.to_firestore_value());
        fields.insert("lastActivityAt".to_string(), Utc::now().to_firestore_value());
        self.update(collections::REELS, id.as_str(), fields).await
    }

    async fn set_video_location(&self, id: &ReelId, location: &VideoLocation) -> StoreResult<()> {
        let mut fields = HashMap::new();
        match location {
            VideoLocation::Object { key } => {
                fields.insert("s3Key".to_string(), key.as_str().to_firestore_value());
            }
            VideoLocation::Local { path } => {
                fields.insert("localPath".to_string(), path.as_str().to_firestore_value());
            }
        }
        fields.insert("status".to_string(), ReelStatus::Downloaded.as_str().to_firestore_value());
        fields.insert("progress".to_string(), 100u8.to_firestore_value());
        self.update(collections::REELS, id.as_str(), fields).await
    }

    async fn update_reel_metadata(&self, id: &ReelId, metadata: &ReelMetadata) -> StoreResult<()> {
        self.update(collections::REELS, id.as_str(), codec::metadata_to_fields(metadata))
            .await
    }

    async fn delete_reel(&self, id: &ReelId) -> StoreResult<()> {
        self.client.delete_document(collections::REELS, id.as_str()).await
    }
}

#[async_trait]
impl AnalysisRepository for FirestoreStore {
    async fn get_analysis(&self, id: &str) -> StoreResult<Option<Analysis>> {
        match self.client.get_document(collections::ANALYSES, id).await? {
            Some(doc) => Ok(Some(codec::document_to_analysis(&doc, id)?)),
            None => Ok(None),
        }
    }

    async fn find_analysis_for_reel(&self, reel_id: &ReelId) -> StoreResult<Option<Analysis>> {
        Ok(self.list_analyses_for_reel(reel_id).await?.into_iter().next())
    }

    async fn list_analyses_for_reel(&self, reel_id: &ReelId) -> StoreResult<Vec<Analysis>> {
        // Sorted here so the equality query needs no composite index.
        let docs = self.by_reel(collections::ANALYSES, reel_id, None).await?;
        let mut analyses = Self::decode_all(docs, collections::ANALYSES, codec::document_to_analysis);
        analyses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(analyses)
    }

    async fn create_analysis(&self, analysis: &Analysis) -> StoreResult<()> {
        self.client
            .create_document(
                collections::ANALYSES,
                &analysis.id,
                codec::analysis_to_fields(analysis)?,
            )
            .await?;
        Ok(())
    }

    async fn delete_analysis(&self, id: &str) -> StoreResult<()> {
        self.client.delete_document(collections::ANALYSES, id).await
    }
}

#[async_trait]
impl TemplateRepository for FirestoreStore {
    async fn get_template(&self, id: &str) -> StoreResult<Option<Template>> {
        match self.client.get_document(collections::TEMPLATES, id).await? {
            Some(doc) => Ok(Some(codec::document_to_template(&doc, id)?)),
            None => Ok(None),
        }
    }

    async fn find_template_for_reel(&self, reel_id: &ReelId) -> StoreResult<Option<Template>> {
        let docs = self.by_reel(collections::TEMPLATES, reel_id, None).await?;
        let mut templates = Self::decode_all(docs, collections::TEMPLATES, codec::document_to_template);
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates.into_iter().next())
    }

    async fn create_template(&self, template: &Template) -> StoreResult<()> {
        self.client
            .create_document(
                collections::TEMPLATES,
                &template.id,
                codec::template_to_fields(template),
            )
            .await?;
        Ok(())
    }

    async fn delete_template(&self, id: &str) -> StoreResult<()> {
        self.client.delete_document(collections::TEMPLATES, id).await
    }
}

#[async_trait]
impl JobRecordRepository for FirestoreStore {
    async fn find_job_record(&self, job_type: JobType, job_id: &str) -> StoreResult<Option<JobRecord>> {
        match job_type {
            JobType::Scrape => {
                let doc = self.client.get_document(collections::SCRAPE_JOBS, job_id).await?;
                doc.map(|d| codec::document_to_scrape_record(&d, job_id).map(JobRecord::Scrape))
                    .transpose()
            }
            JobType::Pipeline => {
                let doc = self.client.get_document(collections::PIPELINE_JOBS, job_id).await?;
                doc.map(|d| codec::document_to_pipeline_record(&d, job_id).map(JobRecord::Pipeline))
                    .transpose()
            }
            JobType::VideoGen => {
                // Generations are keyed by generation id and carry the job id as a field.
                let query = StructuredQuery::equal(
                    collections::VIDEO_GENERATIONS,
                    "jobId",
                    Value::StringValue(job_id.to_string()),
                )
                .limit(1);
                let docs = self.client.run_query(query).await?;
                Ok(Self::decode_all(
                    docs,
                    collections::VIDEO_GENERATIONS,
                    codec::document_to_generation_record,
                )
                .into_iter()
                .next()
                .map(JobRecord::Generation))
            }
        }
    }

    async fn save_job_record(&self, record: &JobRecord) -> StoreResult<()> {
        let (collection, id, fields) = match record {
            JobRecord::Scrape(r) => (
                collections::SCRAPE_JOBS,
                r.job_id.as_str(),
                codec::scrape_record_to_fields(r),
            ),
            JobRecord::Pipeline(r) => (
                collections::PIPELINE_JOBS,
                r.job_id.as_str(),
                codec::pipeline_record_to_fields(r)?,
            ),
            JobRecord::Generation(r) => (
                collections::VIDEO_GENERATIONS,
                r.id.as_str(),
                codec::generation_record_to_fields(r),
            ),
        };
        self.client.set_document(collection, id, fields).await?;
        Ok(())
    }

    async fn delete_pipeline_record(&self, job_id: &str) -> StoreResult<()> {
        self.client.delete_document(collections::PIPELINE_JOBS, job_id).await
    }
}

#[async_trait]
impl ReelLogRepository for FirestoreStore {
    async fn append_reel_log(&self, log: &ReelLog) -> StoreResult<()> {
        self.client
            .create_document(collections::REEL_LOGS, &log.id, codec::reel_log_to_fields(log))
            .await?;
        Ok(())
    }

    async fn list_reel_logs(&self, reel_id: &ReelId, limit: u32) -> StoreResult<Vec<ReelLog>> {
        let docs = self.by_reel(collections::REEL_LOGS, reel_id, Some(limit)).await?;
        Ok(Self::decode_all(docs, collections::REEL_LOGS, codec::document_to_reel_log))
    }

    async fn delete_reel_logs(&self, reel_id: &ReelId) -> StoreResult<usize> {
        let docs = self.by_reel(collections::REEL_LOGS, reel_id, None).await?;
        let ids: Vec<String> = docs.iter().filter_map(|d| d.id().map(str::to_string)).collect();
        self.client.batch_delete(collections::REEL_LOGS, &ids).await?;
        Ok(ids.len())
    }
}
