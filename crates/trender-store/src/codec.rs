//! Document field codecs for each collection.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use trender_models::{
    Analysis, AnalysisType, DetectedElement, GenerationRecord, GenerationStatus, JobStatus,
    LogLevel, PipelineAction, PipelineResult, PipelineRunRecord, ProcessingState, Reel, ReelId,
    ReelLog, ReelMetadata, ReelStatus, ScrapeRunRecord, ScrapeRunStatus, Template,
};

use crate::error::{StoreError, StoreResult};
use crate::types::{Document, FromFirestoreValue, ToFirestoreValue, Value};

pub type Fields = HashMap<String, Value>;

fn get<T: FromFirestoreValue>(fields: &Fields, name: &str) -> Option<T> {
    fields.get(name).and_then(T::from_firestore_value)
}

fn fields_of<'a>(doc: &'a Document, kind: &str, id: &str) -> StoreResult<&'a Fields> {
    doc.fields
        .as_ref()
        .ok_or_else(|| StoreError::invalid_response(format!("{} {} has no fields", kind, id)))
}

fn insert(fields: &mut Fields, name: &str, value: impl ToFirestoreValue) {
    fields.insert(name.to_string(), value.to_firestore_value());
}

// =============================================================================
// Reels
// =============================================================================

pub fn reel_to_fields(reel: &Reel) -> Fields {
    let mut fields = metadata_to_fields(&reel.metadata);
    insert(&mut fields, "url", reel.url.clone());
    insert(&mut fields, "source", reel.source.as_str());
    insert(&mut fields, "status", reel.state.status.as_str());
    insert(&mut fields, "progress", reel.state.progress);
    insert(&mut fields, "progressStage", reel.state.progress_stage.as_str());
    insert(&mut fields, "progressMessage", reel.state.progress_message.as_str());
    insert(&mut fields, "errorMessage", reel.state.error_message.clone());
    insert(&mut fields, "lastActivityAt", reel.state.last_activity_at);
    insert(&mut fields, "s3Key", reel.s3_key.clone());
    insert(&mut fields, "localPath", reel.local_path.clone());
    insert(&mut fields, "createdAt", reel.created_at);
    insert(&mut fields, "updatedAt", reel.updated_at);
    fields
}

pub fn metadata_to_fields(metadata: &ReelMetadata) -> Fields {
    let mut fields = Fields::new();
    insert(&mut fields, "caption", metadata.caption.clone());
    insert(&mut fields, "author", metadata.author.clone());
    insert(&mut fields, "thumbnailUrl", metadata.thumbnail_url.clone());
    insert(&mut fields, "duration", metadata.duration);
    insert(&mut fields, "viewCount", metadata.view_count);
    insert(&mut fields, "likeCount", metadata.like_count);
    insert(&mut fields, "commentCount", metadata.comment_count);
    fields
}

pub fn document_to_reel(doc: &Document, id: &str) -> StoreResult<Reel> {
    let fields = fields_of(doc, "Reel", id)?;
    let created_at: DateTime<Utc> = get(fields, "createdAt").unwrap_or_else(Utc::now);
    let status = get::<String>(fields, "status")
        .and_then(|s| s.parse::<ReelStatus>().ok())
        .unwrap_or_default();

    Ok(Reel {
        id: ReelId::from_string(id),
        url: get(fields, "url"),
        source: get(fields, "source").unwrap_or_default(),
        metadata: ReelMetadata {
            caption: get(fields, "caption"),
            author: get(fields, "author"),
            thumbnail_url: get(fields, "thumbnailUrl"),
            duration: get(fields, "duration"),
            view_count: get(fields, "viewCount"),
            like_count: get(fields, "likeCount"),
            comment_count: get(fields, "commentCount"),
        },
        state: ProcessingState {
            status,
            progress: get(fields, "progress").unwrap_or(0),
            progress_stage: get(fields, "progressStage").unwrap_or_default(),
            progress_message: get(fields, "progressMessage").unwrap_or_default(),
            error_message: get(fields, "errorMessage"),
            last_activity_at: get(fields, "lastActivityAt"),
        },
        s3_key: get(fields, "s3Key"),
        local_path: get(fields, "localPath"),
        created_at,
        updated_at: get(fields, "updatedAt").unwrap_or(created_at),
    })
}

// =============================================================================
// Analyses and templates
// =============================================================================

pub fn analysis_to_fields(analysis: &Analysis) -> StoreResult<Fields> {
    let mut fields = Fields::new();
    insert(&mut fields, "reelId", analysis.reel_id.as_str());
    insert(&mut fields, "analysisType", analysis.analysis_type.as_str());
    insert(&mut fields, "fileName", analysis.file_name.as_str());
    insert(&mut fields, "duration", analysis.duration);
    insert(&mut fields, "aspectRatio", analysis.aspect_ratio.as_str());
    insert(&mut fields, "subject", analysis.subject.as_str());
    insert(&mut fields, "environment", analysis.environment.as_str());
    insert(&mut fields, "style", analysis.style.as_str());
    insert(&mut fields, "tags", analysis.tags.clone());
    fields.insert("elements".to_string(), Value::encode(&analysis.elements)?);
    insert(&mut fields, "createdAt", analysis.created_at);
    Ok(fields)
}

pub fn document_to_analysis(doc: &Document, id: &str) -> StoreResult<Analysis> {
    let fields = fields_of(doc, "Analysis", id)?;
    let elements: Vec<DetectedElement> = match fields.get("elements") {
        Some(v) => v.decode()?,
        None => Vec::new(),
    };

    Ok(Analysis {
        id: id.to_string(),
        reel_id: ReelId::from_string(get::<String>(fields, "reelId").unwrap_or_default()),
        analysis_type: get::<String>(fields, "analysisType")
            .and_then(|s| s.parse::<AnalysisType>().ok())
            .unwrap_or(AnalysisType::Standard),
        file_name: get(fields, "fileName").unwrap_or_default(),
        duration: get(fields, "duration"),
        aspect_ratio: get(fields, "aspectRatio").unwrap_or_default(),
        subject: get(fields, "subject").unwrap_or_default(),
        environment: get(fields, "environment").unwrap_or_default(),
        style: get(fields, "style").unwrap_or_default(),
        tags: get(fields, "tags").unwrap_or_default(),
        elements,
        created_at: get(fields, "createdAt").unwrap_or_else(Utc::now),
    })
}

pub fn template_to_fields(template: &Template) -> Fields {
    let mut fields = Fields::new();
    insert(&mut fields, "reelId", template.reel_id.as_str());
    insert(&mut fields, "analysisId", template.analysis_id.as_str());
    insert(&mut fields, "tags", template.tags.clone());
    insert(&mut fields, "category", template.category.as_str());
    insert(&mut fields, "isPublished", template.is_published);
    insert(&mut fields, "createdAt", template.created_at);
    fields
}

pub fn document_to_template(doc: &Document, id: &str) -> StoreResult<Template> {
    let fields = fields_of(doc, "Template", id)?;
    Ok(Template {
        id: id.to_string(),
        reel_id: ReelId::from_string(get::<String>(fields, "reelId").unwrap_or_default()),
        analysis_id: get(fields, "analysisId").unwrap_or_default(),
        tags: get(fields, "tags").unwrap_or_default(),
        category: get(fields, "category")
            .unwrap_or_else(|| trender_models::DEFAULT_CATEGORY.to_string()),
        is_published: get(fields, "isPublished").unwrap_or(true),
        created_at: get(fields, "createdAt").unwrap_or_else(Utc::now),
    })
}

// =============================================================================
// Reel logs
// =============================================================================

pub fn reel_log_to_fields(log: &ReelLog) -> Fields {
    let mut fields = Fields::new();
    insert(&mut fields, "reelId", log.reel_id.as_str());
    insert(&mut fields, "level", log.level.as_str());
    insert(&mut fields, "stage", log.stage.as_str());
    insert(&mut fields, "message", log.message.as_str());
    insert(&mut fields, "durationMs", log.duration_ms);
    if let Some(metadata) = &log.metadata {
        fields.insert("metadata".to_string(), Value::from_json(metadata));
    }
    insert(&mut fields, "createdAt", log.created_at);
    fields
}

pub fn document_to_reel_log(doc: &Document, id: &str) -> StoreResult<ReelLog> {
    let fields = fields_of(doc, "ReelLog", id)?;
    Ok(ReelLog {
        id: id.to_string(),
        reel_id: ReelId::from_string(get::<String>(fields, "reelId").unwrap_or_default()),
        level: LogLevel::parse(&get::<String>(fields, "level").unwrap_or_default()),
        stage: get(fields, "stage").unwrap_or_default(),
        message: get(fields, "message").unwrap_or_default(),
        duration_ms: get(fields, "durationMs"),
        metadata: fields
            .get("metadata")
            .map(Value::to_json)
            .filter(|m| !m.is_null()),
        created_at: get(fields, "createdAt").unwrap_or_else(Utc::now),
    })
}

// =============================================================================
// Job records
// =============================================================================

pub fn pipeline_record_to_fields(record: &PipelineRunRecord) -> StoreResult<Fields> {
    let mut fields = Fields::new();
    insert(&mut fields, "jobId", record.job_id.as_str());
    insert(&mut fields, "reelId", record.reel_id.as_str());
    insert(&mut fields, "action", record.action.as_str());
    insert(&mut fields, "status", record.status.as_str());
    if let Some(result) = &record.result {
        fields.insert("result".to_string(), Value::encode(result)?);
    }
    insert(&mut fields, "error", record.error.clone());
    insert(&mut fields, "attempts", record.attempts);
    insert(&mut fields, "createdAt", record.created_at);
    insert(&mut fields, "startedAt", record.started_at);
    insert(&mut fields, "finishedAt", record.finished_at);
    Ok(fields)
}

pub fn document_to_pipeline_record(doc: &Document, id: &str) -> StoreResult<PipelineRunRecord> {
    let fields = fields_of(doc, "Pipeline job", id)?;
    let action = match fields.get("action") {
        Some(v) => v.decode::<PipelineAction>()?,
        None => PipelineAction::Process,
    };
    let result = match fields.get("result") {
        Some(Value::NullValue(())) | None => None,
        Some(v) => Some(v.decode::<PipelineResult>()?),
    };

    Ok(PipelineRunRecord {
        job_id: get(fields, "jobId").unwrap_or_else(|| id.to_string()),
        reel_id: ReelId::from_string(get::<String>(fields, "reelId").unwrap_or_default()),
        action,
        status: get::<String>(fields, "status")
            .and_then(|s| s.parse::<JobStatus>().ok())
            .unwrap_or(JobStatus::Pending),
        result,
        error: get(fields, "error"),
        attempts: get(fields, "attempts").unwrap_or(0),
        created_at: get(fields, "createdAt").unwrap_or_else(Utc::now),
        started_at: get(fields, "startedAt"),
        finished_at: get(fields, "finishedAt"),
    })
}

pub fn scrape_record_to_fields(record: &ScrapeRunRecord) -> Fields {
    let mut fields = Fields::new();
    insert(&mut fields, "jobId", record.job_id.as_str());
    insert(&mut fields, "status", record.status.as_str());
    insert(&mut fields, "found", record.found);
    insert(&mut fields, "downloaded", record.downloaded);
    insert(&mut fields, "error", record.error.clone());
    insert(&mut fields, "createdAt", record.created_at);
    insert(&mut fields, "updatedAt", record.updated_at);
    fields
}

pub fn document_to_scrape_record(doc: &Document, id: &str) -> StoreResult<ScrapeRunRecord> {
    let fields = fields_of(doc, "Scrape job", id)?;
    let created_at: DateTime<Utc> = get(fields, "createdAt").unwrap_or_else(Utc::now);
    Ok(ScrapeRunRecord {
        job_id: get(fields, "jobId").unwrap_or_else(|| id.to_string()),
        status: ScrapeRunStatus::parse(&get::<String>(fields, "status").unwrap_or_default()),
        found: get(fields, "found").unwrap_or(0),
        downloaded: get(fields, "downloaded").unwrap_or(0),
        error: get(fields, "error"),
        created_at,
        updated_at: get(fields, "updatedAt").unwrap_or(created_at),
    })
}

pub fn generation_record_to_fields(record: &GenerationRecord) -> Fields {
    let mut fields = Fields::new();
    insert(&mut fields, "jobId", record.job_id.clone());
    insert(&mut fields, "status", record.status.as_str());
    insert(&mut fields, "progress", record.progress);
    insert(&mut fields, "progressStage", record.progress_stage.clone());
    insert(&mut fields, "progressMessage", record.progress_message.clone());
    insert(&mut fields, "videoUrl", record.video_url.clone());
    insert(&mut fields, "s3Key", record.s3_key.clone());
    insert(&mut fields, "error", record.error.clone());
    insert(&mut fields, "createdAt", record.created_at);
    insert(&mut fields, "completedAt", record.completed_at);
    fields
}

pub fn document_to_generation_record(doc: &Document, id: &str) -> StoreResult<GenerationRecord> {
    let fields = fields_of(doc, "Generation", id)?;
    Ok(GenerationRecord {
        id: id.to_string(),
        job_id: get(fields, "jobId"),
        status: GenerationStatus::parse(&get::<String>(fields, "status").unwrap_or_default()),
        progress: get(fields, "progress"),
        progress_stage: get(fields, "progressStage"),
        progress_message: get(fields, "progressMessage"),
        video_url: get(fields, "videoUrl"),
        s3_key: get(fields, "s3Key"),
        error: get(fields, "error"),
        created_at: get(fields, "createdAt").unwrap_or_else(Utc::now),
        completed_at: get(fields, "completedAt"),
    })
}
