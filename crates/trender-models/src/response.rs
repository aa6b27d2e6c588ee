//! External job view and list filters.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::job::{EntityRef, EntityType, JobStatus, JobType};
use crate::payload::{JobPayload, JobResult};

/// Default page size for job listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Largest page a caller may request.
pub const MAX_LIST_LIMIT: usize = 500;

/// One job, normalized across queues and historical records. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedJobResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    /// Always within 0..=100
    pub progress: u8,
    pub stage: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JobPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl UnifiedJobResponse {
    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.entity_type = Some(entity.kind);
        self.entity_id = entity.id;
        self
    }
}

fn default_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

/// Filters for listing jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct JobFilters {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500))]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

impl Default for JobFilters {
    fn default() -> Self {
        Self {
            job_type: None,
            status: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl JobFilters {
    pub fn with_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_defaults_from_empty_query() {
        let filters: JobFilters = serde_json::from_str("{}").unwrap();
        assert_eq!(filters, JobFilters::default());
        assert_eq!(filters.limit, 50);
        assert_eq!(filters.offset, 0);
        assert!(filters.validate().is_ok());
    }

    #[test]
    fn test_filters_reject_out_of_range_limit() {
        let filters = JobFilters::default().page(0, 0);
        assert!(filters.validate().is_err());
        let filters = JobFilters::default().page(0, MAX_LIST_LIMIT + 1);
        assert!(filters.validate().is_err());
    }

    #[test]
    fn test_filters_parse_wire_names() {
        let filters: JobFilters =
            serde_json::from_str(r#"{"type":"video-gen","status":"failed","limit":10}"#).unwrap();
        assert_eq!(filters.job_type, Some(JobType::VideoGen));
        assert_eq!(filters.status, Some(JobStatus::Failed));
        assert_eq!(filters.limit, 10);
    }

    #[test]
    fn test_response_wire_shape() {
        let response = UnifiedJobResponse {
            id: "download-r1-1".to_string(),
            job_type: JobType::Pipeline,
            status: JobStatus::Running,
            progress: 15,
            stage: "download".to_string(),
            message: "Downloading video".to_string(),
            entity_id: None,
            entity_type: None,
            data: None,
            result: None,
            error: None,
            attempts: 1,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
        .with_entity(EntityRef::new(EntityType::Reel, Some("r1".to_string())));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "pipeline");
        assert_eq!(json["status"], "running");
        assert_eq!(json["entityType"], "reel");
        assert_eq!(json["entityId"], "r1");
        assert!(json.get("error").is_none());
        assert!(json.get("createdAt").is_some());
    }
}
