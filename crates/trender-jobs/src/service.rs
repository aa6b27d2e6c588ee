//! Unified job service.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};
use validator::Validate;

use trender_models::{
    classify, queue_states_for, JobFilters, JobStatus, JobType, UnifiedJobResponse,
};
use trender_queue::{QueueAdapter, QueueJob};
use trender_store::JobRecordRepository;

use crate::error::{JobsError, JobsResult};
use crate::map;

/// One job view over every registered queue and the durable job records.
///
/// Queues are searched in registration order. A job found in a queue is
/// described by that queue, whatever its id suggests.
#[derive(Clone)]
pub struct UnifiedJobService {
    queues: Vec<Arc<dyn QueueAdapter>>,
    records: Arc<dyn JobRecordRepository>,
}

impl UnifiedJobService {
    pub fn new(records: Arc<dyn JobRecordRepository>) -> Self {
        Self {
            queues: Vec::new(),
            records,
        }
    }

    /// Register a queue. Search order follows registration order.
    pub fn with_queue(mut self, queue: Arc<dyn QueueAdapter>) -> Self {
        self.queues.push(queue);
        self
    }

    pub fn queues(&self) -> &[Arc<dyn QueueAdapter>] {
        &self.queues
    }

    fn queue_for(&self, job_type: JobType) -> Option<&Arc<dyn QueueAdapter>> {
        self.queues.iter().find(|q| q.job_type() == job_type)
    }

    /// Look a job up in the queues, then in the durable records.
    pub async fn get_job(&self, id: &str) -> JobsResult<Option<UnifiedJobResponse>> {
        let hint = classify(id);

        if let Some((queue, job)) = self.find_in_queues(id).await? {
            debug!(job_id = %id, queue = %queue.job_type(), "Job found in queue");
            return Ok(Some(map::from_queue_job(job, queue.job_type())));
        }

        let Some(job_type) = hint else {
            return Ok(None);
        };
        let record = self.records.find_job_record(job_type, id).await?;
        Ok(record.map(|r| map::from_record(r, id)))
    }

    /// Jobs across queues, newest first, paginated over the merged set.
    pub async fn list_jobs(&self, filters: &JobFilters) -> JobsResult<Vec<UnifiedJobResponse>> {
        filters
            .validate()
            .map_err(|e| JobsError::invalid_filters(e.to_string()))?;

        let states = queue_states_for(filters.status);
        // Every queue must supply enough rows to fill the requested window.
        let window = filters.offset.saturating_add(filters.limit);

        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        for queue in &self.queues {
            let job_type = queue.job_type();
            if filters.job_type.is_some_and(|t| t != job_type) {
                continue;
            }

            for job in queue.list_jobs(states, 0, window).await? {
                if !seen.insert((job_type, job.id.clone())) {
                    continue;
                }
                let response = map::from_queue_job(job, job_type);
                if filters.status.map_or(true, |s| s == response.status) {
                    jobs.push(response);
                }
            }
        }

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs
            .into_iter()
            .skip(filters.offset)
            .take(filters.limit)
            .collect())
    }

    /// Remove a pending or running job from its queue.
    ///
    /// Returns false when no queue holds the job or it already finished.
    /// Jobs that only survive as durable records cannot be cancelled.
    pub async fn cancel_job(&self, id: &str) -> JobsResult<bool> {
        let Some((queue, job)) = self.locate(id).await? else {
            return Ok(false);
        };

        if job.status().is_terminal() {
            debug!(job_id = %id, state = %job.state, "Finished job cannot be cancelled");
            return Ok(false);
        }

        let removed = queue.remove_job(id).await?;
        if removed {
            info!(job_id = %id, queue = %queue.job_type(), "Cancelled job");
        }
        Ok(removed)
    }

    /// Move a failed job back to waiting. Returns false unless it is failed.
    pub async fn retry_job(&self, id: &str) -> JobsResult<bool> {
        let Some((queue, job)) = self.locate(id).await? else {
            return Ok(false);
        };

        if job.status() != JobStatus::Failed {
            return Ok(false);
        }

        let retried = queue.retry_job(id).await?;
        if retried {
            info!(job_id = %id, queue = %queue.job_type(), "Retrying job");
        }
        Ok(retried)
    }

    /// The queue for the id's type, or a search of every queue when the id
    /// is unclassifiable.
    async fn locate(&self, id: &str) -> JobsResult<Option<(&Arc<dyn QueueAdapter>, QueueJob)>> {
        match classify(id) {
            Some(job_type) => {
                let Some(queue) = self.queue_for(job_type) else {
                    return Ok(None);
                };
                Ok(queue.get_job(id).await?.map(|job| (queue, job)))
            }
            None => self.find_in_queues(id).await,
        }
    }

    async fn find_in_queues(&self, id: &str) -> JobsResult<Option<(&Arc<dyn QueueAdapter>, QueueJob)>> {
        for queue in &self.queues {
            if let Some(job) = queue.get_job(id).await? {
                return Ok(Some((queue, job)));
            }
        }
        Ok(None)
    }
}
