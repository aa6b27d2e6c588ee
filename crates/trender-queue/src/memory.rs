//! In-process queue with the same semantics as [`RedisQueue`](crate::RedisQueue).
//!
//! Used by tests and by single-process setups that do not need durability.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use trender_models::{JobProgress, JobType, QueueState};

use crate::adapter::{backoff_delay, AddOptions, FailOutcome, QueueAdapter, QueueJob, WorkQueue};
use crate::error::QueueResult;

struct Entry {
    job: QueueJob,
    /// Insertion order, breaks ties between equal creation times
    seq: u64,
    due_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Inner {
    fn insert(&mut self, job: QueueJob, due_at: Option<DateTime<Utc>>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(job.id.clone(), Entry { job, seq, due_at });
    }

    fn evict(&mut self, state: QueueState, keep: usize) {
        let mut settled: Vec<(DateTime<Utc>, u64, String)> = self
            .entries
            .values()
            .filter(|e| e.job.state == state)
            .map(|e| (e.job.created_at, e.seq, e.job.id.clone()))
            .collect();
        if settled.len() <= keep {
            return;
        }
        settled.sort();
        let excess = settled.len() - keep;
        for (_, _, id) in settled.into_iter().take(excess) {
            self.entries.remove(&id);
        }
    }
}

/// In-memory work queue.
pub struct MemoryQueue {
    job_type: JobType,
    max_attempts: u32,
    backoff: Duration,
    keep_completed: usize,
    keep_failed: usize,
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            max_attempts: 3,
            backoff: Duration::from_millis(5000),
            keep_completed: usize::MAX,
            keep_failed: usize::MAX,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_attempts(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.backoff = backoff;
        self
    }

    pub fn with_retention(mut self, keep_completed: usize, keep_failed: usize) -> Self {
        self.keep_completed = keep_completed;
        self.keep_failed = keep_failed;
        self
    }

    /// Place a job in the queue as-is, whatever its state.
    pub async fn insert(&self, job: QueueJob) {
        self.inner.lock().await.insert(job, None);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl QueueAdapter for MemoryQueue {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn get_job(&self, id: &str) -> QueueResult<Option<QueueJob>> {
        Ok(self.inner.lock().await.entries.get(id).map(|e| e.job.clone()))
    }

    async fn list_jobs(
        &self,
        states: &[QueueState],
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<QueueJob>> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<&Entry> = inner
            .entries
            .values()
            .filter(|e| states.contains(&e.job.state))
            .collect();
        matching.sort_by(|a, b| {
            b.job
                .created_at
                .cmp(&a.job.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| e.job.clone())
            .collect())
    }

    async fn remove_job(&self, id: &str) -> QueueResult<bool> {
        Ok(self.inner.lock().await.entries.remove(id).is_some())
    }

    async fn retry_job(&self, id: &str) -> QueueResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(id) {
            Some(entry) if entry.job.state == QueueState::Failed => {
                let job = &mut entry.job;
                job.state = QueueState::Waiting;
                job.attempts_made = 0;
                job.progress = JobProgress::default();
                job.failed_reason = None;
                job.finished_at = None;
                job.processed_at = None;
                job.return_value = Value::Null;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn add(&self, id: &str, name: &str, data: Value, options: AddOptions) -> QueueResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.entries.contains_key(id) {
            return Ok(false);
        }
        let mut job = QueueJob::new(id, name, data);
        let due_at = match options.delay {
            Some(delay) => {
                job.state = QueueState::Delayed;
                Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default())
            }
            None => None,
        };
        inner.insert(job, due_at);
        Ok(true)
    }

    async fn take_next(&self) -> QueueResult<Option<QueueJob>> {
        let mut inner = self.inner.lock().await;
        let next = inner
            .entries
            .values()
            .filter(|e| e.job.state == QueueState::Waiting)
            .min_by(|a, b| a.job.created_at.cmp(&b.job.created_at).then_with(|| a.seq.cmp(&b.seq)))
            .map(|e| e.job.id.clone());

        let Some(id) = next else {
            return Ok(None);
        };
        let Some(entry) = inner.entries.get_mut(&id) else {
            return Ok(None);
        };
        entry.job.state = QueueState::Active;
        entry.job.processed_at = Some(Utc::now());
        entry.job.attempts_made += 1;
        Ok(Some(entry.job.clone()))
    }

    async fn update_progress(&self, id: &str, progress: &JobProgress) -> QueueResult<()> {
        if let Some(entry) = self.inner.lock().await.entries.get_mut(id) {
            entry.job.progress = progress.clone();
        }
        Ok(())
    }

    async fn complete(&self, id: &str, return_value: Value) -> QueueResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(id) {
            Some(entry) if entry.job.state == QueueState::Active => {
                entry.job.state = QueueState::Completed;
                entry.job.return_value = return_value;
                entry.job.finished_at = Some(Utc::now());
            }
            _ => return Ok(false),
        }
        let keep = self.keep_completed;
        inner.evict(QueueState::Completed, keep);
        Ok(true)
    }

    async fn fail(&self, id: &str, reason: &str, retryable: bool) -> QueueResult<FailOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.entries.get_mut(id) else {
            return Ok(FailOutcome::Missing);
        };
        if entry.job.state != QueueState::Active {
            return Ok(FailOutcome::Missing);
        }

        entry.job.failed_reason = Some(reason.to_string());
        let attempt = entry.job.attempts_made;
        if retryable && attempt < self.max_attempts {
            let delay = backoff_delay(self.backoff, attempt);
            entry.job.state = QueueState::Delayed;
            entry.due_at = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
            return Ok(FailOutcome::Retrying { attempt, delay });
        }

        entry.job.state = QueueState::Failed;
        entry.job.finished_at = Some(Utc::now());
        let keep = self.keep_failed;
        inner.evict(QueueState::Failed, keep);
        Ok(FailOutcome::Failed)
    }

    async fn promote_delayed(&self) -> QueueResult<usize> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let mut moved = 0;
        for entry in inner.entries.values_mut() {
            if entry.job.state == QueueState::Delayed && entry.due_at.map_or(true, |due| due <= now) {
                entry.job.state = QueueState::Waiting;
                entry.due_at = None;
                moved += 1;
            }
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn queue_with(ids: &[&str]) -> MemoryQueue {
        let queue = MemoryQueue::new(JobType::Pipeline);
        for id in ids {
            assert!(queue.add(id, "process", json!({"reelId": id}), AddOptions::default()).await.unwrap());
        }
        queue
    }

    #[tokio::test]
    async fn test_add_is_idempotent_on_id() {
        let queue = queue_with(&["process-a-1"]).await;
        let again = queue
            .add("process-a-1", "process", json!({}), AddOptions::default())
            .await
            .unwrap();
        assert!(!again);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_take_next_is_fifo_and_counts_attempts() {
        let queue = queue_with(&["process-a-1", "process-b-2"]).await;

        let first = queue.take_next().await.unwrap().unwrap();
        assert_eq!(first.id, "process-a-1");
        assert_eq!(first.state, QueueState::Active);
        assert_eq!(first.attempts_made, 1);

        let second = queue.take_next().await.unwrap().unwrap();
        assert_eq!(second.id, "process-b-2");
        assert!(queue.take_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retryable_failure_backs_off_then_fails() {
        let queue = queue_with(&["process-a-1"])
            .await
            .with_attempts(2, Duration::ZERO);

        queue.take_next().await.unwrap();
        let outcome = queue.fail("process-a-1", "boom", true).await.unwrap();
        assert_eq!(outcome, FailOutcome::Retrying { attempt: 1, delay: Duration::ZERO });
        assert_eq!(
            queue.get_job("process-a-1").await.unwrap().unwrap().state,
            QueueState::Delayed
        );

        assert_eq!(queue.promote_delayed().await.unwrap(), 1);
        queue.take_next().await.unwrap();
        let outcome = queue.fail("process-a-1", "boom again", true).await.unwrap();
        assert_eq!(outcome, FailOutcome::Failed);

        let job = queue.get_job("process-a-1").await.unwrap().unwrap();
        assert_eq!(job.state, QueueState::Failed);
        assert_eq!(job.failed_reason.as_deref(), Some("boom again"));
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retries() {
        let queue = queue_with(&["process-a-1"]).await;
        queue.take_next().await.unwrap();
        let outcome = queue.fail("process-a-1", "no video", false).await.unwrap();
        assert_eq!(outcome, FailOutcome::Failed);
    }

    #[tokio::test]
    async fn test_retry_only_moves_failed_jobs() {
        let queue = queue_with(&["process-a-1"]).await;
        assert!(!queue.retry_job("process-a-1").await.unwrap());

        queue.take_next().await.unwrap();
        queue.fail("process-a-1", "boom", false).await.unwrap();
        assert!(queue.retry_job("process-a-1").await.unwrap());

        let job = queue.get_job("process-a-1").await.unwrap().unwrap();
        assert_eq!(job.state, QueueState::Waiting);
        assert_eq!(job.attempts_made, 0);
        assert!(job.failed_reason.is_none());
        assert!(!queue.retry_job("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_completed_retention_evicts_oldest() {
        let queue = queue_with(&["process-a-1", "process-b-2", "process-c-3"])
            .await
            .with_retention(2, 10);
        for _ in 0..3 {
            let job = queue.take_next().await.unwrap().unwrap();
            assert!(queue.complete(&job.id, json!({"reelId": job.id})).await.unwrap());
        }
        assert!(queue.get_job("process-a-1").await.unwrap().is_none());
        assert!(queue.get_job("process-c-3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_complete_requires_active() {
        let queue = queue_with(&["process-a-1"]).await;
        assert!(!queue.complete("process-a-1", Value::Null).await.unwrap());
        queue.remove_job("process-a-1").await.unwrap();
        assert!(!queue.complete("process-a-1", Value::Null).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_window() {
        let queue = queue_with(&["process-a-1", "process-b-2", "process-c-3"]).await;
        let all = queue.list_jobs(&[QueueState::Waiting], 0, 10).await.unwrap();
        let ids: Vec<_> = all.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["process-c-3", "process-b-2", "process-a-1"]);

        let page = queue.list_jobs(&[QueueState::Waiting], 1, 1).await.unwrap();
        assert_eq!(page[0].id, "process-b-2");
        assert!(queue.list_jobs(&[QueueState::Failed], 0, 10).await.unwrap().is_empty());
    }
}
