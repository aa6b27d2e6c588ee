//! Redis-backed work queue.
//!
//! Key layout, per queue (`{prefix}:{queue}:`):
//! - `{id}`: job hash (`name`, `data`, `progress`, `returnvalue`,
//!   `failedReason`, `attemptsMade`, `timestamp`, `processedOn`, `finishedOn`)
//! - `wait`, `active`, `completed`, `failed`, `delayed`, `prioritized`:
//!   sorted sets of job ids scored by creation time in milliseconds
//! - `delay-due`: delayed job ids scored by the time they become runnable
//!
//! Every state change runs as a Lua script so a job is never in two states.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::{AsyncCommands, Script};
use serde_json::Value;
use tracing::{debug, info, warn};

use trender_models::{JobProgress, JobType, QueueState};

use crate::adapter::{backoff_delay, AddOptions, FailOutcome, QueueAdapter, QueueJob, WorkQueue};
use crate::error::{QueueError, QueueResult};
use crate::metrics::record_event;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key prefix shared by all queues
    pub prefix: String,
    /// Attempts before a retryable failure becomes final
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff
    pub backoff: Duration,
    /// Completed jobs kept before the oldest are evicted
    pub keep_completed: usize,
    /// Failed jobs kept before the oldest are evicted
    pub keep_failed: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            prefix: "trender".to_string(),
            max_attempts: 3,
            backoff: Duration::from_millis(5000),
            keep_completed: 1000,
            keep_failed: 5000,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            prefix: std::env::var("QUEUE_PREFIX").unwrap_or_else(|_| "trender".to_string()),
            max_attempts: std::env::var("QUEUE_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            backoff: Duration::from_millis(
                std::env::var("QUEUE_BACKOFF_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ),
            keep_completed: std::env::var("QUEUE_KEEP_COMPLETED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            keep_failed: std::env::var("QUEUE_KEEP_FAILED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5000),
        }
    }
}

const ADD_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
redis.call('HSET', KEYS[1], 'name', ARGV[2], 'data', ARGV[3], 'timestamp', ARGV[4],
  'attemptsMade', 0, 'progress', '0')
if ARGV[5] ~= '' then
  redis.call('ZADD', KEYS[3], ARGV[4], ARGV[1])
  redis.call('ZADD', KEYS[4], ARGV[5], ARGV[1])
else
  redis.call('ZADD', KEYS[2], ARGV[4], ARGV[1])
end
return 1
"#;

const TAKE_SCRIPT: &str = r#"
local popped = redis.call('ZPOPMIN', KEYS[1])
if #popped == 0 then return false end
local id = popped[1]
local key = ARGV[1] .. id
if redis.call('EXISTS', key) == 0 then return false end
redis.call('ZADD', KEYS[2], popped[2], id)
redis.call('HSET', key, 'processedOn', ARGV[2])
redis.call('HINCRBY', key, 'attemptsMade', 1)
return id
"#;

// Shared by complete and final fail: move out of active, then evict the
// oldest entries of the target set beyond the retention limit.
const SETTLE_SCRIPT: &str = r#"
local key = ARGV[1] .. ARGV[2]
if redis.call('EXISTS', key) == 0 then return 0 end
if redis.call('ZREM', KEYS[1], ARGV[2]) == 0 then return 0 end
local ts = redis.call('HGET', key, 'timestamp')
redis.call('HSET', key, ARGV[3], ARGV[4], 'finishedOn', ARGV[5])
redis.call('ZADD', KEYS[2], ts, ARGV[2])
local excess = redis.call('ZCARD', KEYS[2]) - tonumber(ARGV[6])
if excess > 0 then
  local old = redis.call('ZRANGE', KEYS[2], 0, excess - 1)
  for _, oid in ipairs(old) do redis.call('DEL', ARGV[1] .. oid) end
  redis.call('ZREMRANGEBYRANK', KEYS[2], 0, excess - 1)
end
return 1
"#;

const BACKOFF_SCRIPT: &str = r#"
local key = ARGV[1] .. ARGV[2]
if redis.call('EXISTS', key) == 0 then return 0 end
if redis.call('ZREM', KEYS[1], ARGV[2]) == 0 then return 0 end
local ts = redis.call('HGET', key, 'timestamp')
redis.call('HSET', key, 'failedReason', ARGV[3])
redis.call('ZADD', KEYS[2], ts, ARGV[2])
redis.call('ZADD', KEYS[3], ARGV[4], ARGV[2])
return 1
"#;

const PROMOTE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
local moved = 0
for _, id in ipairs(due) do
  redis.call('ZREM', KEYS[1], id)
  if redis.call('ZREM', KEYS[2], id) == 1 then
    local ts = redis.call('HGET', ARGV[2] .. id, 'timestamp')
    if ts then
      redis.call('ZADD', KEYS[3], ts, id)
      moved = moved + 1
    end
  end
end
return moved
"#;

const REMOVE_SCRIPT: &str = r#"
local key = ARGV[1] .. ARGV[2]
if redis.call('EXISTS', key) == 0 then return 0 end
for i = 1, #KEYS do redis.call('ZREM', KEYS[i], ARGV[2]) end
redis.call('DEL', key)
return 1
"#;

const RETRY_SCRIPT: &str = r#"
local key = ARGV[1] .. ARGV[2]
if redis.call('EXISTS', key) == 0 then return 0 end
if redis.call('ZREM', KEYS[1], ARGV[2]) == 0 then return 0 end
local ts = redis.call('HGET', key, 'timestamp')
redis.call('HSET', key, 'attemptsMade', 0, 'progress', '0')
redis.call('HDEL', key, 'failedReason', 'finishedOn', 'processedOn', 'returnvalue')
redis.call('ZADD', KEYS[2], ts, ARGV[2])
return 1
"#;

/// States probed when resolving a single job, most likely first.
const PROBE_ORDER: [QueueState; 6] = [
    QueueState::Active,
    QueueState::Waiting,
    QueueState::Delayed,
    QueueState::Prioritized,
    QueueState::Completed,
    QueueState::Failed,
];

struct Scripts {
    add: Script,
    take: Script,
    settle: Script,
    backoff: Script,
    promote: Script,
    remove: Script,
    retry: Script,
}

impl Scripts {
    fn new() -> Self {
        Self {
            add: Script::new(ADD_SCRIPT),
            take: Script::new(TAKE_SCRIPT),
            settle: Script::new(SETTLE_SCRIPT),
            backoff: Script::new(BACKOFF_SCRIPT),
            promote: Script::new(PROMOTE_SCRIPT),
            remove: Script::new(REMOVE_SCRIPT),
            retry: Script::new(RETRY_SCRIPT),
        }
    }
}

/// One Redis-backed work queue.
pub struct RedisQueue {
    client: redis::Client,
    config: QueueConfig,
    job_type: JobType,
    key_prefix: String,
    scripts: Scripts,
}

impl RedisQueue {
    /// Create the queue holding jobs of `job_type`.
    pub fn new(config: QueueConfig, job_type: JobType) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self::with_client(client, config, job_type))
    }

    /// Create from environment variables.
    pub fn from_env(job_type: JobType) -> QueueResult<Self> {
        Self::new(QueueConfig::from_env(), job_type)
    }

    /// Share one client between several queues.
    pub fn with_client(client: redis::Client, config: QueueConfig, job_type: JobType) -> Self {
        let key_prefix = format!("{}:{}:", config.prefix, job_type.queue_name());
        Self {
            client,
            config,
            job_type,
            key_prefix,
            scripts: Scripts::new(),
        }
    }

    /// Create all three queues over one client, in registration order.
    pub fn open_all(config: QueueConfig) -> QueueResult<Vec<RedisQueue>> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(JobType::ALL
            .iter()
            .map(|job_type| Self::with_client(client.clone(), config.clone(), *job_type))
            .collect())
    }

    pub fn queue_name(&self) -> &'static str {
        self.job_type.queue_name()
    }

    /// Check the connection.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(format!("{}: {}", self.queue_name(), e)))
    }

    fn job_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    fn state_key(&self, state: QueueState) -> String {
        let suffix = match state {
            QueueState::Waiting => "wait",
            QueueState::Active => "active",
            QueueState::Completed => "completed",
            QueueState::Failed => "failed",
            QueueState::Delayed => "delayed",
            QueueState::Prioritized => "prioritized",
            QueueState::Unknown => "unknown",
        };
        format!("{}{}", self.key_prefix, suffix)
    }

    fn delay_due_key(&self) -> String {
        format!("{}delay-due", self.key_prefix)
    }

    async fn load_job(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        id: &str,
        state: QueueState,
    ) -> QueueResult<Option<QueueJob>> {
        let fields: HashMap<String, String> = conn.hgetall(self.job_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        parse_job(id, state, &fields).map(Some)
    }

    async fn current_state(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        id: &str,
    ) -> QueueResult<QueueState> {
        let mut pipe = redis::pipe();
        for state in PROBE_ORDER {
            pipe.zscore(self.state_key(state), id);
        }
        let scores: Vec<Option<f64>> = pipe.query_async(conn).await?;
        Ok(PROBE_ORDER
            .iter()
            .zip(scores)
            .find(|(_, score)| score.is_some())
            .map(|(state, _)| *state)
            .unwrap_or(QueueState::Unknown))
    }

    async fn settle(
        &self,
        id: &str,
        target: QueueState,
        field: &str,
        value: &str,
        keep: usize,
    ) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let moved: i64 = self
            .scripts
            .settle
            .key(self.state_key(QueueState::Active))
            .key(self.state_key(target))
            .arg(&self.key_prefix)
            .arg(id)
            .arg(field)
            .arg(value)
            .arg(now_millis())
            .arg(keep)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved == 1)
    }
}

#[async_trait]
impl QueueAdapter for RedisQueue {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn get_job(&self, id: &str) -> QueueResult<Option<QueueJob>> {
        let mut conn = self.connection().await?;
        let state = self.current_state(&mut conn, id).await?;
        self.load_job(&mut conn, id, state).await
    }

    async fn list_jobs(
        &self,
        states: &[QueueState],
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<QueueJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let stop = range_stop(offset, limit);

        // Every state set is scored by creation time, so the newest
        // `offset + limit` of each set cover the merged window.
        let mut candidates: Vec<(String, f64, QueueState)> = Vec::new();
        for state in states {
            if *state == QueueState::Unknown {
                continue;
            }
            let entries: Vec<(String, f64)> = conn
                .zrevrange_withscores(self.state_key(*state), 0, stop)
                .await?;
            candidates.extend(entries.into_iter().map(|(id, score)| (id, score, *state)));
        }

        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        candidates.dedup_by(|a, b| a.0 == b.0);

        let page: Vec<(String, QueueState)> = candidates
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(id, _, state)| (id, state))
            .collect();
        if page.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for (id, _) in &page {
            pipe.hgetall(self.job_key(id));
        }
        let hashes: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        let mut jobs = Vec::with_capacity(page.len());
        for ((id, state), fields) in page.into_iter().zip(hashes) {
            if fields.is_empty() {
                // Evicted between the range read and the hash read.
                continue;
            }
            match parse_job(&id, state, &fields) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(queue = self.queue_name(), job_id = %id, "Skipping unreadable job: {}", e),
            }
        }
        Ok(jobs)
    }

    async fn remove_job(&self, id: &str) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let mut invocation = self.scripts.remove.prepare_invoke();
        for state in PROBE_ORDER {
            invocation.key(self.state_key(state));
        }
        invocation.key(self.delay_due_key());
        invocation.arg(&self.key_prefix).arg(id);

        let removed: i64 = invocation.invoke_async(&mut conn).await?;
        if removed == 1 {
            info!(queue = self.queue_name(), job_id = %id, "Removed job");
            record_event(self.queue_name(), "removed");
        }
        Ok(removed == 1)
    }

    async fn retry_job(&self, id: &str) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let retried: i64 = self
            .scripts
            .retry
            .key(self.state_key(QueueState::Failed))
            .key(self.state_key(QueueState::Waiting))
            .arg(&self.key_prefix)
            .arg(id)
            .invoke_async(&mut conn)
            .await?;
        if retried == 1 {
            info!(queue = self.queue_name(), job_id = %id, "Retrying failed job");
            record_event(self.queue_name(), "retried");
        }
        Ok(retried == 1)
    }
}

#[async_trait]
impl WorkQueue for RedisQueue {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn add(&self, id: &str, name: &str, data: Value, options: AddOptions) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let now = now_millis();
        let due = options
            .delay
            .map(|d| (now + d.as_millis() as i64).to_string())
            .unwrap_or_default();
        let payload = serde_json::to_string(&data)?;

        let added: i64 = self
            .scripts
            .add
            .key(self.job_key(id))
            .key(self.state_key(QueueState::Waiting))
            .key(self.state_key(QueueState::Delayed))
            .key(self.delay_due_key())
            .arg(id)
            .arg(name)
            .arg(payload)
            .arg(now)
            .arg(due)
            .invoke_async(&mut conn)
            .await?;

        if added == 1 {
            info!(queue = self.queue_name(), job_id = %id, "Enqueued job");
            record_event(self.queue_name(), "added");
        } else {
            debug!(queue = self.queue_name(), job_id = %id, "Job already exists, not enqueued");
        }
        Ok(added == 1)
    }

    async fn take_next(&self) -> QueueResult<Option<QueueJob>> {
        let mut conn = self.connection().await?;
        let id: Option<String> = self
            .scripts
            .take
            .key(self.state_key(QueueState::Waiting))
            .key(self.state_key(QueueState::Active))
            .arg(&self.key_prefix)
            .arg(now_millis())
            .invoke_async(&mut conn)
            .await?;

        match id {
            Some(id) => self.load_job(&mut conn, &id, QueueState::Active).await,
            None => Ok(None),
        }
    }

    async fn update_progress(&self, id: &str, progress: &JobProgress) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(progress)?;
        conn.hset::<_, _, _, ()>(self.job_key(id), "progress", payload).await?;
        Ok(())
    }

    async fn complete(&self, id: &str, return_value: Value) -> QueueResult<bool> {
        let payload = serde_json::to_string(&return_value)?;
        let done = self
            .settle(id, QueueState::Completed, "returnvalue", &payload, self.config.keep_completed)
            .await?;
        if done {
            record_event(self.queue_name(), "completed");
        } else {
            warn!(queue = self.queue_name(), job_id = %id, "Completed job was no longer active");
        }
        Ok(done)
    }

    async fn fail(&self, id: &str, reason: &str, retryable: bool) -> QueueResult<FailOutcome> {
        let mut conn = self.connection().await?;
        let attempts: Option<u32> = conn.hget(self.job_key(id), "attemptsMade").await?;
        let Some(attempt) = attempts else {
            return Ok(FailOutcome::Missing);
        };

        if retryable && attempt < self.config.max_attempts {
            let delay = backoff_delay(self.config.backoff, attempt);
            let due = now_millis() + delay.as_millis() as i64;
            let moved: i64 = self
                .scripts
                .backoff
                .key(self.state_key(QueueState::Active))
                .key(self.state_key(QueueState::Delayed))
                .key(self.delay_due_key())
                .arg(&self.key_prefix)
                .arg(id)
                .arg(reason)
                .arg(due)
                .invoke_async(&mut conn)
                .await?;
            if moved == 0 {
                return Ok(FailOutcome::Missing);
            }
            record_event(self.queue_name(), "retry_scheduled");
            return Ok(FailOutcome::Retrying { attempt, delay });
        }

        let moved = self
            .settle(id, QueueState::Failed, "failedReason", reason, self.config.keep_failed)
            .await?;
        if !moved {
            return Ok(FailOutcome::Missing);
        }
        record_event(self.queue_name(), "failed");
        Ok(FailOutcome::Failed)
    }

    async fn promote_delayed(&self) -> QueueResult<usize> {
        let mut conn = self.connection().await?;
        let moved: usize = self
            .scripts
            .promote
            .key(self.delay_due_key())
            .key(self.state_key(QueueState::Delayed))
            .key(self.state_key(QueueState::Waiting))
            .arg(now_millis())
            .arg(&self.key_prefix)
            .invoke_async(&mut conn)
            .await?;
        if moved > 0 {
            debug!(queue = self.queue_name(), count = moved, "Promoted delayed jobs");
        }
        Ok(moved)
    }
}

/// Inclusive `ZREVRANGE` stop index covering the first `offset + limit` rows.
fn range_stop(offset: usize, limit: usize) -> isize {
    isize::try_from(offset.saturating_add(limit))
        .unwrap_or(isize::MAX)
        .saturating_sub(1)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Build a [`QueueJob`] from a job hash.
pub(crate) fn parse_job(
    id: &str,
    state: QueueState,
    fields: &HashMap<String, String>,
) -> QueueResult<QueueJob> {
    let timestamp = |name: &str| -> Option<DateTime<Utc>> {
        fields
            .get(name)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(millis_to_datetime)
    };

    let created_at = timestamp("timestamp")
        .ok_or_else(|| QueueError::corrupt_job(id, "missing or invalid timestamp"))?;

    let data = match fields.get("data") {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| QueueError::corrupt_job(id, format!("invalid data: {}", e)))?,
        None => Value::Null,
    };

    let return_value = fields
        .get("returnvalue")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or(Value::Null);

    Ok(QueueJob {
        id: id.to_string(),
        name: fields.get("name").cloned().unwrap_or_default(),
        state,
        data,
        progress: fields
            .get("progress")
            .map(|raw| JobProgress::from_json(raw))
            .unwrap_or_default(),
        return_value,
        attempts_made: fields
            .get("attemptsMade")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        failed_reason: fields.get("failedReason").filter(|s| !s.is_empty()).cloned(),
        created_at,
        processed_at: timestamp("processedOn"),
        finished_at: timestamp("finishedOn"),
    })
}
