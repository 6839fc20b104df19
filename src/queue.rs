//! # Job Queue — durable, at-least-once Redis work queue
//!
//! Jobs are keyed by a deterministic id (e.g. `report-<reportId>`) so a
//! duplicate enqueue for the same report dedups and a cancel request can
//! address the exact job without a lookup.
//!
//! ## Key layout (namespaced per queue name)
//!
//! - `rq:<name>:waiting` — LIST of job ids, FIFO
//! - `rq:<name>:delayed` — ZSET of job ids scored by ready-at millis
//! - `rq:<name>:job:<id>` — HASH: payload, state, attempts_made, enqueued_at
//! - `rq:<name>:failed` — LIST of terminally failed job ids (kept for
//!   inspection; completed jobs are deleted outright)
//! - `rq:<name>:repeat` — HASH of recurring schedule name → cron pattern
//!
//! ## Delivery
//!
//! `next_job` promotes due delayed jobs into the waiting list, then pops one.
//! A failed attempt either re-schedules the job into the delayed zset with
//! exponential backoff (delay = base × 2^(attempt−1)) or, once attempts are
//! exhausted, parks it on the failed list. Check-then-act on job state is
//! safe because each queue has a single active consumer; multi-key updates go
//! through `redis::pipe()`.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Exponential redelivery delay for a failed attempt (1-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// A dequeued job. `attempt` is 1-based: the first delivery is attempt 1.
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub id: String,
    pub payload: String,
    pub attempt: u32,
    pub max_attempts: u32,
}

impl QueueJob {
    /// True when no redelivery budget remains after this attempt.
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
    name: String,
    max_attempts: u32,
    backoff_base: Duration,
}

impl JobQueue {
    /// Open a queue over a shared Redis connection manager.
    pub fn new(
        conn: ConnectionManager,
        name: impl Into<String>,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        JobQueue {
            conn,
            name: name.into(),
            max_attempts,
            backoff_base,
        }
    }

    /// Connect to Redis and open a queue in one step.
    pub async fn connect(
        redis_url: &str,
        name: impl Into<String>,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("redis connection failed")?;
        Ok(JobQueue::new(conn, name, max_attempts, backoff_base))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn key(&self, suffix: &str) -> String {
        format!("rq:{}:{}", self.name, suffix)
    }

    fn job_key(&self, job_id: &str) -> String {
        format!("rq:{}:job:{}", self.name, job_id)
    }

    /// Enqueue a job unless one with the same id is already waiting, delayed,
    /// or active. Returns false when deduplicated.
    pub async fn enqueue(&self, job_id: &str, payload: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let state: Option<String> = conn.hget(self.job_key(job_id), "state").await?;
        if matches!(state.as_deref(), Some("waiting" | "delayed" | "active")) {
            debug!(job_id, queue = %self.name, "enqueue deduplicated");
            return Ok(false);
        }
        redis::pipe()
            .atomic()
            .hset_multiple(
                self.job_key(job_id),
                &[
                    ("payload", payload),
                    ("state", "waiting"),
                    ("enqueued_at", &chrono::Utc::now().to_rfc3339()),
                ],
            )
            .hset(self.job_key(job_id), "attempts_made", 0u32)
            .rpush(self.key("waiting"), job_id)
            .exec_async(&mut conn)
            .await?;
        Ok(true)
    }

    /// Remove a job only if it has not started executing (waiting or
    /// delayed). Returns false when the job is active, finished, or unknown —
    /// that is what makes "cancel before start" safe without racing the
    /// worker.
    pub async fn remove_if_not_started(&self, job_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let state: Option<String> = conn.hget(self.job_key(job_id), "state").await?;
        match state.as_deref() {
            Some("waiting") => {
                redis::pipe()
                    .atomic()
                    .lrem(self.key("waiting"), 0, job_id)
                    .del(self.job_key(job_id))
                    .exec_async(&mut conn)
                    .await?;
                Ok(true)
            }
            Some("delayed") => {
                redis::pipe()
                    .atomic()
                    .zrem(self.key("delayed"), job_id)
                    .del(self.job_key(job_id))
                    .exec_async(&mut conn)
                    .await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Move delayed jobs whose ready-at time has passed back into the
    /// waiting list.
    async fn promote_due(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore(self.key("delayed"), i64::MIN, now_ms)
            .await?;
        for job_id in due {
            redis::pipe()
                .atomic()
                .zrem(self.key("delayed"), &job_id)
                .hset(self.job_key(&job_id), "state", "waiting")
                .rpush(self.key("waiting"), &job_id)
                .exec_async(&mut conn)
                .await?;
        }
        Ok(())
    }

    /// Pop the next runnable job, if any, marking it active.
    pub async fn next_job(&self) -> Result<Option<QueueJob>> {
        self.promote_due().await?;
        let mut conn = self.conn.clone();
        let job_id: Option<String> = conn.lpop(self.key("waiting"), None).await?;
        let Some(job_id) = job_id else {
            return Ok(None);
        };
        let () = conn.hset(self.job_key(&job_id), "state", "active").await?;
        let fields: HashMap<String, String> = conn.hgetall(self.job_key(&job_id)).await?;
        let payload = fields.get("payload").cloned().unwrap_or_default();
        let attempts_made: u32 = fields
            .get("attempts_made")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Ok(Some(QueueJob {
            id: job_id,
            payload,
            attempt: attempts_made + 1,
            max_attempts: self.max_attempts,
        }))
    }

    /// Delete a successfully processed job (no completed-job retention).
    pub async fn complete(&self, job: &QueueJob) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.del(self.job_key(&job.id)).await?;
        Ok(())
    }

    /// Delete a job without recording failure — the cancellation path.
    pub async fn discard(&self, job: &QueueJob) -> Result<()> {
        self.complete(job).await
    }

    /// Re-schedule a failed attempt with exponential backoff, returning the
    /// applied delay.
    pub async fn retry_later(&self, job: &QueueJob) -> Result<Duration> {
        let delay = backoff_delay(self.backoff_base, job.attempt);
        let ready_at = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset(self.job_key(&job.id), "attempts_made", job.attempt)
            .hset(self.job_key(&job.id), "state", "delayed")
            .zadd(self.key("delayed"), &job.id, ready_at)
            .exec_async(&mut conn)
            .await?;
        Ok(delay)
    }

    /// Park a terminally failed job on the failed list for inspection.
    pub async fn fail(&self, job: &QueueJob, error: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset(self.job_key(&job.id), "attempts_made", job.attempt)
            .hset(self.job_key(&job.id), "state", "failed")
            .hset(self.job_key(&job.id), "error", error)
            .rpush(self.key("failed"), &job.id)
            .exec_async(&mut conn)
            .await?;
        Ok(())
    }

    // ── Recurring schedules ─────────────────────────────────────────

    /// Register (or replace) a named recurring schedule. HSET semantics make
    /// re-registration idempotent: the same name never duplicates.
    pub async fn register_repeat(&self, schedule_name: &str, cron: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.hset(self.key("repeat"), schedule_name, cron).await?;
        Ok(())
    }

    /// Look up a registered schedule's cron pattern.
    pub async fn repeat_pattern(&self, schedule_name: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let pattern: Option<String> = conn.hget(self.key("repeat"), schedule_name).await?;
        Ok(pattern)
    }
}
