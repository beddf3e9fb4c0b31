//! Durable job queue.
//!
//! Jobs are rows with a due time, a JSON payload, and an optional dedupe
//! key. Claiming sets a lease (`claimed_until`); failures reschedule with
//! exponential backoff until the attempt cap, then dead-letter as `failed`.

use crate::{fmt_ts, Store};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use promptpipe_core::PromptPipeError;
use std::time::Duration;
use tracing::debug;

/// Retry backoff: base 1 s, factor 2, capped at 5 min.
const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_CAP_SECS: u64 = 300;

/// Job lifecycle states.
pub struct JobStatus;

impl JobStatus {
    pub const QUEUED: &'static str = "queued";
    pub const CLAIMED: &'static str = "claimed";
    pub const COMPLETED: &'static str = "completed";
    pub const FAILED: &'static str = "failed";
    pub const CANCELED: &'static str = "canceled";
}

/// A queued unit of deferred work.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub kind: String,
    pub run_at: String,
    /// JSON payload, handler-defined.
    pub payload: String,
    pub dedupe_key: Option<String>,
    pub status: String,
    pub attempt: i64,
    pub claimed_until: Option<String>,
    pub last_error: Option<String>,
}

/// Backoff before retry `attempt` (1-based).
pub fn retry_backoff(attempt: u32) -> Duration {
    let secs = BACKOFF_BASE_SECS
        .saturating_mul(1u64 << (attempt.saturating_sub(1)).min(63))
        .min(BACKOFF_CAP_SECS);
    Duration::from_secs(secs)
}

impl Store {
    /// Enqueue a job. Returns `(id, deduped)`; when a queued or claimed job
    /// with the same `(kind, dedupe_key)` already exists, its ID is returned
    /// with `deduped = true` and nothing is inserted.
    pub async fn enqueue_job(
        &self,
        kind: &str,
        run_at: DateTime<Utc>,
        payload: &str,
        dedupe_key: Option<&str>,
    ) -> Result<(i64, bool), PromptPipeError> {
        if let Some(key) = dedupe_key {
            let existing: Option<(i64,)> = sqlx::query_as(
                "SELECT id FROM jobs WHERE kind = ? AND dedupe_key = ? \
                 AND status IN ('queued', 'claimed') LIMIT 1",
            )
            .bind(kind)
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("dedupe check failed: {e}")))?;

            if let Some((id,)) = existing {
                debug!(kind, dedupe_key = key, id, "job deduped");
                return Ok((id, true));
            }
        }

        let result = sqlx::query(
            "INSERT INTO jobs (kind, run_at, payload, dedupe_key) VALUES (?, ?, ?, ?)",
        )
        .bind(kind)
        .bind(fmt_ts(run_at))
        .bind(payload)
        .bind(dedupe_key)
        .execute(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("enqueue failed: {e}")))?;

        Ok((result.last_insert_rowid(), false))
    }

    /// Atomically claim up to `limit` due jobs, setting their lease.
    pub async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<Job>, PromptPipeError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("begin failed: {e}")))?;

        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM jobs WHERE status = 'queued' AND run_at <= ? \
             ORDER BY run_at ASC LIMIT ?",
        )
        .bind(fmt_ts(now))
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("claim select failed: {e}")))?;

        let claimed_until = fmt_ts(now + ChronoDuration::from_std(lease).unwrap_or_default());
        let mut jobs = Vec::with_capacity(ids.len());
        for (id,) in ids {
            sqlx::query("UPDATE jobs SET status = 'claimed', claimed_until = ? WHERE id = ?")
                .bind(&claimed_until)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| PromptPipeError::StateLoad(format!("claim update failed: {e}")))?;

            let job: Job = sqlx::query_as(
                "SELECT id, kind, run_at, payload, dedupe_key, status, attempt, \
                 claimed_until, last_error FROM jobs WHERE id = ?",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("claim fetch failed: {e}")))?;
            jobs.push(job);
        }

        tx.commit()
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("commit failed: {e}")))?;

        Ok(jobs)
    }

    /// Mark a claimed job completed.
    pub async fn complete_job(&self, id: i64) -> Result<(), PromptPipeError> {
        sqlx::query("UPDATE jobs SET status = 'completed', claimed_until = NULL WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("complete failed: {e}")))?;
        Ok(())
    }

    /// Record a failure: increments the attempt counter and reschedules with
    /// exponential backoff, or dead-letters after `max_attempts`.
    pub async fn fail_job(
        &self,
        id: i64,
        reason: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<(), PromptPipeError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT attempt FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("query failed: {e}")))?;

        let Some((attempt,)) = row else {
            return Ok(());
        };
        let attempt = attempt as u32 + 1;

        if attempt >= max_attempts {
            sqlx::query(
                "UPDATE jobs SET status = 'failed', attempt = ?, last_error = ?, \
                 claimed_until = NULL WHERE id = ?",
            )
            .bind(attempt as i64)
            .bind(reason)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("dead-letter failed: {e}")))?;
            return Ok(());
        }

        let backoff = retry_backoff(attempt);
        let run_at = fmt_ts(now + ChronoDuration::from_std(backoff).unwrap_or_default());
        sqlx::query(
            "UPDATE jobs SET status = 'queued', attempt = ?, last_error = ?, \
             run_at = ?, claimed_until = NULL WHERE id = ?",
        )
        .bind(attempt as i64)
        .bind(reason)
        .bind(&run_at)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("requeue failed: {e}")))?;

        Ok(())
    }

    /// Cancel queued jobs matching `(kind, dedupe_key)`. Returns the count.
    pub async fn cancel_jobs_by_dedupe_key(
        &self,
        kind: &str,
        dedupe_key: &str,
    ) -> Result<u64, PromptPipeError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'canceled' \
             WHERE kind = ? AND dedupe_key = ? AND status = 'queued'",
        )
        .bind(kind)
        .bind(dedupe_key)
        .execute(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("cancel failed: {e}")))?;

        Ok(result.rows_affected())
    }

    /// Return claimed jobs whose lease has lapsed to the queue.
    pub async fn requeue_stale_jobs(&self, now: DateTime<Utc>) -> Result<u64, PromptPipeError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', claimed_until = NULL \
             WHERE status = 'claimed' AND claimed_until <= ?",
        )
        .bind(fmt_ts(now))
        .execute(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("requeue stale failed: {e}")))?;

        Ok(result.rows_affected())
    }

    /// Fetch a job by ID (tests and diagnostics).
    pub async fn get_job(&self, id: i64) -> Result<Option<Job>, PromptPipeError> {
        sqlx::query_as(
            "SELECT id, kind, run_at, payload, dedupe_key, status, attempt, \
             claimed_until, last_error FROM jobs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("query failed: {e}")))
    }
}
