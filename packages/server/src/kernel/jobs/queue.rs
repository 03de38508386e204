//! Job queue abstraction and its Postgres implementation.
//!
//! `JobQueue` is object safe so handlers and routes can hold a
//! `dyn JobQueue` and tests can substitute the in-memory queue. The
//! payload-typed `enqueue` lives on `JobQueueExt`, which serializes the
//! command into a `JobSpec` before crossing the trait boundary.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;

use super::failure::JobFailure;
use super::job::{ErrorKind, Job, JobStatus};

/// How long a claimed job may run before its lease expires and another
/// worker may reclaim it.
pub const DEFAULT_LEASE_MS: i64 = 5 * 60 * 1000;

// ============================================================================
// Command metadata
// ============================================================================

/// Metadata a typed job command carries about itself.
pub trait JobMeta {
    /// Registry key connecting this payload to its handler.
    const JOB_TYPE: &'static str;

    /// Per-command retry budget override. `None` uses the policy default.
    fn max_retries(&self) -> Option<i32> {
        None
    }

    /// Dedup key. While a live (pending or processing) job holds this key,
    /// enqueueing the same key returns `Duplicate` instead of a new job.
    fn idempotency_key(&self) -> Option<String> {
        None
    }
}

/// Serialized, type-erased enqueue request.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub max_retries: Option<i32>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueResult {
    /// A new job was created; carries its client-visible token.
    Created(String),
    /// A live job with the same idempotency key already exists.
    Duplicate(String),
}

impl EnqueueResult {
    pub fn job_id(&self) -> &str {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => id,
        }
    }
}

/// A job handed to a worker, holding a lease.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: Job,
}

impl ClaimedJob {
    pub fn id(&self) -> Uuid {
        self.job.id
    }

    pub fn job_id(&self) -> &str {
        &self.job.job_id
    }

    pub fn job_type(&self) -> &str {
        &self.job.job_type
    }
}

// ============================================================================
// Retry policy
// ============================================================================

/// Exponential backoff configuration for automatic retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay_secs: i64,
    pub max_delay_secs: i64,
    pub default_max_retries: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 2,
            max_delay_secs: 300,
            default_max_retries: 3,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_delay_secs: config.retry_base_delay_secs,
            max_delay_secs: config.retry_max_delay_secs,
            default_max_retries: config.default_max_retries,
        }
    }

    /// Delay before the next attempt, doubling per completed attempt and
    /// capped at `max_delay_secs`. `retry_count` is the number of retries
    /// already consumed, so the first retry waits the base delay.
    pub fn backoff_delay(&self, retry_count: i32) -> chrono::Duration {
        let exp = retry_count.clamp(0, 30) as u32;
        let secs = self
            .base_delay_secs
            .saturating_mul(1i64 << exp)
            .min(self.max_delay_secs);
        chrono::Duration::seconds(secs)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a manual retry request was rejected.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("job not found")]
    NotFound,
    #[error("job is {0:?}, only failed jobs can be retried")]
    NotFailed(JobStatus),
    #[error("retry budget exhausted ({retry_count}/{max_retries})")]
    MaxRetriesExceeded { retry_count: i32, max_retries: i32 },
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

// ============================================================================
// Queue trait
// ============================================================================

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Create a pending job, or return the live duplicate for its
    /// idempotency key.
    async fn enqueue_spec(&self, spec: JobSpec) -> Result<EnqueueResult>;

    /// Atomically claim up to `limit` ready jobs for `worker_id`.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>>;

    /// Extend the lease of a processing job.
    async fn heartbeat(&self, id: Uuid) -> Result<()>;

    /// Raise the progress of a processing job. Out-of-range values and
    /// updates against non-processing jobs are ignored; progress never
    /// decreases within an attempt.
    async fn update_progress(&self, id: Uuid, percent: i32) -> Result<()>;

    /// Transition a processing job to completed with its result payload.
    /// Idempotent: re-completing with the same result is a no-op, a
    /// conflicting result is logged and discarded.
    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<()>;

    /// Record a failure. Retryable failures with budget remaining are
    /// rescheduled as pending with backoff; everything else lands in failed.
    async fn mark_failed(&self, id: Uuid, failure: &JobFailure) -> Result<()>;

    /// Manually retry a failed job by client token. Returns the new retry
    /// count.
    async fn retry(&self, job_id: &str) -> Result<i32, RetryError>;

    /// Look up a job by its client-visible token.
    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<Job>>;

    /// Fail pending jobs that no worker picked up within `older_than`.
    /// Returns the number of jobs swept.
    async fn fail_stale_pending(&self, older_than: chrono::Duration) -> Result<u64>;

    /// Purge jobs older than `age` regardless of status. Returns the number
    /// deleted.
    async fn delete_older_than(&self, age: chrono::Duration) -> Result<u64>;

    fn policy(&self) -> RetryPolicy;
}

/// Payload-typed enqueue on top of the object-safe trait.
#[async_trait]
pub trait JobQueueExt: JobQueue {
    async fn enqueue<J>(&self, command: &J) -> Result<EnqueueResult>
    where
        J: JobMeta + Serialize + Send + Sync,
    {
        let spec = JobSpec {
            job_type: J::JOB_TYPE.to_string(),
            payload: serde_json::to_value(command)?,
            max_retries: command.max_retries(),
            idempotency_key: command.idempotency_key(),
        };
        self.enqueue_spec(spec).await
    }
}

impl<Q: JobQueue + ?Sized> JobQueueExt for Q {}

// ============================================================================
// Postgres implementation
// ============================================================================

#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
    policy: RetryPolicy,
    lease_duration_ms: i64,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool, policy: RetryPolicy) -> Self {
        Self {
            pool,
            policy,
            lease_duration_ms: DEFAULT_LEASE_MS,
        }
    }

    pub fn with_lease_duration_ms(mut self, lease_duration_ms: i64) -> Self {
        self.lease_duration_ms = lease_duration_ms;
        self
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue_spec(&self, spec: JobSpec) -> Result<EnqueueResult> {
        if let Some(key) = &spec.idempotency_key {
            if let Some(existing) = Job::find_live_by_idempotency_key(key, &self.pool).await? {
                debug!(
                    job_id = %existing.job_id,
                    idempotency_key = %key,
                    "duplicate enqueue, returning live job"
                );
                return Ok(EnqueueResult::Duplicate(existing.job_id));
            }
        }

        let max_retries = spec.max_retries.unwrap_or(self.policy.default_max_retries);
        let job = Job::for_payload(
            &spec.job_type,
            spec.payload,
            max_retries,
            spec.idempotency_key.clone(),
        );

        match job.insert(&self.pool).await {
            Ok(inserted) => {
                info!(
                    job_id = %inserted.job_id,
                    job_type = %inserted.job_type,
                    "job enqueued"
                );
                Ok(EnqueueResult::Created(inserted.job_id))
            }
            // Concurrent enqueue with the same key lost the race against the
            // partial unique index; surface the winner as the duplicate.
            Err(e) if is_unique_violation(&e) => {
                let key = spec.idempotency_key.as_deref().ok_or(e)?;
                match Job::find_live_by_idempotency_key(key, &self.pool).await? {
                    Some(existing) => Ok(EnqueueResult::Duplicate(existing.job_id)),
                    None => Err(anyhow::anyhow!(
                        "unique violation on idempotency key {key} but no live job found"
                    )),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        let jobs = Job::claim_jobs(limit, worker_id, self.lease_duration_ms, &self.pool).await?;
        Ok(jobs.into_iter().map(|job| ClaimedJob { job }).collect())
    }

    async fn heartbeat(&self, id: Uuid) -> Result<()> {
        Job::extend_lease(id, self.lease_duration_ms, &self.pool).await
    }

    async fn update_progress(&self, id: Uuid, percent: i32) -> Result<()> {
        if !(0..=100).contains(&percent) {
            debug!(job_id = %id, percent, "ignoring out-of-range progress update");
            return Ok(());
        }

        // GREATEST keeps progress monotonic even if updates arrive reordered.
        let updated = sqlx::query(
            "UPDATE jobs \
             SET progress = GREATEST(progress, $2), updated_at = NOW() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(percent)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            debug!(job_id = %id, percent, "progress update on non-processing job ignored");
        }

        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE jobs \
             SET status = 'completed', progress = 100, result = $2, \
                 error = NULL, error_kind = NULL, \
                 completed_at = NOW(), lease_expires_at = NULL, worker_id = NULL, \
                 updated_at = NOW() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(&result)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            let job = Job::find_by_id(id, &self.pool).await?;
            match job.status {
                JobStatus::Completed if job.result.as_ref() == Some(&result) => {
                    debug!(job_id = %job.job_id, "duplicate completion with identical result, no-op");
                }
                JobStatus::Completed => {
                    error!(
                        job_id = %job.job_id,
                        "completion conflict: job already completed with a different result, keeping the first"
                    );
                }
                status => {
                    warn!(
                        job_id = %job.job_id,
                        status = status.as_str(),
                        "mark_completed on non-processing job ignored"
                    );
                }
            }
        }

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, failure: &JobFailure) -> Result<()> {
        let job = Job::find_by_id(id, &self.pool).await?;
        let will_retry = failure.should_retry() && job.retry_count < job.max_retries;

        let updated = if will_retry {
            let delay = self.policy.backoff_delay(job.retry_count);
            info!(
                job_id = %job.job_id,
                job_type = %job.job_type,
                attempt = job.retry_count + 1,
                max_retries = job.max_retries,
                delay_secs = delay.num_seconds(),
                error = %failure,
                "job failed, retry scheduled"
            );

            sqlx::query(
                "UPDATE jobs \
                 SET status = 'pending', retry_count = retry_count + 1, progress = 0, \
                     error = NULL, error_kind = NULL, result = NULL, \
                     next_run_at = NOW() + ($2 || ' seconds')::INTERVAL, \
                     lease_expires_at = NULL, worker_id = NULL, updated_at = NOW() \
                 WHERE id = $1 AND status = 'processing'",
            )
            .bind(id)
            .bind(delay.num_seconds().to_string())
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            warn!(
                job_id = %job.job_id,
                job_type = %job.job_type,
                retry_count = job.retry_count,
                max_retries = job.max_retries,
                error_kind = ?failure.kind,
                error = %failure,
                "job failed permanently"
            );

            sqlx::query(
                "UPDATE jobs \
                 SET status = 'failed', error = $2, error_kind = $3, result = NULL, \
                     lease_expires_at = NULL, worker_id = NULL, updated_at = NOW() \
                 WHERE id = $1 AND status = 'processing'",
            )
            .bind(id)
            .bind(&failure.message)
            .bind(failure.kind)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if updated == 0 {
            warn!(job_id = %id, "mark_failed on non-processing job ignored");
        }

        Ok(())
    }

    async fn retry(&self, job_id: &str) -> Result<i32, RetryError> {
        let job = Job::find_by_job_id(job_id, &self.pool)
            .await?
            .ok_or(RetryError::NotFound)?;

        if job.status != JobStatus::Failed {
            return Err(RetryError::NotFailed(job.status));
        }
        if job.retry_count >= job.max_retries {
            return Err(RetryError::MaxRetriesExceeded {
                retry_count: job.retry_count,
                max_retries: job.max_retries,
            });
        }

        // Guard on status again so a concurrent retry can't double-increment.
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE jobs \
             SET status = 'pending', retry_count = retry_count + 1, progress = 0, \
                 error = NULL, error_kind = NULL, result = NULL, \
                 next_run_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'failed' \
             RETURNING retry_count",
        )
        .bind(job.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(anyhow::Error::from)?;

        match row {
            Some((retry_count,)) => {
                info!(job_id = %job.job_id, retry_count, "manual retry accepted");
                Ok(retry_count)
            }
            None => {
                let current = Job::find_by_id(job.id, &self.pool).await?;
                Err(RetryError::NotFailed(current.status))
            }
        }
    }

    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<Job>> {
        Job::find_by_job_id(job_id, &self.pool).await
    }

    async fn fail_stale_pending(&self, older_than: chrono::Duration) -> Result<u64> {
        let secs = older_than.num_seconds().to_string();
        let swept = sqlx::query(
            "UPDATE jobs \
             SET status = 'failed', \
                 error = 'job was never claimed by a worker', \
                 error_kind = 'non_retryable', \
                 updated_at = NOW() \
             WHERE status = 'pending' \
               AND updated_at < NOW() - ($1 || ' seconds')::INTERVAL \
               AND (next_run_at IS NULL OR next_run_at < NOW() - ($1 || ' seconds')::INTERVAL)",
        )
        .bind(&secs)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if swept > 0 {
            warn!(count = swept, "swept stale pending jobs to failed");
        }

        Ok(swept)
    }

    async fn delete_older_than(&self, age: chrono::Duration) -> Result<u64> {
        let deleted = sqlx::query(
            "DELETE FROM jobs \
             WHERE created_at < NOW() - ($1 || ' seconds')::INTERVAL",
        )
        .bind(age.num_seconds().to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if deleted > 0 {
            info!(count = deleted, "purged old terminal jobs");
        }

        Ok(deleted)
    }

    fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .map(|db| db.code().as_deref() == Some("23505"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCommand;

    impl JobMeta for FakeCommand {
        const JOB_TYPE: &'static str = "fake_command";

        fn idempotency_key(&self) -> Option<String> {
            Some("fake:1".to_string())
        }
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0).num_seconds(), 2);
        assert_eq!(policy.backoff_delay(1).num_seconds(), 4);
        assert_eq!(policy.backoff_delay(2).num_seconds(), 8);
        assert_eq!(policy.backoff_delay(3).num_seconds(), 16);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(10).num_seconds(), 300);
        assert_eq!(policy.backoff_delay(100).num_seconds(), 300);
    }

    #[test]
    fn backoff_honors_custom_base() {
        let policy = RetryPolicy {
            base_delay_secs: 5,
            max_delay_secs: 60,
            default_max_retries: 3,
        };
        assert_eq!(policy.backoff_delay(0).num_seconds(), 5);
        assert_eq!(policy.backoff_delay(1).num_seconds(), 10);
        assert_eq!(policy.backoff_delay(4).num_seconds(), 60);
    }

    #[test]
    fn enqueue_result_exposes_token_for_both_variants() {
        assert_eq!(EnqueueResult::Created("a".into()).job_id(), "a");
        assert_eq!(EnqueueResult::Duplicate("b".into()).job_id(), "b");
    }

    #[test]
    fn job_meta_defaults() {
        let cmd = FakeCommand;
        assert_eq!(FakeCommand::JOB_TYPE, "fake_command");
        assert_eq!(cmd.max_retries(), None);
        assert_eq!(cmd.idempotency_key().as_deref(), Some("fake:1"));
    }
}
