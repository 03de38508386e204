//! Job model for background operation tracking.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{db_id, job_token};

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states admit no further automatic transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "error_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - will not retry
    NonRetryable,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

// ============================================================================
// Job Model
// ============================================================================

/// Persisted state for one asynchronous operation.
///
/// A row is created at `pending` by the HTTP handler that accepts the work,
/// mutated exclusively through the transition methods on the job queue, and
/// read by the status endpoint. Status moves monotonically along
/// `pending -> processing -> {completed | failed}`; `failed` may return to
/// `pending` through retry, bounded by `max_retries`.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = db_id())]
    pub id: Uuid,

    /// Opaque client-visible token, immutable after creation.
    #[builder(default = job_token())]
    pub job_id: String,

    pub job_type: String,

    // State
    #[builder(default)]
    pub status: JobStatus,
    #[builder(default = 0)]
    pub progress: i32,

    // Payload and outcome
    #[builder(default, setter(strip_option))]
    pub args: Option<serde_json::Value>,
    #[builder(default, setter(strip_option))]
    pub result: Option<serde_json::Value>,
    #[builder(default, setter(strip_option))]
    pub error: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_kind: Option<ErrorKind>,

    // Retry budget
    #[builder(default = 0)]
    pub retry_count: i32,
    #[builder(default = 3)]
    pub max_retries: i32,

    // Enqueue idempotency
    #[builder(default, setter(strip_option))]
    pub idempotency_key: Option<String>,

    // Scheduling and lease management
    #[builder(default, setter(strip_option))]
    pub next_run_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,

    // Timestamps
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Column list shared by every query returning a full Job row.
const JOB_COLUMNS: &str = "id, job_id, job_type, status, progress, args, result, error, error_kind, \
     retry_count, max_retries, idempotency_key, next_run_at, lease_expires_at, worker_id, \
     created_at, updated_at, completed_at";

impl Job {
    /// Create a fresh pending job for a serialized payload.
    pub fn for_payload(
        job_type: &str,
        args: serde_json::Value,
        max_retries: i32,
        idempotency_key: Option<String>,
    ) -> Self {
        Self::builder()
            .job_type(job_type.to_string())
            .args(args)
            .max_retries(max_retries)
            .idempotency_key(idempotency_key.unwrap_or_default())
            .build()
            .normalize_idempotency()
    }

    // TypedBuilder's strip_option makes empty-string the only way to thread an
    // optional key through for_payload; map it back to None here.
    fn normalize_idempotency(mut self) -> Self {
        if self.idempotency_key.as_deref() == Some("") {
            self.idempotency_key = None;
        }
        self
    }

    /// Whether the job would be picked up by a claiming worker right now.
    pub fn is_ready(&self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        match self.next_run_at {
            None => true,
            Some(next_run) => next_run <= Utc::now(),
        }
    }

    pub async fn find_by_id(id: Uuid, db: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Self>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(db)
        .await?;

        Ok(job)
    }

    /// Find a job by its client-visible token.
    pub async fn find_by_job_id(job_id: &str, db: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(db)
        .await?;

        Ok(job)
    }

    /// Find a live (pending or processing) job with the given idempotency key.
    pub async fn find_live_by_idempotency_key(key: &str, db: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE idempotency_key = $1 AND status IN ('pending', 'processing') \
             LIMIT 1"
        ))
        .bind(key)
        .fetch_optional(db)
        .await?;

        Ok(job)
    }

    pub async fn insert(&self, db: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Self>(&format!(
            "INSERT INTO jobs ( \
                 id, job_id, job_type, status, progress, args, result, error, error_kind, \
                 retry_count, max_retries, idempotency_key, next_run_at, lease_expires_at, worker_id, \
                 created_at, updated_at, completed_at \
             ) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(self.id)
        .bind(&self.job_id)
        .bind(&self.job_type)
        .bind(self.status)
        .bind(self.progress)
        .bind(&self.args)
        .bind(&self.result)
        .bind(&self.error)
        .bind(self.error_kind)
        .bind(self.retry_count)
        .bind(self.max_retries)
        .bind(&self.idempotency_key)
        .bind(self.next_run_at)
        .bind(self.lease_expires_at)
        .bind(&self.worker_id)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(self.completed_at)
        .fetch_one(db)
        .await?;

        Ok(job)
    }

    /// Claim ready jobs atomically using FOR UPDATE SKIP LOCKED.
    ///
    /// Claimed rows transition to `processing` with a fresh lease. A
    /// `processing` row whose lease expired (worker crash) is reclaimable;
    /// its progress restarts from zero for the new attempt.
    pub async fn claim_jobs(
        limit: i64,
        worker_id: &str,
        lease_duration_ms: i64,
        db: &PgPool,
    ) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, Self>(&format!(
            "WITH next_jobs AS ( \
                 SELECT id \
                 FROM jobs \
                 WHERE \
                     (status = 'pending' AND (next_run_at IS NULL OR next_run_at <= NOW())) \
                     OR (status = 'processing' AND lease_expires_at < NOW()) \
                 ORDER BY COALESCE(next_run_at, created_at) \
                 LIMIT $1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE jobs \
             SET \
                 status = 'processing', \
                 progress = 0, \
                 lease_expires_at = NOW() + ($2 || ' milliseconds')::INTERVAL, \
                 worker_id = $3, \
                 updated_at = NOW() \
             WHERE id IN (SELECT id FROM next_jobs) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(limit)
        .bind(lease_duration_ms.to_string())
        .bind(worker_id)
        .fetch_all(db)
        .await?;

        Ok(jobs)
    }

    /// Extend the lease for a processing job (heartbeat).
    pub async fn extend_lease(id: Uuid, lease_duration_ms: i64, db: &PgPool) -> Result<()> {
        sqlx::query(
            "UPDATE jobs \
             SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL, \
                 updated_at = NOW() \
             WHERE id = $2 AND status = 'processing'",
        )
        .bind(lease_duration_ms.to_string())
        .bind(id)
        .execute(db)
        .await?;

        Ok(())
    }
}
