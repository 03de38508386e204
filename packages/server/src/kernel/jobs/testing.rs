//! In-memory job queue for tests that don't need Postgres.
//!
//! Mirrors the transition semantics of `PostgresJobQueue` over a HashMap so
//! unit tests can exercise the full job lifecycle without a database.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::failure::JobFailure;
use super::job::{Job, JobStatus};
use super::queue::{
    ClaimedJob, EnqueueResult, JobQueue, JobSpec, RetryError, RetryPolicy, DEFAULT_LEASE_MS,
};

pub struct InMemoryJobQueue {
    jobs: Mutex<HashMap<Uuid, Job>>,
    policy: RetryPolicy,
    lease_duration_ms: i64,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            policy,
            lease_duration_ms: DEFAULT_LEASE_MS,
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Snapshot of a job by internal id, for assertions.
    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().await.get(&id).cloned()
    }

    /// Force a job's lease into the past, simulating a crashed worker.
    pub async fn expire_lease(&self, id: Uuid) {
        if let Some(job) = self.jobs.lock().await.get_mut(&id) {
            job.lease_expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        }
    }

    /// Backdate a job so staleness sweeps see it as old.
    pub async fn age_job(&self, id: Uuid, by: chrono::Duration) {
        if let Some(job) = self.jobs.lock().await.get_mut(&id) {
            job.created_at -= by;
            job.updated_at -= by;
            if let Some(next_run) = job.next_run_at.as_mut() {
                *next_run -= by;
            }
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue_spec(&self, spec: JobSpec) -> Result<EnqueueResult> {
        let mut jobs = self.jobs.lock().await;

        if let Some(key) = &spec.idempotency_key {
            let live = jobs.values().find(|j| {
                j.idempotency_key.as_deref() == Some(key)
                    && matches!(j.status, JobStatus::Pending | JobStatus::Processing)
            });
            if let Some(existing) = live {
                return Ok(EnqueueResult::Duplicate(existing.job_id.clone()));
            }
        }

        let max_retries = spec.max_retries.unwrap_or(self.policy.default_max_retries);
        let job = Job::for_payload(
            &spec.job_type,
            spec.payload,
            max_retries,
            spec.idempotency_key,
        );
        let token = job.job_id.clone();
        jobs.insert(job.id, job);

        Ok(EnqueueResult::Created(token))
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        let mut jobs = self.jobs.lock().await;
        let now = Utc::now();

        let mut ready: Vec<Uuid> = jobs
            .values()
            .filter(|j| {
                j.is_ready()
                    || (j.status == JobStatus::Processing
                        && j.lease_expires_at.map(|t| t < now).unwrap_or(false))
            })
            .map(|j| j.id)
            .collect();
        ready.sort_by_key(|id| {
            let j = &jobs[id];
            j.next_run_at.unwrap_or(j.created_at)
        });
        ready.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(ready.len());
        for id in ready {
            if let Some(job) = jobs.get_mut(&id) {
                job.status = JobStatus::Processing;
                job.progress = 0;
                job.lease_expires_at =
                    Some(now + chrono::Duration::milliseconds(self.lease_duration_ms));
                job.worker_id = Some(worker_id.to_string());
                job.updated_at = now;
                claimed.push(ClaimedJob { job: job.clone() });
            }
        }

        Ok(claimed)
    }

    async fn heartbeat(&self, id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Processing {
                job.lease_expires_at =
                    Some(Utc::now() + chrono::Duration::milliseconds(self.lease_duration_ms));
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn update_progress(&self, id: Uuid, percent: i32) -> Result<()> {
        if !(0..=100).contains(&percent) {
            return Ok(());
        }
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Processing {
                job.progress = job.progress.max(percent);
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Completed;
                job.progress = 100;
                job.result = Some(result);
                job.error = None;
                job.error_kind = None;
                job.completed_at = Some(Utc::now());
                job.lease_expires_at = None;
                job.worker_id = None;
                job.updated_at = Utc::now();
            }
            // Duplicate or conflicting completions are ignored, first
            // result wins.
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, failure: &JobFailure) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.status != JobStatus::Processing {
                return Ok(());
            }
            let will_retry = failure.should_retry() && job.retry_count < job.max_retries;
            if will_retry {
                let delay = self.policy.backoff_delay(job.retry_count);
                job.status = JobStatus::Pending;
                job.retry_count += 1;
                job.progress = 0;
                job.error = None;
                job.error_kind = None;
                job.result = None;
                job.next_run_at = Some(Utc::now() + delay);
            } else {
                job.status = JobStatus::Failed;
                job.error = Some(failure.message.clone());
                job.error_kind = Some(failure.kind);
                job.result = None;
            }
            job.lease_expires_at = None;
            job.worker_id = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn retry(&self, job_id: &str) -> Result<i32, RetryError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .values_mut()
            .find(|j| j.job_id == job_id)
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

        job.status = JobStatus::Pending;
        job.retry_count += 1;
        job.progress = 0;
        job.error = None;
        job.error_kind = None;
        job.result = None;
        job.next_run_at = None;
        job.updated_at = Utc::now();

        Ok(job.retry_count)
    }

    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.values().find(|j| j.job_id == job_id).cloned())
    }

    async fn fail_stale_pending(&self, older_than: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - older_than;
        let mut jobs = self.jobs.lock().await;
        let mut swept = 0;

        for job in jobs.values_mut() {
            let scheduled_ok = job.next_run_at.map(|t| t < cutoff).unwrap_or(true);
            if job.status == JobStatus::Pending && job.updated_at < cutoff && scheduled_ok {
                job.status = JobStatus::Failed;
                job.error = Some("job was never claimed by a worker".to_string());
                job.error_kind = Some(super::job::ErrorKind::NonRetryable);
                job.updated_at = Utc::now();
                swept += 1;
            }
        }

        Ok(swept)
    }

    async fn delete_older_than(&self, age: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - age;
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, j| j.created_at >= cutoff);
        Ok((before - jobs.len()) as u64)
    }

    fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::queue::JobQueueExt;
    use crate::kernel::jobs::JobMeta;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct NoopJob;

    impl JobMeta for NoopJob {
        const JOB_TYPE: &'static str = "noop";
    }

    async fn enqueue_one(queue: &InMemoryJobQueue) -> Job {
        let result = queue.enqueue(&NoopJob).await.unwrap();
        queue
            .find_by_job_id(result.job_id())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn full_success_lifecycle() {
        let queue = InMemoryJobQueue::new();
        let job = enqueue_one(&queue).await;
        assert_eq!(job.status, JobStatus::Pending);

        let claimed = queue.claim("w1", 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].job.status, JobStatus::Processing);

        queue.update_progress(job.id, 40).await.unwrap();
        queue
            .mark_completed(job.id, json!({"ok": true}))
            .await
            .unwrap();

        let done = queue.get(job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.result, Some(json!({"ok": true})));
        assert!(done.error.is_none());
    }

    #[tokio::test]
    async fn progress_never_decreases() {
        let queue = InMemoryJobQueue::new();
        let job = enqueue_one(&queue).await;
        queue.claim("w1", 1).await.unwrap();

        queue.update_progress(job.id, 60).await.unwrap();
        queue.update_progress(job.id, 30).await.unwrap();
        queue.update_progress(job.id, 150).await.unwrap();

        assert_eq!(queue.get(job.id).await.unwrap().progress, 60);
    }

    #[tokio::test]
    async fn retryable_failure_reschedules_until_budget_exhausted() {
        let queue = InMemoryJobQueue::new();
        let job = enqueue_one(&queue).await;
        let failure = JobFailure::retryable("boom");

        for attempt in 1..=3 {
            let claimed = queue.claim("w1", 1).await.unwrap();
            assert_eq!(claimed.len(), 1, "attempt {attempt} should claim");
            queue.mark_failed(job.id, &failure).await.unwrap();
            // Retry is scheduled with backoff; pull it forward so the next
            // claim sees it.
            queue
                .age_job(job.id, chrono::Duration::seconds(3600))
                .await;
        }

        let pending = queue.get(job.id).await.unwrap();
        assert_eq!(pending.status, JobStatus::Pending);
        assert_eq!(pending.retry_count, 3);

        // Budget is spent, the fourth failure is terminal.
        queue.claim("w1", 1).await.unwrap();
        queue.mark_failed(job.id, &failure).await.unwrap();

        let failed = queue.get(job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn terminal_failure_skips_retry() {
        let queue = InMemoryJobQueue::new();
        let job = enqueue_one(&queue).await;
        queue.claim("w1", 1).await.unwrap();

        queue
            .mark_failed(job.id, &JobFailure::terminal("bad input"))
            .await
            .unwrap();

        let failed = queue.get(job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.retry_count, 0);
    }

    #[tokio::test]
    async fn manual_retry_resets_failed_job() {
        let queue = InMemoryJobQueue::new();
        let job = enqueue_one(&queue).await;
        queue.claim("w1", 1).await.unwrap();
        queue
            .mark_failed(job.id, &JobFailure::terminal("bad"))
            .await
            .unwrap();

        let retry_count = queue.retry(&job.job_id).await.unwrap();
        assert_eq!(retry_count, 1);

        let retried = queue.get(job.id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert!(retried.error.is_none());
        assert_eq!(retried.progress, 0);
    }

    #[tokio::test]
    async fn manual_retry_rejects_non_failed_and_exhausted() {
        let queue = InMemoryJobQueue::new();
        let job = enqueue_one(&queue).await;

        assert!(matches!(
            queue.retry(&job.job_id).await,
            Err(RetryError::NotFailed(JobStatus::Pending))
        ));
        assert!(matches!(
            queue.retry("no-such-token").await,
            Err(RetryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_completion_keeps_first_result() {
        let queue = InMemoryJobQueue::new();
        let job = enqueue_one(&queue).await;
        queue.claim("w1", 1).await.unwrap();

        queue.mark_completed(job.id, json!({"n": 1})).await.unwrap();
        queue.mark_completed(job.id, json!({"n": 2})).await.unwrap();

        assert_eq!(queue.get(job.id).await.unwrap().result, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable() {
        let queue = InMemoryJobQueue::new();
        let job = enqueue_one(&queue).await;

        let first = queue.claim("w1", 1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(queue.claim("w2", 1).await.unwrap().is_empty());

        queue.expire_lease(job.id).await;
        let reclaimed = queue.claim("w2", 1).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].job.worker_id.as_deref(), Some("w2"));
        assert_eq!(reclaimed[0].job.progress, 0);
    }

    #[tokio::test]
    async fn stale_pending_jobs_are_swept() {
        let queue = InMemoryJobQueue::new();
        let stale = enqueue_one(&queue).await;
        let fresh = enqueue_one(&queue).await;
        queue.age_job(stale.id, chrono::Duration::hours(2)).await;

        let swept = queue
            .fail_stale_pending(chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(swept, 1);
        assert_eq!(queue.get(stale.id).await.unwrap().status, JobStatus::Failed);
        assert_eq!(queue.get(fresh.id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn retention_purges_old_jobs_regardless_of_status() {
        let queue = InMemoryJobQueue::new();
        let done = enqueue_one(&queue).await;
        let old_pending = enqueue_one(&queue).await;
        let fresh = enqueue_one(&queue).await;

        queue.claim("w1", 1).await.unwrap();
        queue.mark_completed(done.id, json!({})).await.unwrap();
        queue.age_job(done.id, chrono::Duration::days(60)).await;
        queue.age_job(old_pending.id, chrono::Duration::days(60)).await;

        let deleted = queue
            .delete_older_than(chrono::Duration::days(30))
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        assert!(queue.get(done.id).await.is_none());
        assert!(queue.get(old_pending.id).await.is_none());
        assert!(queue.get(fresh.id).await.is_some());
    }

    #[tokio::test]
    async fn idempotent_enqueue_returns_duplicate_while_live() {
        let queue = InMemoryJobQueue::new();
        let spec = JobSpec {
            job_type: "noop".into(),
            payload: json!({}),
            max_retries: None,
            idempotency_key: Some("k1".into()),
        };

        let first = queue.enqueue_spec(spec.clone()).await.unwrap();
        let second = queue.enqueue_spec(spec.clone()).await.unwrap();

        assert!(matches!(first, EnqueueResult::Created(_)));
        assert_eq!(second, EnqueueResult::Duplicate(first.job_id().to_string()));

        // Once the job completes, the key frees up.
        let job = queue.find_by_job_id(first.job_id()).await.unwrap().unwrap();
        queue.claim("w1", 1).await.unwrap();
        queue.mark_completed(job.id, json!({})).await.unwrap();

        let third = queue.enqueue_spec(spec).await.unwrap();
        assert!(matches!(third, EnqueueResult::Created(_)));
    }
}
