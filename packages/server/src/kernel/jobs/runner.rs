//! Polling worker loop.
//!
//! Claims batches of ready jobs, dispatches each through the registry in its
//! own task so a panicking handler cannot take down the loop or its batch
//! siblings, and records the outcome. Also runs the periodic maintenance
//! sweep (stale pending jobs, retention purge).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::kernel::deps::ServerDeps;

use super::failure::JobFailure;
use super::queue::{ClaimedJob, JobQueue};
use super::registry::{JobContext, JobRegistry};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_BATCH_SIZE: i64 = 10;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct JobRunner {
    registry: Arc<JobRegistry>,
    deps: Arc<ServerDeps>,
    queue: Arc<dyn JobQueue>,
    worker_id: String,
    poll_interval: Duration,
    batch_size: i64,
    sweep_interval: Duration,
    stale_pending_after: chrono::Duration,
    retention: chrono::Duration,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(registry: JobRegistry, deps: Arc<ServerDeps>, config: &Config) -> Self {
        let queue = deps.jobs.clone();
        Self {
            registry: Arc::new(registry),
            deps,
            queue,
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            stale_pending_after: chrono::Duration::minutes(config.stale_pending_minutes),
            retention: chrono::Duration::days(config.job_retention_days),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Spawn the loop onto the runtime; the returned handle stops it.
    pub fn spawn(self) -> JobRunnerHandle {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            self.run().await;
        });
        JobRunnerHandle { shutdown, handle }
    }

    pub async fn run(&self) {
        info!(
            worker_id = %self.worker_id,
            job_types = ?self.registry.job_types().collect::<Vec<_>>(),
            "job runner started"
        );

        let mut last_sweep = std::time::Instant::now();

        while !self.shutdown.load(Ordering::Relaxed) {
            let executed = self.run_once().await;

            if last_sweep.elapsed() >= self.sweep_interval {
                self.sweep().await;
                last_sweep = std::time::Instant::now();
            }

            // Only back off when the queue is drained; stay hot otherwise.
            if executed == 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        info!(worker_id = %self.worker_id, "job runner stopped");
    }

    /// Claim and execute one batch. Returns the number of jobs executed.
    pub async fn run_once(&self) -> usize {
        let claimed = match self.queue.claim(&self.worker_id, self.batch_size).await {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(error = %e, "failed to claim jobs");
                return 0;
            }
        };

        let count = claimed.len();
        for job in claimed {
            self.execute(job).await;
        }
        count
    }

    async fn execute(&self, claimed: ClaimedJob) {
        let job = claimed.job;
        let start = std::time::Instant::now();

        let Some(handler) = self.registry.get(&job.job_type) else {
            error!(
                job_id = %job.job_id,
                job_type = %job.job_type,
                "no handler registered for job type"
            );
            let failure =
                JobFailure::terminal(format!("no handler registered for {}", job.job_type));
            if let Err(e) = self.queue.mark_failed(job.id, &failure).await {
                error!(job_id = %job.job_id, error = %e, "failed to record missing handler");
            }
            return;
        };

        debug!(
            job_id = %job.job_id,
            job_type = %job.job_type,
            attempt = job.retry_count,
            "executing job"
        );

        let ctx = JobContext::new(&job, self.queue.clone());
        let payload = job.args.clone().unwrap_or(serde_json::Value::Null);
        let fut = handler(payload, ctx, self.deps.clone());

        // Own task per job so a panic is contained as a retryable failure.
        let outcome = match tokio::spawn(fut).await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                warn!(job_id = %job.job_id, error = %join_err, "job task panicked or was aborted");
                Err(JobFailure::retryable(format!("job task died: {join_err}")))
            }
        };

        match outcome {
            Ok(result) => {
                info!(
                    job_id = %job.job_id,
                    job_type = %job.job_type,
                    duration_ms = start.elapsed().as_millis(),
                    "job completed"
                );
                if let Err(e) = self.queue.mark_completed(job.id, result).await {
                    error!(job_id = %job.job_id, error = %e, "failed to record completion");
                }
            }
            Err(failure) => {
                if let Err(e) = self.queue.mark_failed(job.id, &failure).await {
                    error!(job_id = %job.job_id, error = %e, "failed to record failure");
                }
            }
        }
    }

    /// Periodic maintenance: fail pending jobs nothing ever claimed and
    /// purge terminal jobs past retention.
    pub async fn sweep(&self) {
        if let Err(e) = self.queue.fail_stale_pending(self.stale_pending_after).await {
            error!(error = %e, "stale pending sweep failed");
        }
        if let Err(e) = self.queue.delete_older_than(self.retention).await {
            error!(error = %e, "retention purge failed");
        }
    }
}

pub struct JobRunnerHandle {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl JobRunnerHandle {
    /// Signal the loop to stop and wait for the in-flight batch to finish.
    pub async fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "job runner task did not shut down cleanly");
        }
    }
}
