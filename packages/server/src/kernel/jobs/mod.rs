//! Postgres-backed background job system.
//!
//! A job is a durable row driven through `pending -> processing ->
//! {completed | failed}` by atomic SQL transitions. Workers claim batches
//! with `FOR UPDATE SKIP LOCKED`, hold a lease while running, and report a
//! tagged outcome; retryable failures are rescheduled with exponential
//! backoff until their budget runs out.

pub mod failure;
pub mod job;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod testing;

pub use failure::{JobFailure, JobOutcome};
pub use job::{ErrorKind, Job, JobStatus};
pub use queue::{
    ClaimedJob, EnqueueResult, JobMeta, JobQueue, JobQueueExt, JobSpec, PostgresJobQueue,
    RetryError, RetryPolicy,
};
pub use registry::{JobContext, JobRegistry};
pub use runner::{JobRunner, JobRunnerHandle};
pub use testing::InMemoryJobQueue;
