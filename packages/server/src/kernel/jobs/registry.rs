//! Maps job types to handlers.
//!
//! Handlers are registered once at startup against the command type's
//! `JOB_TYPE`; the runner looks them up by the string stored on the claimed
//! job row and hands them the deserialized payload plus a `JobContext`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tracing::warn;
use uuid::Uuid;

use crate::kernel::deps::ServerDeps;

use super::failure::JobOutcome;
use super::job::Job;
use super::queue::{JobMeta, JobQueue};

pub type BoxedHandler = Box<
    dyn Fn(serde_json::Value, JobContext, Arc<ServerDeps>) -> BoxFuture<'static, JobOutcome>
        + Send
        + Sync,
>;

/// Execution context handed to a running job handler.
#[derive(Clone)]
pub struct JobContext {
    pub id: Uuid,
    /// Client-visible token, useful for log correlation.
    pub job_id: String,
    /// Retries already consumed when this attempt was claimed.
    pub attempt: i32,
    queue: Arc<dyn JobQueue>,
}

impl JobContext {
    pub fn new(job: &Job, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            id: job.id,
            job_id: job.job_id.clone(),
            attempt: job.retry_count,
            queue,
        }
    }

    /// Report progress. Reporting failures never fail the job; they are
    /// logged and the handler continues.
    pub async fn update_progress(&self, percent: i32) {
        if let Err(e) = self.queue.update_progress(self.id, percent).await {
            warn!(job_id = %self.job_id, error = %e, "progress update failed");
        }
    }

    /// Extend this job's lease during long-running work.
    pub async fn heartbeat(&self) {
        if let Err(e) = self.queue.heartbeat(self.id).await {
            warn!(job_id = %self.job_id, error = %e, "heartbeat failed");
        }
    }
}

#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, BoxedHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for the command type `J`. The payload is
    /// deserialized before the handler runs; a payload that does not
    /// deserialize fails the job terminally.
    pub fn register<J, F, Fut>(mut self, handler: F) -> Self
    where
        J: JobMeta + DeserializeOwned + Send + 'static,
        F: Fn(J, JobContext, Arc<ServerDeps>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = JobOutcome> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |payload, ctx, deps| {
            let handler = handler.clone();
            Box::pin(async move {
                let command: J = serde_json::from_value(payload)?;
                handler(command, ctx, deps).await
            })
        });
        self.handlers.insert(J::JOB_TYPE, boxed);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<&BoxedHandler> {
        self.handlers.get(job_type)
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn job_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::testing::test_deps;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct EchoJob {
        value: i32,
    }

    impl JobMeta for EchoJob {
        const JOB_TYPE: &'static str = "echo";
    }

    async fn echo_handler(
        job: EchoJob,
        _ctx: JobContext,
        _deps: Arc<ServerDeps>,
    ) -> JobOutcome {
        Ok(json!({ "value": job.value }))
    }

    fn context(deps: &Arc<ServerDeps>) -> JobContext {
        let job = Job::for_payload(EchoJob::JOB_TYPE, json!({}), 3, None);
        JobContext::new(&job, deps.jobs.clone())
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let registry = JobRegistry::new().register::<EchoJob, _, _>(echo_handler);
        let deps = test_deps();

        let handler = registry.get(EchoJob::JOB_TYPE).unwrap();
        let outcome = handler(json!({ "value": 7 }), context(&deps), deps.clone()).await;

        assert_eq!(outcome.unwrap()["value"], 7);
    }

    #[tokio::test]
    async fn undeserializable_payload_fails_terminally() {
        let registry = JobRegistry::new().register::<EchoJob, _, _>(echo_handler);
        let deps = test_deps();

        let handler = registry.get(EchoJob::JOB_TYPE).unwrap();
        let outcome = handler(json!({ "value": "seven" }), context(&deps), deps.clone()).await;

        let failure = outcome.unwrap_err();
        assert!(!failure.should_retry());
    }

    #[test]
    fn unknown_job_type_is_absent() {
        let registry = JobRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(registry.is_empty());
    }
}
