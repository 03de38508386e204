//! Job status endpoint, the read side of every async operation.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::kernel::jobs::{Job, JobStatus};
use crate::server::error::ApiError;

use super::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub progress: i32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id,
            job_type: job.job_type,
            status: job.status,
            progress: job.progress,
            result: job.result,
            error: job.error,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state
        .deps
        .jobs
        .find_by_job_id(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;

    Ok(Json(job.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_serializes_camel_case() {
        let job = Job::for_payload("test_job", json!({}), 3, None);
        let response = JobStatusResponse::from(job);
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["status"], "pending");
        assert_eq!(value["retryCount"], 0);
        assert_eq!(value["maxRetries"], 3);
        assert!(value["result"].is_null());
        assert!(value.get("jobId").is_some());
    }
}
