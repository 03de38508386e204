//! Scraping endpoints: kick off a catalog scrape, read its progress, and
//! manually retry a failed one.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domains::brands::Brand;
use crate::domains::scraping::{ScrapeBrandJob, ScrapingJob};
use crate::kernel::jobs::{EnqueueResult, Job, JobQueueExt, JobStatus};
use crate::server::error::ApiError;

use super::{owner_token, AppState, JobAccepted};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub brand_id: Uuid,
    pub target_url: String,
}

pub async fn start_brand_scrape(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ScrapeRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let owner = owner_token(&headers)?;
    if request.target_url.trim().is_empty() {
        return Err(ApiError::bad_request("targetUrl must not be empty"));
    }

    let brand = Brand::find_for_owner(request.brand_id, &owner, &state.deps.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("brand {} not found", request.brand_id)))?;

    let enqueued = state
        .deps
        .jobs
        .enqueue(&ScrapeBrandJob {
            brand_id: brand.id,
            target_url: request.target_url.clone(),
        })
        .await?;

    let (job_id, message) = match &enqueued {
        EnqueueResult::Created(id) => {
            // Bookkeeping row keyed by the same token as the jobs row.
            ScrapingJob::builder()
                .job_id(id.clone())
                .brand_id(brand.id)
                .target_url(request.target_url)
                .build()
                .insert(&state.deps.db_pool)
                .await?;
            (id.clone(), "brand scrape started")
        }
        EnqueueResult::Duplicate(id) => (id.clone(), "brand scrape already in progress"),
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id,
            message: message.to_string(),
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapingJobResponse {
    pub job_id: String,
    pub brand_id: Uuid,
    pub target_url: String,
    pub status: JobStatus,
    pub progress: i32,
    pub products_found: i32,
    pub products_created: i32,
    pub pages_scraped: i32,
    pub error: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
}

impl ScrapingJobResponse {
    fn new(row: ScrapingJob, job: Job) -> Self {
        Self {
            job_id: row.job_id,
            brand_id: row.brand_id,
            target_url: row.target_url,
            status: job.status,
            progress: job.progress,
            products_found: row.products_found,
            products_created: row.products_created,
            pages_scraped: row.pages_scraped,
            error: job.error,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            created_at: row.created_at,
        }
    }
}

pub async fn get_scraping_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Json<ScrapingJobResponse>, ApiError> {
    let owner = owner_token(&headers)?;
    let (row, job) = load_owned_scrape(&state, &owner, &job_id).await?;
    Ok(Json(ScrapingJobResponse::new(row, job)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    pub message: String,
    pub retry_count: i32,
}

/// Manually retry a failed scrape. 400 when the job isn't failed or its
/// budget is spent, 403 when the caller doesn't own the brand.
pub async fn retry_scraping_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Json<RetryResponse>, ApiError> {
    let owner = owner_token(&headers)?;
    load_owned_scrape(&state, &owner, &job_id).await?;

    let retry_count = state.deps.jobs.retry(&job_id).await?;

    Ok(Json(RetryResponse {
        message: "scrape retry scheduled".to_string(),
        retry_count,
    }))
}

/// Fetch the scrape row plus its jobs row, enforcing brand ownership.
async fn load_owned_scrape(
    state: &AppState,
    owner: &str,
    job_id: &str,
) -> Result<(ScrapingJob, Job), ApiError> {
    let row = ScrapingJob::find_by_job_id(job_id, &state.deps.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("scraping job {job_id} not found")))?;

    let brand = Brand::find_by_id(row.brand_id, &state.deps.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("brand {} not found", row.brand_id)))?;
    if brand.owner_token != owner {
        return Err(ApiError::Forbidden(
            "scraping job belongs to another owner".to_string(),
        ));
    }

    let job = state
        .deps
        .jobs
        .find_by_job_id(job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;

    Ok((row, job))
}
