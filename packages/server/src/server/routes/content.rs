//! Content endpoints: async idea and video generation jobs.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domains::brands::Brand;
use crate::domains::content::{GenerateIdeasJob, GenerateVideoJob};
use crate::kernel::jobs::{EnqueueResult, JobQueueExt};
use crate::server::error::ApiError;

use super::{owner_token, AppState, JobAccepted};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeasRequest {
    pub brand_id: Uuid,
    pub count: Option<usize>,
}

/// Dispatch idea generation; the ideas land in the job result.
pub async fn generate_ideas(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IdeasRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let owner = owner_token(&headers)?;
    let brand = Brand::find_for_owner(request.brand_id, &owner, &state.deps.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("brand {} not found", request.brand_id)))?;

    let enqueued = state
        .deps
        .jobs
        .enqueue(&GenerateIdeasJob {
            brand_id: brand.id,
            count: request.count,
        })
        .await?;

    let (job_id, message) = match enqueued {
        EnqueueResult::Created(id) => (id, "idea generation started"),
        EnqueueResult::Duplicate(id) => (id, "idea generation already in progress"),
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id,
            message: message.to_string(),
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    pub brand_id: Uuid,
    pub idea: String,
    pub aspect_ratio: Option<String>,
}

pub async fn create_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<VideoRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let owner = owner_token(&headers)?;
    if request.idea.trim().is_empty() {
        return Err(ApiError::bad_request("idea must not be empty"));
    }

    let brand = Brand::find_for_owner(request.brand_id, &owner, &state.deps.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("brand {} not found", request.brand_id)))?;

    let enqueued = state
        .deps
        .jobs
        .enqueue(&GenerateVideoJob {
            brand_id: brand.id,
            idea: request.idea,
            aspect_ratio: request.aspect_ratio,
        })
        .await?;

    let (job_id, message) = match enqueued {
        EnqueueResult::Created(id) => (id, "video generation started"),
        EnqueueResult::Duplicate(id) => (id, "video generation already in progress"),
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id,
            message: message.to_string(),
        }),
    ))
}
