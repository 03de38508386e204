//! Pipeline endpoints: each step runs synchronously; `dispatch` runs the
//! whole chain as a background job.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domains::brands::jobs::BrandAnalysis;
use crate::domains::brands::Brand;
use crate::domains::content::{ContentIdea, ProductionGuide, SeoPackage, VideoOutline};
use crate::domains::pipeline::{actions, PipelineOutput, RunPipelineJob};
use crate::kernel::jobs::{EnqueueResult, JobQueueExt};
use crate::server::error::ApiError;

use super::{owner_token, AppState, JobAccepted};

async fn check_owner(state: &AppState, headers: &HeaderMap, brand_id: Uuid) -> Result<(), ApiError> {
    let owner = owner_token(headers)?;
    Brand::find_for_owner(brand_id, &owner, &state.deps.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("brand {brand_id} not found")))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandStep {
    pub brand_id: Uuid,
}

pub async fn analyze_brand(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BrandStep>,
) -> Result<Json<BrandAnalysis>, ApiError> {
    check_owner(&state, &headers, request.brand_id).await?;
    let analysis = actions::analyze_brand(&state.deps, request.brand_id).await?;
    Ok(Json(analysis))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeasStep {
    pub brand_id: Uuid,
    pub count: Option<usize>,
}

pub async fn generate_content_ideas(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IdeasStep>,
) -> Result<Json<Vec<ContentIdea>>, ApiError> {
    check_owner(&state, &headers, request.brand_id).await?;
    let ideas =
        actions::generate_content_ideas(&state.deps, request.brand_id, request.count).await?;
    Ok(Json(ideas))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineStep {
    pub brand_id: Uuid,
    pub idea: String,
}

pub async fn create_video_outlines(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OutlineStep>,
) -> Result<Json<VideoOutline>, ApiError> {
    check_owner(&state, &headers, request.brand_id).await?;
    if request.idea.trim().is_empty() {
        return Err(ApiError::bad_request("idea must not be empty"));
    }
    let outline =
        actions::create_video_outline(&state.deps, request.brand_id, &request.idea).await?;
    Ok(Json(outline))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideStep {
    pub brand_id: Uuid,
    pub outline: VideoOutline,
}

pub async fn generate_production_guide(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GuideStep>,
) -> Result<Json<ProductionGuide>, ApiError> {
    check_owner(&state, &headers, request.brand_id).await?;
    let guide = actions::generate_production_guide(&state.deps, &request.outline).await?;
    Ok(Json(guide))
}

pub async fn optimize_seo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GuideStep>,
) -> Result<Json<SeoPackage>, ApiError> {
    check_owner(&state, &headers, request.brand_id).await?;
    let seo = actions::optimize_seo(&state.deps, request.brand_id, &request.outline).await?;
    Ok(Json(seo))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullPipelineStep {
    pub brand_id: Uuid,
    pub idea_count: Option<usize>,
}

pub async fn full_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FullPipelineStep>,
) -> Result<Json<PipelineOutput>, ApiError> {
    check_owner(&state, &headers, request.brand_id).await?;
    let output =
        actions::run_full_pipeline(&state.deps, request.brand_id, request.idea_count).await?;
    Ok(Json(output))
}

pub async fn dispatch_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FullPipelineStep>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    check_owner(&state, &headers, request.brand_id).await?;

    let enqueued = state
        .deps
        .jobs
        .enqueue(&RunPipelineJob {
            brand_id: request.brand_id,
            idea_count: request.idea_count,
        })
        .await?;

    let (job_id, message) = match enqueued {
        EnqueueResult::Created(id) => (id, "pipeline started"),
        EnqueueResult::Duplicate(id) => (id, "pipeline already in progress"),
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id,
            message: message.to_string(),
        }),
    ))
}
