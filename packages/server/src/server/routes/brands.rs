//! Brand endpoints: assimilation kickoff, listing, and the brand kit.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domains::brands::{AssimilateBrandJob, Brand, BrandKit, BrandKitUpdate};
use crate::kernel::jobs::{EnqueueResult, JobQueueExt};
use crate::server::error::ApiError;

use super::{owner_token, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssimilateRequest {
    pub name: String,
    pub website_url: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssimilateAccepted {
    pub job_id: String,
    pub brand_id: Uuid,
    pub message: String,
}

/// Create a brand and kick off assimilation of its website.
pub async fn assimilate_brand(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AssimilateRequest>,
) -> Result<(StatusCode, Json<AssimilateAccepted>), ApiError> {
    let owner = owner_token(&headers)?;

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    if request.website_url.trim().is_empty() {
        return Err(ApiError::bad_request("websiteUrl must not be empty"));
    }

    let brand = Brand::builder()
        .owner_token(owner)
        .name(name)
        .website_url(request.website_url.clone())
        .build()
        .insert(&state.deps.db_pool)
        .await?;

    // Enqueue failures surface as 500; the client never gets a job token
    // for work that was not durably recorded.
    let enqueued = state
        .deps
        .jobs
        .enqueue(&AssimilateBrandJob {
            brand_id: brand.id,
            website_url: request.website_url,
        })
        .await?;

    let (job_id, message) = match enqueued {
        EnqueueResult::Created(id) => (id, "brand assimilation started"),
        EnqueueResult::Duplicate(id) => (id, "brand assimilation already in progress"),
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(AssimilateAccepted {
            job_id,
            brand_id: brand.id,
            message: message.to_string(),
        }),
    ))
}

pub async fn list_brands(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Brand>>, ApiError> {
    let owner = owner_token(&headers)?;
    let brands = Brand::list_for_owner(&owner, &state.deps.db_pool).await?;
    Ok(Json(brands))
}

pub async fn get_brand_kit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(brand_id): Path<Uuid>,
) -> Result<Json<BrandKit>, ApiError> {
    let owner = owner_token(&headers)?;
    let brand = Brand::find_for_owner(brand_id, &owner, &state.deps.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("brand {brand_id} not found")))?;

    Ok(Json(brand.kit()))
}

pub async fn update_brand_kit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(brand_id): Path<Uuid>,
    Json(update): Json<BrandKitUpdate>,
) -> Result<Json<BrandKit>, ApiError> {
    let owner = owner_token(&headers)?;
    let brand = Brand::find_for_owner(brand_id, &owner, &state.deps.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("brand {brand_id} not found")))?;

    let brand = brand.update_kit(&update, &state.deps.db_pool).await?;
    Ok(Json(brand.kit()))
}
