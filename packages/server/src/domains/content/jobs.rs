//! Content generation jobs: idea batches, and the full video production
//! chain (outline, production guide, SEO, render).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domains::brands::Brand;
use crate::kernel::jobs::{JobContext, JobFailure, JobMeta, JobOutcome};
use crate::kernel::video::RenderRequest;
use crate::kernel::ServerDeps;

use super::generate;

const DEFAULT_ASPECT_RATIO: &str = "9:16";

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateIdeasJob {
    pub brand_id: Uuid,
    pub count: Option<usize>,
}

impl JobMeta for GenerateIdeasJob {
    const JOB_TYPE: &'static str = "generate_ideas";
}

pub async fn generate_ideas(
    job: GenerateIdeasJob,
    ctx: JobContext,
    deps: Arc<ServerDeps>,
) -> JobOutcome {
    let brand = Brand::find_by_id(job.brand_id, &deps.db_pool)
        .await?
        .ok_or_else(|| JobFailure::terminal(format!("brand {} not found", job.brand_id)))?;
    ctx.update_progress(10).await;

    let ideas = generate::generate_ideas(&deps.ai, &brand, job.count).await?;
    ctx.update_progress(90).await;

    info!(brand_id = %brand.id, ideas = ideas.len(), "content ideas generated");

    Ok(json!({
        "brandId": brand.id,
        "ideas": ideas,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateVideoJob {
    pub brand_id: Uuid,
    /// The idea to produce, usually one of the generated idea titles.
    pub idea: String,
    pub aspect_ratio: Option<String>,
}

impl JobMeta for GenerateVideoJob {
    const JOB_TYPE: &'static str = "generate_video";
}

pub async fn generate_video(
    job: GenerateVideoJob,
    ctx: JobContext,
    deps: Arc<ServerDeps>,
) -> JobOutcome {
    let brand = Brand::find_by_id(job.brand_id, &deps.db_pool)
        .await?
        .ok_or_else(|| JobFailure::terminal(format!("brand {} not found", job.brand_id)))?;
    ctx.update_progress(5).await;

    let outline = generate::generate_outline(&deps.ai, &brand, &job.idea).await?;
    ctx.update_progress(30).await;

    let guide = generate::generate_production_guide(&deps.ai, &outline).await?;
    ctx.update_progress(50).await;

    let seo = generate::generate_seo(&deps.ai, &brand, &outline).await?;
    ctx.update_progress(65).await;

    // Rendering is the long pole; keep the lease alive around it.
    ctx.heartbeat().await;
    let rendered = deps
        .video
        .render(RenderRequest {
            title: outline.title.clone(),
            script: outline.script(),
            aspect_ratio: job
                .aspect_ratio
                .unwrap_or_else(|| DEFAULT_ASPECT_RATIO.to_string()),
        })
        .await?;
    ctx.update_progress(95).await;

    info!(
        brand_id = %brand.id,
        video_url = %rendered.video_url,
        scenes = outline.scenes.len(),
        "video generated"
    );

    Ok(json!({
        "brandId": brand.id,
        "videoUrl": rendered.video_url,
        "durationSeconds": rendered.duration_seconds,
        "providerId": rendered.provider_id,
        "outline": outline,
        "productionGuide": guide,
        "seo": seo,
    }))
}
