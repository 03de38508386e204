//! Async pipeline dispatch: the same steps as the sync routes, run as a job
//! with progress reporting between stages.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::domains::content::generate;
use crate::kernel::jobs::{JobContext, JobMeta, JobOutcome};
use crate::kernel::ServerDeps;

use super::actions::{load_brand, PipelineError, PipelineOutput};

#[derive(Debug, Serialize, Deserialize)]
pub struct RunPipelineJob {
    pub brand_id: Uuid,
    pub idea_count: Option<usize>,
}

impl JobMeta for RunPipelineJob {
    const JOB_TYPE: &'static str = "run_pipeline";
}

pub async fn run_pipeline(
    job: RunPipelineJob,
    ctx: JobContext,
    deps: Arc<ServerDeps>,
) -> JobOutcome {
    let brand = load_brand(&deps, job.brand_id).await?;
    ctx.update_progress(10).await;

    let ideas = generate::generate_ideas(&deps.ai, &brand, job.idea_count)
        .await
        .map_err(PipelineError::Ai)?;
    let lead = ideas.first().ok_or(PipelineError::NoIdeas)?;
    ctx.update_progress(30).await;

    let outline = generate::generate_outline(&deps.ai, &brand, &lead.title)
        .await
        .map_err(PipelineError::Ai)?;
    ctx.update_progress(55).await;

    let production_guide = generate::generate_production_guide(&deps.ai, &outline)
        .await
        .map_err(PipelineError::Ai)?;
    ctx.update_progress(75).await;

    let seo = generate::generate_seo(&deps.ai, &brand, &outline)
        .await
        .map_err(PipelineError::Ai)?;
    ctx.update_progress(90).await;

    let output = PipelineOutput {
        ideas,
        outline,
        production_guide,
        seo,
    };

    Ok(json!(output))
}
