//! Pipeline steps over a brand's stored identity.
//!
//! Each step is stateless and synchronous from the caller's point of view;
//! the pipeline routes expose them directly and `run_full_pipeline` chains
//! them end to end.

use openai_client::OpenAIError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::domains::brands::jobs::BrandAnalysis;
use crate::domains::brands::Brand;
use crate::domains::content::generate;
use crate::domains::content::{ContentIdea, ProductionGuide, SeoPackage, VideoOutline};
use crate::domains::scraping::Product;
use crate::kernel::jobs::JobFailure;
use crate::kernel::{ServerDeps, GPT_4O};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("brand {0} not found")]
    BrandNotFound(Uuid),
    #[error("the model returned no content ideas")]
    NoIdeas,
    #[error(transparent)]
    Ai(#[from] OpenAIError),
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

impl From<PipelineError> for JobFailure {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::BrandNotFound(_) => JobFailure::terminal(e.to_string()),
            // Empty output is usually a model flake worth retrying.
            PipelineError::NoIdeas => JobFailure::retryable(e.to_string()),
            PipelineError::Ai(ai) => ai.into(),
            PipelineError::Db(db) => JobFailure::retryable(db.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub ideas: Vec<ContentIdea>,
    pub outline: VideoOutline,
    pub production_guide: ProductionGuide,
    pub seo: SeoPackage,
}

pub async fn load_brand(deps: &ServerDeps, brand_id: Uuid) -> Result<Brand, PipelineError> {
    Brand::find_by_id(brand_id, &deps.db_pool)
        .await?
        .ok_or(PipelineError::BrandNotFound(brand_id))
}

/// Re-derive the brand's identity from what is already stored (brand fields
/// plus product catalog), without touching the network beyond the LLM.
pub async fn analyze_brand(
    deps: &ServerDeps,
    brand_id: Uuid,
) -> Result<BrandAnalysis, PipelineError> {
    let brand = load_brand(deps, brand_id).await?;
    let products = Product::list_for_brand(brand.id, &deps.db_pool).await?;

    let system = "You are a brand strategist. Derive the brand's voice, content \
        pillars, and color palette from its stored identity and catalog.";
    let mut prompt = brand.prompt_summary();
    if !products.is_empty() {
        prompt.push_str("\nProducts:\n");
        for product in products.iter().take(20) {
            prompt.push_str(&format!("- {}\n", product.name));
        }
    }

    Ok(deps.ai.extract(GPT_4O, system, prompt).await?)
}

pub async fn generate_content_ideas(
    deps: &ServerDeps,
    brand_id: Uuid,
    count: Option<usize>,
) -> Result<Vec<ContentIdea>, PipelineError> {
    let brand = load_brand(deps, brand_id).await?;
    Ok(generate::generate_ideas(&deps.ai, &brand, count).await?)
}

pub async fn create_video_outline(
    deps: &ServerDeps,
    brand_id: Uuid,
    idea: &str,
) -> Result<VideoOutline, PipelineError> {
    let brand = load_brand(deps, brand_id).await?;
    Ok(generate::generate_outline(&deps.ai, &brand, idea).await?)
}

pub async fn generate_production_guide(
    deps: &ServerDeps,
    outline: &VideoOutline,
) -> Result<ProductionGuide, PipelineError> {
    Ok(generate::generate_production_guide(&deps.ai, outline).await?)
}

pub async fn optimize_seo(
    deps: &ServerDeps,
    brand_id: Uuid,
    outline: &VideoOutline,
) -> Result<SeoPackage, PipelineError> {
    let brand = load_brand(deps, brand_id).await?;
    Ok(generate::generate_seo(&deps.ai, &brand, outline).await?)
}

/// Idea generation through SEO in one pass, producing one outline from the
/// top-ranked idea.
pub async fn run_full_pipeline(
    deps: &ServerDeps,
    brand_id: Uuid,
    idea_count: Option<usize>,
) -> Result<PipelineOutput, PipelineError> {
    let brand = load_brand(deps, brand_id).await?;

    let ideas = generate::generate_ideas(&deps.ai, &brand, idea_count).await?;
    let lead = ideas.first().ok_or(PipelineError::NoIdeas)?;

    let outline = generate::generate_outline(&deps.ai, &brand, &lead.title).await?;
    let production_guide = generate::generate_production_guide(&deps.ai, &outline).await?;
    let seo = generate::generate_seo(&deps.ai, &brand, &outline).await?;

    info!(
        brand_id = %brand.id,
        ideas = ideas.len(),
        scenes = outline.scenes.len(),
        "full pipeline finished"
    );

    Ok(PipelineOutput {
        ideas,
        outline,
        production_guide,
        seo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_not_found_fails_terminally() {
        let failure = JobFailure::from(PipelineError::BrandNotFound(Uuid::now_v7()));
        assert!(!failure.should_retry());
    }

    #[test]
    fn empty_ideas_are_retryable() {
        let failure = JobFailure::from(PipelineError::NoIdeas);
        assert!(failure.should_retry());
    }
}
