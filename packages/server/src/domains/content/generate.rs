//! Content generation steps, each one structured-output call against the
//! brand's identity. Steps are stateless so the sync pipeline routes and the
//! async jobs compose them freely.

use openai_client::{OpenAIClient, OpenAIError};
use tracing::debug;

use crate::domains::brands::Brand;
use crate::kernel::{GPT_4O, GPT_4O_MINI};

use super::types::{ContentIdea, IdeaBatch, ProductionGuide, SeoPackage, VideoOutline};

const DEFAULT_IDEA_COUNT: usize = 5;

pub async fn generate_ideas(
    ai: &OpenAIClient,
    brand: &Brand,
    count: Option<usize>,
) -> Result<Vec<ContentIdea>, OpenAIError> {
    let count = count.unwrap_or(DEFAULT_IDEA_COUNT).clamp(1, 20);
    let system = "You are a short-form video strategist for e-commerce brands. \
        Generate concrete, filmable content ideas anchored in the brand's pillars.";
    let prompt = format!(
        "{}\n\nGenerate exactly {count} short-form video ideas.",
        brand.prompt_summary()
    );

    let batch: IdeaBatch = ai.extract(GPT_4O_MINI, system, prompt).await?;
    debug!(brand_id = %brand.id, count = batch.ideas.len(), "content ideas generated");
    Ok(batch.ideas)
}

pub async fn generate_outline(
    ai: &OpenAIClient,
    brand: &Brand,
    idea: &str,
) -> Result<VideoOutline, OpenAIError> {
    let system = "You are a short-form video director. Turn an idea into a \
        scene-by-scene outline under 60 seconds total, with voiceover lines \
        in the brand's voice.";
    let prompt = format!("{}\n\nVideo idea: {idea}", brand.prompt_summary());

    ai.extract(GPT_4O, system, prompt).await
}

pub async fn generate_production_guide(
    ai: &OpenAIClient,
    outline: &VideoOutline,
) -> Result<ProductionGuide, OpenAIError> {
    let system = "You are a video producer. Write a practical production guide \
        a one-person team can shoot on a phone.";
    let prompt = format!(
        "Outline:\n{}\n\nProduce the shot list, equipment, and editing notes.",
        outline.script()
    );

    ai.extract(GPT_4O, system, prompt).await
}

pub async fn generate_seo(
    ai: &OpenAIClient,
    brand: &Brand,
    outline: &VideoOutline,
) -> Result<SeoPackage, OpenAIError> {
    let system = "You are a social SEO specialist. Optimize titles, descriptions, \
        hashtags, and keywords for short-form video discovery.";
    let prompt = format!(
        "{}\n\nVideo title: {}\nHook: {}",
        brand.prompt_summary(),
        outline.title,
        outline.hook
    );

    ai.extract(GPT_4O_MINI, system, prompt).await
}
