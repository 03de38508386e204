//! Brand assimilation job: scrape the brand's site, derive its identity
//! with the LLM, and persist the resulting brand kit.

use std::sync::Arc;

use openai_client::truncate_to_char_boundary;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::kernel::jobs::{JobContext, JobFailure, JobMeta, JobOutcome};
use crate::kernel::scraper::ScrapedSite;
use crate::kernel::{ServerDeps, GPT_4O};

use super::models::{Asset, Brand, BrandKitUpdate};

#[derive(Debug, Serialize, Deserialize)]
pub struct AssimilateBrandJob {
    pub brand_id: Uuid,
    pub website_url: String,
}

impl JobMeta for AssimilateBrandJob {
    const JOB_TYPE: &'static str = "assimilate_brand";

    // One live assimilation per brand.
    fn idempotency_key(&self) -> Option<String> {
        Some(format!("assimilate:{}", self.brand_id))
    }
}

/// Identity the LLM derives from the scraped site.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BrandAnalysis {
    pub voice: BrandVoice,
    /// Three to five recurring content themes.
    pub pillars: Vec<String>,
    /// Hex color codes matching the brand's visual identity.
    pub color_palette: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BrandVoice {
    pub tone: String,
    pub personality_traits: Vec<String>,
    pub dos: Vec<String>,
    pub donts: Vec<String>,
}

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a brand strategist. Given raw content scraped \
from an e-commerce site, derive the brand's voice, content pillars, and color palette. \
Be specific to this brand, never generic.";

pub async fn assimilate_brand(
    job: AssimilateBrandJob,
    ctx: JobContext,
    deps: Arc<ServerDeps>,
) -> JobOutcome {
    let brand = Brand::find_by_id(job.brand_id, &deps.db_pool)
        .await?
        .ok_or_else(|| JobFailure::terminal(format!("brand {} not found", job.brand_id)))?;

    ctx.update_progress(10).await;
    let site = deps.scraper.scrape(&job.website_url).await?;
    ctx.update_progress(40).await;

    let analysis: BrandAnalysis = deps
        .ai
        .extract(GPT_4O, ANALYSIS_SYSTEM_PROMPT, analysis_prompt(&brand, &site))
        .await?;
    ctx.update_progress(80).await;

    let update = BrandKitUpdate {
        colors: Some(json!(analysis.color_palette)),
        voice: Some(serde_json::to_value(&analysis.voice)?),
        pillars: Some(json!(analysis.pillars)),
        logo_url: site.brand.logo_url.clone(),
        description: site.brand.description.clone(),
    };
    let brand = brand.update_kit(&update, &deps.db_pool).await?;

    if let Some(logo_url) = &brand.logo_url {
        Asset::builder()
            .brand_id(brand.id)
            .kind("logo")
            .url(logo_url.clone())
            .build()
            .insert_unique(&deps.db_pool)
            .await?;
    }
    ctx.update_progress(95).await;

    info!(
        brand_id = %brand.id,
        pillars = analysis.pillars.len(),
        "brand assimilated"
    );

    Ok(json!({
        "brandId": brand.id,
        "pillars": analysis.pillars,
        "tone": analysis.voice.tone,
        "productsSeen": site.products.len(),
    }))
}

fn analysis_prompt(brand: &Brand, site: &ScrapedSite) -> String {
    let mut prompt = format!("Brand name: {}\n", brand.name);
    if let Some(description) = site.brand.description.as_deref() {
        prompt.push_str(&format!("Site description: {description}\n"));
    }
    if !site.products.is_empty() {
        prompt.push_str("Products:\n");
        for product in site.products.iter().take(20) {
            prompt.push_str(&format!("- {}", product.name));
            if let Some(d) = product.description.as_deref() {
                let short = truncate_to_char_boundary(d, 200);
                prompt.push_str(&format!(": {short}"));
            }
            prompt.push('\n');
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::testing::sample_site;

    #[test]
    fn one_live_assimilation_per_brand() {
        let brand_id = Uuid::now_v7();
        let a = AssimilateBrandJob {
            brand_id,
            website_url: "https://a.example".into(),
        };
        let b = AssimilateBrandJob {
            brand_id,
            website_url: "https://b.example".into(),
        };
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }

    #[test]
    fn analysis_prompt_includes_products() {
        let brand = Brand::builder().owner_token("tok").name("Acme").build();
        let prompt = analysis_prompt(&brand, &sample_site());

        assert!(prompt.contains("Brand name: Acme"));
        assert!(prompt.contains("- Soy Candle"));
        assert!(prompt.contains("Hand-poured soy candles."));
    }

    #[test]
    fn analysis_prompt_bounds_long_descriptions() {
        let brand = Brand::builder().owner_token("tok").name("Acme").build();
        let mut site = sample_site();
        // Multibyte text crossing the cutoff must not split a character.
        site.products[0].description = Some("香り高いキャンドル。".repeat(50));

        let prompt = analysis_prompt(&brand, &site);
        let line = prompt
            .lines()
            .find(|l| l.starts_with("- "))
            .unwrap_or_default();
        assert!(line.len() <= 250);
    }
}
