//! Brand scraping job: pull the product catalog from a storefront and
//! upsert it into the brand's products.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domains::brands::{Asset, Brand};
use crate::kernel::jobs::{JobContext, JobFailure, JobMeta, JobOutcome};
use crate::kernel::ServerDeps;

use super::models::{Product, ScrapingJob};

#[derive(Debug, Serialize, Deserialize)]
pub struct ScrapeBrandJob {
    pub brand_id: Uuid,
    pub target_url: String,
}

impl JobMeta for ScrapeBrandJob {
    const JOB_TYPE: &'static str = "scrape_brand";

    // One live scrape per brand and target.
    fn idempotency_key(&self) -> Option<String> {
        Some(format!("scrape:{}:{}", self.brand_id, self.target_url))
    }
}

pub async fn scrape_brand(
    job: ScrapeBrandJob,
    ctx: JobContext,
    deps: Arc<ServerDeps>,
) -> JobOutcome {
    let brand = Brand::find_by_id(job.brand_id, &deps.db_pool)
        .await?
        .ok_or_else(|| JobFailure::terminal(format!("brand {} not found", job.brand_id)))?;
    ctx.update_progress(5).await;

    let site = deps.scraper.scrape(&job.target_url).await?;
    let products_found = site.products.len();
    ctx.update_progress(50).await;

    // Upserts keyed by source URL keep rescrapes and retries idempotent.
    let mut products_created = 0;
    for (i, scraped) in site.products.iter().enumerate() {
        if Product::from_scraped(brand.id, scraped).upsert(&deps.db_pool).await? {
            products_created += 1;
        }
        for image_url in &scraped.image_urls {
            Asset::builder()
                .brand_id(brand.id)
                .kind("product_image")
                .url(image_url.clone())
                .build()
                .insert_unique(&deps.db_pool)
                .await?;
        }
        if products_found > 0 {
            let percent = 50 + ((i + 1) * 45 / products_found) as i32;
            ctx.update_progress(percent).await;
        }
    }

    if let Some(row) = ScrapingJob::find_by_job_id(&ctx.job_id, &deps.db_pool).await? {
        row.update_counters(
            products_found as i32,
            products_created,
            site.pages_scraped,
            &deps.db_pool,
        )
        .await?;
    }

    info!(
        brand_id = %brand.id,
        products_found,
        products_created,
        pages_scraped = site.pages_scraped,
        "brand scrape finished"
    );

    Ok(json!({
        "brandId": brand.id,
        "productsFound": products_found,
        "productsCreated": products_created,
        "pagesScraped": site.pages_scraped,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_key_is_per_brand_and_target() {
        let brand_id = Uuid::now_v7();
        let a = ScrapeBrandJob {
            brand_id,
            target_url: "https://a.example".into(),
        };
        let b = ScrapeBrandJob {
            brand_id,
            target_url: "https://b.example".into(),
        };
        assert_ne!(a.idempotency_key(), b.idempotency_key());
    }
}
