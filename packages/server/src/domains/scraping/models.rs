//! Scrape bookkeeping and the product catalog.
//!
//! A scraping job's lifecycle state lives on its `jobs` row; `ScrapingJob`
//! only carries scrape-specific counters keyed by the same client token.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::db_id;
use crate::kernel::scraper::ScrapedProduct;

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct ScrapingJob {
    #[builder(default = db_id())]
    pub id: Uuid,
    /// Token of the backing jobs row.
    pub job_id: String,
    pub brand_id: Uuid,
    pub target_url: String,

    #[builder(default = 0)]
    pub products_found: i32,
    #[builder(default = 0)]
    pub products_created: i32,
    #[builder(default = 0)]
    pub pages_scraped: i32,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

const SCRAPING_JOB_COLUMNS: &str = "id, job_id, brand_id, target_url, products_found, \
     products_created, pages_scraped, created_at, updated_at";

impl ScrapingJob {
    pub async fn insert(&self, db: &PgPool) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(&format!(
            "INSERT INTO scraping_jobs ( \
                 id, job_id, brand_id, target_url, products_found, products_created, \
                 pages_scraped, created_at, updated_at \
             ) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {SCRAPING_JOB_COLUMNS}"
        ))
        .bind(self.id)
        .bind(&self.job_id)
        .bind(self.brand_id)
        .bind(&self.target_url)
        .bind(self.products_found)
        .bind(self.products_created)
        .bind(self.pages_scraped)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(db)
        .await?;

        Ok(row)
    }

    pub async fn find_by_job_id(job_id: &str, db: &PgPool) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(&format!(
            "SELECT {SCRAPING_JOB_COLUMNS} FROM scraping_jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(db)
        .await?;

        Ok(row)
    }

    pub async fn update_counters(
        &self,
        products_found: i32,
        products_created: i32,
        pages_scraped: i32,
        db: &PgPool,
    ) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(&format!(
            "UPDATE scraping_jobs \
             SET products_found = $2, products_created = $3, pages_scraped = $4, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {SCRAPING_JOB_COLUMNS}"
        ))
        .bind(self.id)
        .bind(products_found)
        .bind(products_created)
        .bind(pages_scraped)
        .fetch_one(db)
        .await?;

        Ok(row)
    }
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Product {
    #[builder(default = db_id())]
    pub id: Uuid,
    pub brand_id: Uuid,

    pub name: String,
    #[builder(default, setter(strip_option))]
    pub description: Option<String>,
    #[builder(default, setter(strip_option))]
    pub price: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub currency: Option<String>,
    pub source_url: String,
    #[builder(default = serde_json::json!([]))]
    pub image_urls: serde_json::Value,
    #[builder(default = true)]
    pub available: bool,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn from_scraped(brand_id: Uuid, scraped: &ScrapedProduct) -> Self {
        Self {
            id: db_id(),
            brand_id,
            name: scraped.name.clone(),
            description: scraped.description.clone(),
            price: scraped.price,
            currency: scraped.currency.clone(),
            source_url: scraped.source_url.clone(),
            image_urls: serde_json::json!(scraped.image_urls),
            available: scraped.available,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Insert or refresh by (brand, source URL). Returns true when a new
    /// row was created, so rescrapes count creations correctly.
    pub async fn upsert(&self, db: &PgPool) -> Result<bool> {
        let (inserted,): (bool,) = sqlx::query_as(
            "INSERT INTO products ( \
                 id, brand_id, name, description, price, currency, source_url, \
                 image_urls, available, created_at, updated_at \
             ) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (brand_id, source_url) DO UPDATE \
             SET name = EXCLUDED.name, \
                 description = COALESCE(EXCLUDED.description, products.description), \
                 price = COALESCE(EXCLUDED.price, products.price), \
                 currency = COALESCE(EXCLUDED.currency, products.currency), \
                 image_urls = EXCLUDED.image_urls, \
                 available = EXCLUDED.available, \
                 updated_at = NOW() \
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(self.id)
        .bind(self.brand_id)
        .bind(&self.name)
        .bind(&self.description)
        .bind(self.price)
        .bind(&self.currency)
        .bind(&self.source_url)
        .bind(&self.image_urls)
        .bind(self.available)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(db)
        .await?;

        Ok(inserted)
    }

    pub async fn list_for_brand(brand_id: Uuid, db: &PgPool) -> Result<Vec<Self>> {
        let products = sqlx::query_as::<_, Self>(
            "SELECT id, brand_id, name, description, price, currency, source_url, \
                    image_urls, available, created_at, updated_at \
             FROM products WHERE brand_id = $1 ORDER BY name",
        )
        .bind(brand_id)
        .fetch_all(db)
        .await?;

        Ok(products)
    }

    pub async fn count_for_brand(brand_id: Uuid, db: &PgPool) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM products WHERE brand_id = $1")
                .bind(brand_id)
                .fetch_one(db)
                .await?;

        Ok(count)
    }
}
