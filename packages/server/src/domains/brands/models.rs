//! Brand and asset persistence.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::db_id;

/// A brand owned by an API client. The owner token is the opaque bearer
/// value presented at creation; all brand access is scoped to it.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Brand {
    #[builder(default = db_id())]
    pub id: Uuid,
    /// Never serialized into API responses.
    #[serde(skip_serializing)]
    pub owner_token: String,

    pub name: String,
    #[builder(default, setter(strip_option))]
    pub description: Option<String>,
    #[builder(default, setter(strip_option))]
    pub website_url: Option<String>,
    #[builder(default, setter(strip_option))]
    pub logo_url: Option<String>,

    // Brand kit
    #[builder(default, setter(strip_option))]
    pub colors: Option<serde_json::Value>,
    #[builder(default, setter(strip_option))]
    pub voice: Option<serde_json::Value>,
    #[builder(default, setter(strip_option))]
    pub pillars: Option<serde_json::Value>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

const BRAND_COLUMNS: &str = "id, owner_token, name, description, website_url, logo_url, \
     colors, voice, pillars, created_at, updated_at";

impl Brand {
    pub async fn insert(&self, db: &PgPool) -> Result<Self> {
        let brand = sqlx::query_as::<_, Self>(&format!(
            "INSERT INTO brands ( \
                 id, owner_token, name, description, website_url, logo_url, \
                 colors, voice, pillars, created_at, updated_at \
             ) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {BRAND_COLUMNS}"
        ))
        .bind(self.id)
        .bind(&self.owner_token)
        .bind(&self.name)
        .bind(&self.description)
        .bind(&self.website_url)
        .bind(&self.logo_url)
        .bind(&self.colors)
        .bind(&self.voice)
        .bind(&self.pillars)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(db)
        .await?;

        Ok(brand)
    }

    pub async fn find_by_id(id: Uuid, db: &PgPool) -> Result<Option<Self>> {
        let brand = sqlx::query_as::<_, Self>(&format!(
            "SELECT {BRAND_COLUMNS} FROM brands WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;

        Ok(brand)
    }

    /// Find a brand only if the caller owns it.
    pub async fn find_for_owner(id: Uuid, owner_token: &str, db: &PgPool) -> Result<Option<Self>> {
        let brand = sqlx::query_as::<_, Self>(&format!(
            "SELECT {BRAND_COLUMNS} FROM brands WHERE id = $1 AND owner_token = $2"
        ))
        .bind(id)
        .bind(owner_token)
        .fetch_optional(db)
        .await?;

        Ok(brand)
    }

    pub async fn list_for_owner(owner_token: &str, db: &PgPool) -> Result<Vec<Self>> {
        let brands = sqlx::query_as::<_, Self>(&format!(
            "SELECT {BRAND_COLUMNS} FROM brands WHERE owner_token = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_token)
        .fetch_all(db)
        .await?;

        Ok(brands)
    }

    /// Overwrite kit fields that are present in the update; absent fields
    /// keep their current value.
    pub async fn update_kit(&self, update: &BrandKitUpdate, db: &PgPool) -> Result<Self> {
        let brand = sqlx::query_as::<_, Self>(&format!(
            "UPDATE brands \
             SET colors = COALESCE($2, colors), \
                 voice = COALESCE($3, voice), \
                 pillars = COALESCE($4, pillars), \
                 logo_url = COALESCE($5, logo_url), \
                 description = COALESCE($6, description), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {BRAND_COLUMNS}"
        ))
        .bind(self.id)
        .bind(&update.colors)
        .bind(&update.voice)
        .bind(&update.pillars)
        .bind(&update.logo_url)
        .bind(&update.description)
        .fetch_one(db)
        .await?;

        Ok(brand)
    }

    pub fn kit(&self) -> BrandKit {
        BrandKit {
            name: self.name.clone(),
            description: self.description.clone(),
            logo_url: self.logo_url.clone(),
            colors: self.colors.clone(),
            voice: self.voice.clone(),
            pillars: self.pillars.clone(),
        }
    }

    /// Compact textual identity for prompt construction.
    pub fn prompt_summary(&self) -> String {
        let mut parts = vec![format!("Brand: {}", self.name)];
        if let Some(description) = &self.description {
            parts.push(format!("Description: {description}"));
        }
        if let Some(voice) = &self.voice {
            parts.push(format!("Voice: {voice}"));
        }
        if let Some(pillars) = &self.pillars {
            parts.push(format!("Content pillars: {pillars}"));
        }
        parts.join("\n")
    }
}

/// The client-facing brand kit view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandKit {
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub colors: Option<serde_json::Value>,
    pub voice: Option<serde_json::Value>,
    pub pillars: Option<serde_json::Value>,
}

/// Partial kit update. `None` means "leave unchanged".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandKitUpdate {
    pub colors: Option<serde_json::Value>,
    pub voice: Option<serde_json::Value>,
    pub pillars: Option<serde_json::Value>,
    pub logo_url: Option<String>,
    pub description: Option<String>,
}

/// A media asset attached to a brand (logo, product imagery).
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Asset {
    #[builder(default = db_id())]
    pub id: Uuid,
    pub brand_id: Uuid,
    pub kind: String,
    pub url: String,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Insert unless the brand already has this exact asset.
    pub async fn insert_unique(&self, db: &PgPool) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO assets (id, brand_id, kind, url, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (brand_id, kind, url) DO NOTHING",
        )
        .bind(self.id)
        .bind(self.brand_id)
        .bind(&self.kind)
        .bind(&self.url)
        .bind(self.created_at)
        .execute(db)
        .await?
        .rows_affected();

        Ok(inserted > 0)
    }

    pub async fn list_for_brand(brand_id: Uuid, db: &PgPool) -> Result<Vec<Self>> {
        let assets = sqlx::query_as::<_, Self>(
            "SELECT id, brand_id, kind, url, created_at \
             FROM assets WHERE brand_id = $1 ORDER BY created_at",
        )
        .bind(brand_id)
        .fetch_all(db)
        .await?;

        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_summary_includes_available_fields() {
        let brand = Brand::builder()
            .owner_token("tok")
            .name("Acme Goods")
            .description("Hand-poured soy candles")
            .pillars(serde_json::json!(["sustainability", "craft"]))
            .build();

        let summary = brand.prompt_summary();
        assert!(summary.contains("Brand: Acme Goods"));
        assert!(summary.contains("Hand-poured soy candles"));
        assert!(summary.contains("sustainability"));
        assert!(!summary.contains("Voice:"));
    }

    #[test]
    fn kit_mirrors_brand_fields() {
        let brand = Brand::builder()
            .owner_token("tok")
            .name("Acme")
            .colors(serde_json::json!(["#fff"]))
            .build();

        let kit = brand.kit();
        assert_eq!(kit.name, "Acme");
        assert_eq!(kit.colors, Some(serde_json::json!(["#fff"])));
        assert!(kit.voice.is_none());
    }
}
