//! Dependency container threaded through handlers and job workers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use openai_client::OpenAIClient;
use sqlx::PgPool;
use tracing::warn;

use crate::config::Config;

use super::jobs::{JobQueue, PostgresJobQueue, RetryPolicy};
use super::scraper::{BrandScraper, SiteScraper};
use super::video::{DisabledVideoProvider, HttpVideoProvider, VideoProvider};

/// Shared server dependencies. Built once at startup, cloned as an Arc into
/// every handler and job execution.
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub ai: Arc<OpenAIClient>,
    pub scraper: Arc<dyn BrandScraper>,
    pub video: Arc<dyn VideoProvider>,
    pub jobs: Arc<dyn JobQueue>,
}

impl ServerDeps {
    pub fn from_config(config: &Config, db_pool: PgPool) -> Result<Arc<Self>> {
        let ai = Arc::new(OpenAIClient::with_timeout(
            config.openai_api_key.clone(),
            Duration::from_secs(config.openai_timeout_secs),
        ));

        let scraper: Arc<dyn BrandScraper> =
            Arc::new(SiteScraper::new(config.scrape_timeout_secs)?);

        let video: Arc<dyn VideoProvider> = match (&config.video_api_url, &config.video_api_key) {
            (Some(url), Some(key)) => Arc::new(HttpVideoProvider::new(
                url.clone(),
                key.clone(),
                config.video_timeout_secs,
            )),
            _ => {
                warn!("VIDEO_API_URL not set, video rendering disabled");
                Arc::new(DisabledVideoProvider)
            }
        };

        let jobs: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(
            db_pool.clone(),
            RetryPolicy::from_config(config),
        ));

        Ok(Arc::new(Self {
            db_pool,
            ai,
            scraper,
            video,
            jobs,
        }))
    }
}
