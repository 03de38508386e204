use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub openai_api_key: String,
    /// Timeout for OpenAI calls, seconds
    pub openai_timeout_secs: u64,
    /// Video generation provider endpoint (None disables video generation)
    pub video_api_url: Option<String>,
    pub video_api_key: Option<String>,
    /// Timeout for video provider calls, seconds
    pub video_timeout_secs: u64,
    /// Timeout for a single scraped page fetch, seconds
    pub scrape_timeout_secs: u64,
    /// Default retry budget for jobs that don't override it
    pub default_max_retries: i32,
    /// Base delay for exponential retry backoff, seconds
    pub retry_base_delay_secs: i64,
    /// Cap on the retry backoff delay, seconds
    pub retry_max_delay_secs: i64,
    /// Pending jobs older than this are swept to failed (never picked up)
    pub stale_pending_minutes: i64,
    /// Jobs older than this are purged regardless of status
    pub job_retention_days: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            openai_timeout_secs: parse_or("OPENAI_TIMEOUT_SECS", 60)?,
            video_api_url: env::var("VIDEO_API_URL").ok(),
            video_api_key: env::var("VIDEO_API_KEY").ok(),
            video_timeout_secs: parse_or("VIDEO_TIMEOUT_SECS", 120)?,
            scrape_timeout_secs: parse_or("SCRAPE_TIMEOUT_SECS", 30)?,
            default_max_retries: parse_or("JOB_MAX_RETRIES", 3)?,
            retry_base_delay_secs: parse_or("JOB_RETRY_BASE_DELAY_SECS", 2)?,
            retry_max_delay_secs: parse_or("JOB_RETRY_MAX_DELAY_SECS", 300)?,
            stale_pending_minutes: parse_or("JOB_STALE_PENDING_MINUTES", 30)?,
            job_retention_days: parse_or("JOB_RETENTION_DAYS", 30)?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{} must be a valid number", var)),
        Err(_) => Ok(default),
    }
}
