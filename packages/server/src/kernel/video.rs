//! Video rendering provider.
//!
//! The generation pipeline produces an outline and production guide; actual
//! rendering is delegated to an external provider behind `VideoProvider` so
//! deployments without a provider configured still run everything else.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::jobs::JobFailure;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video rendering is not configured")]
    Disabled,
    #[error("video provider request failed: {0}")]
    Network(String),
    #[error("video provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("could not parse video provider response: {0}")]
    Parse(String),
}

impl VideoError {
    pub fn is_transient(&self) -> bool {
        match self {
            VideoError::Network(_) => true,
            VideoError::Api { status, .. } => *status >= 500 || *status == 429,
            VideoError::Disabled | VideoError::Parse(_) => false,
        }
    }
}

impl From<VideoError> for JobFailure {
    fn from(e: VideoError) -> Self {
        if e.is_transient() {
            JobFailure::retryable(e.to_string())
        } else {
            JobFailure::terminal(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderRequest {
    pub title: String,
    /// Scene-by-scene script, already flattened to provider format.
    pub script: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderedVideo {
    pub video_url: String,
    pub duration_seconds: Option<f64>,
    /// Provider-side identifier, kept for support lookups.
    pub provider_id: Option<String>,
}

#[async_trait]
pub trait VideoProvider: Send + Sync {
    async fn render(&self, request: RenderRequest) -> Result<RenderedVideo, VideoError>;
}

/// HTTP provider speaking a simple JSON render API.
pub struct HttpVideoProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpVideoProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl VideoProvider for HttpVideoProvider {
    async fn render(&self, request: RenderRequest) -> Result<RenderedVideo, VideoError> {
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(format!("{}/v1/renders", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "video render request failed");
                VideoError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %message, "video provider error");
            return Err(VideoError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let rendered: RenderedVideo = response
            .json()
            .await
            .map_err(|e| VideoError::Parse(e.to_string()))?;

        debug!(
            video_url = %rendered.video_url,
            duration_ms = start.elapsed().as_millis(),
            "video rendered"
        );

        Ok(rendered)
    }
}

/// Stand-in when no provider is configured. Render jobs fail terminally
/// instead of burning their retry budget.
pub struct DisabledVideoProvider;

#[async_trait]
impl VideoProvider for DisabledVideoProvider {
    async fn render(&self, _request: RenderRequest) -> Result<RenderedVideo, VideoError> {
        Err(VideoError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transience_classification() {
        assert!(VideoError::Network("reset".into()).is_transient());
        assert!(VideoError::Api {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(VideoError::Api {
            status: 429,
            message: String::new()
        }
        .is_transient());
        assert!(!VideoError::Api {
            status: 422,
            message: String::new()
        }
        .is_transient());
        assert!(!VideoError::Disabled.is_transient());
    }

    #[tokio::test]
    async fn disabled_provider_fails_terminally() {
        let provider = DisabledVideoProvider;
        let err = provider
            .render(RenderRequest {
                title: "t".into(),
                script: "s".into(),
                aspect_ratio: "9:16".into(),
            })
            .await
            .unwrap_err();
        let failure = JobFailure::from(err);
        assert!(!failure.should_retry());
    }
}
