//! REST route handlers, grouped by domain.

pub mod brands;
pub mod content;
pub mod health;
pub mod jobs;
pub mod pipeline;
pub mod scraping;

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::Serialize;

use crate::kernel::ServerDeps;
use crate::server::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
}

/// Body for every 202 Accepted response that hands back a job token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: String,
    pub message: String,
}

/// The bearer value is treated as an opaque owner identifier; brands are
/// scoped to it. Token issuance and verification live outside this service.
pub(crate) fn owner_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn owner_token_parses_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc-123"));
        assert_eq!(owner_token(&headers).unwrap(), "abc-123");
    }

    #[test]
    fn owner_token_rejects_missing_or_malformed() {
        assert!(owner_token(&HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(owner_token(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(owner_token(&headers).is_err());
    }
}
