//! Database fixtures and request helpers for integration tests.

use axum::body::Body;
use axum::http::{header, Request};
use serde_json::Value;
use sqlx::PgPool;

use server_core::domains::brands::Brand;

/// Insert a brand owned by `owner_token`.
pub async fn create_brand(db: &PgPool, owner_token: &str, name: &str) -> Brand {
    Brand::builder()
        .owner_token(owner_token)
        .name(name)
        .website_url("https://acme.test")
        .build()
        .insert(db)
        .await
        .expect("failed to insert fixture brand")
}

/// JSON request with a bearer token. The forwarded-for header keys the rate
/// limiter; using the owner token as the client IP bucket keeps tests from
/// throttling each other.
pub fn authed_request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("x-forwarded-for", fake_ip(token))
        .header(header::CONTENT_TYPE, "application/json");

    match body {
        Some(value) => builder
            .body(Body::from(value.to_string()))
            .expect("failed to build request"),
        None => builder.body(Body::empty()).expect("failed to build request"),
    }
}

/// Request without an Authorization header.
pub fn anon_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::empty())
        .expect("failed to build request")
}

fn fake_ip(seed: &str) -> String {
    let octet = seed.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
    format!("10.0.0.{octet}")
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body is not valid JSON")
}
