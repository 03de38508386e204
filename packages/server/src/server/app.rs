//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::domains::{brands, content, pipeline, scraping};
use crate::kernel::jobs::{JobRegistry, JobRunner, JobRunnerHandle};
use crate::kernel::ServerDeps;
use crate::server::routes::{self, AppState};

/// All job handlers known to this deployment.
pub fn build_registry() -> JobRegistry {
    JobRegistry::new()
        .register::<brands::AssimilateBrandJob, _, _>(brands::assimilate_brand)
        .register::<content::GenerateIdeasJob, _, _>(content::generate_ideas)
        .register::<content::GenerateVideoJob, _, _>(content::generate_video)
        .register::<scraping::ScrapeBrandJob, _, _>(scraping::scrape_brand)
        .register::<pipeline::RunPipelineJob, _, _>(pipeline::run_pipeline)
}

/// Router over already-built dependencies. Split from `build_app` so tests
/// can mount the same routes over mocked deps.
pub fn build_router(deps: Arc<ServerDeps>) -> Router {
    let state = AppState { deps };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    // 10 req/sec per client IP with bursts of 20; health stays unlimited.
    // SmartIpKeyExtractor reads x-forwarded-for / x-real-ip before falling
    // back to the socket peer, so the limiter works behind a proxy.
    let rate_limit_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .use_headers()
            .finish()
            .expect("rate limiter configuration is valid and should never fail"),
    );
    let rate_limit = GovernorLayer {
        config: rate_limit_config,
    };

    let api = Router::new()
        .route("/brands/assimilate", post(routes::brands::assimilate_brand))
        .route("/brands", get(routes::brands::list_brands))
        .route(
            "/brands/:brand_id/kit",
            get(routes::brands::get_brand_kit).put(routes::brands::update_brand_kit),
        )
        .route("/content/ideas", post(routes::content::generate_ideas))
        .route("/content/videos", post(routes::content::create_video))
        .route("/jobs/:job_id/status", get(routes::jobs::job_status))
        .route("/scraping/brand", post(routes::scraping::start_brand_scrape))
        .route(
            "/scraping/jobs/:job_id",
            get(routes::scraping::get_scraping_job),
        )
        .route(
            "/scraping/jobs/:job_id/retry",
            post(routes::scraping::retry_scraping_job),
        )
        .route("/pipeline/analyze-brand", post(routes::pipeline::analyze_brand))
        .route(
            "/pipeline/generate-content-ideas",
            post(routes::pipeline::generate_content_ideas),
        )
        .route(
            "/pipeline/create-video-outlines",
            post(routes::pipeline::create_video_outlines),
        )
        .route(
            "/pipeline/generate-production-guide",
            post(routes::pipeline::generate_production_guide),
        )
        .route("/pipeline/optimize-seo", post(routes::pipeline::optimize_seo))
        .route("/pipeline/full-pipeline", post(routes::pipeline::full_pipeline))
        .route("/pipeline/dispatch", post(routes::pipeline::dispatch_pipeline))
        .layer(rate_limit);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health::health_handler))
        // Sync pipeline routes chain several LLM calls; give them room.
        .layer(TimeoutLayer::new(Duration::from_secs(120)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the full application: dependencies, background job runner, router.
pub fn build_app(config: &Config, pool: PgPool) -> Result<(Router, JobRunnerHandle)> {
    let deps = ServerDeps::from_config(config, pool)?;

    let runner = JobRunner::new(build_registry(), deps.clone(), config);
    let runner_handle = runner.spawn();

    Ok((build_router(deps), runner_handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_all_job_types() {
        let registry = build_registry();
        assert!(registry.contains("assimilate_brand"));
        assert!(registry.contains("generate_ideas"));
        assert!(registry.contains("generate_video"));
        assert!(registry.contains("scrape_brand"));
        assert!(registry.contains("run_pipeline"));
        assert_eq!(registry.len(), 5);
    }
}
