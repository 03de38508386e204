//! End-to-end scraping flow: HTTP kickoff, background execution, status
//! reads, and manual retries.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use test_context::test_context;
use tower::ServiceExt;

use common::{authed_request, create_brand, response_json, TestHarness};
use server_core::domains::scraping::Product;
use server_core::kernel::jobs::{JobFailure, JobQueue, JobRunner, RetryPolicy};
use server_core::kernel::testing::{test_config, FailingScraper};
use server_core::server::{build_registry, build_router};

#[test_context(TestHarness)]
#[tokio::test]
async fn scrape_flow_runs_end_to_end(ctx: &TestHarness) {
    let deps = ctx.deps();
    let router = build_router(deps.clone());
    let runner = JobRunner::new(build_registry(), deps.clone(), &test_config());
    let brand = create_brand(&ctx.db_pool, "owner-1", "Acme Goods").await;

    let scrape_body = json!({ "brandId": brand.id, "targetUrl": "https://acme.test" });
    let response = router
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/scraping/brand",
            "owner-1",
            Some(scrape_body.clone()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = response_json(response).await;
    let token = body["jobId"].as_str().unwrap().to_string();
    assert_eq!(body["message"], "brand scrape started");

    // Same brand and target while the job is live: no second job.
    let response = router
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/scraping/brand",
            "owner-1",
            Some(scrape_body.clone()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = response_json(response).await;
    assert_eq!(body["jobId"], token.as_str());
    assert_eq!(body["message"], "brand scrape already in progress");

    assert_eq!(runner.run_once().await, 1);

    let response = router
        .clone()
        .oneshot(authed_request(
            "GET",
            &format!("/api/v1/scraping/jobs/{token}"),
            "owner-1",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = response_json(response).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["progress"], 100);
    assert_eq!(status["productsFound"], 2);
    assert_eq!(status["productsCreated"], 2);
    assert_eq!(status["pagesScraped"], 2);
    assert!(status["error"].is_null());

    assert_eq!(Product::count_for_brand(brand.id, &ctx.db_pool).await.unwrap(), 2);

    // Rescraping after completion creates a fresh job, and the URL-keyed
    // upserts count zero new products.
    let response = router
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/scraping/brand",
            "owner-1",
            Some(scrape_body),
        ))
        .await
        .unwrap();
    let body = response_json(response).await;
    let second_token = body["jobId"].as_str().unwrap().to_string();
    assert_ne!(second_token, token);

    assert_eq!(runner.run_once().await, 1);

    let response = router
        .oneshot(authed_request(
            "GET",
            &format!("/api/v1/scraping/jobs/{second_token}"),
            "owner-1",
            None,
        ))
        .await
        .unwrap();
    let status = response_json(response).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["productsFound"], 2);
    assert_eq!(status["productsCreated"], 0);
    assert_eq!(Product::count_for_brand(brand.id, &ctx.db_pool).await.unwrap(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn scraping_jobs_are_hidden_from_other_owners(ctx: &TestHarness) {
    let deps = ctx.deps();
    let router = build_router(deps);
    let brand = create_brand(&ctx.db_pool, "owner-1", "Acme Goods").await;

    let response = router
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/v1/scraping/jobs/no-such-job",
            "owner-1",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/scraping/brand",
            "owner-1",
            Some(json!({ "brandId": brand.id, "targetUrl": "https://acme.test" })),
        ))
        .await
        .unwrap();
    let token = response_json(response).await["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    for uri in [
        format!("/api/v1/scraping/jobs/{token}"),
        format!("/api/v1/scraping/jobs/{token}/retry"),
    ] {
        let method = if uri.ends_with("/retry") { "POST" } else { "GET" };
        let response = router
            .clone()
            .oneshot(authed_request(method, &uri, "owner-2", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = response_json(response).await;
        assert_eq!(body["error"], "forbidden");
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn failed_scrape_can_be_retried_manually(ctx: &TestHarness) {
    let queue = ctx.queue();
    let deps = ctx.deps_with(
        Arc::new(server_core::kernel::testing::MockScraper::default()),
        queue.clone(),
    );
    let router = build_router(deps);
    let brand = create_brand(&ctx.db_pool, "owner-1", "Acme Goods").await;

    let response = router
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/scraping/brand",
            "owner-1",
            Some(json!({ "brandId": brand.id, "targetUrl": "https://acme.test" })),
        ))
        .await
        .unwrap();
    let token = response_json(response).await["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    // Fail the attempt terminally so the job lands in failed with budget left.
    let claimed = queue.claim("worker-test", 1).await.unwrap();
    queue
        .mark_failed(claimed[0].id(), &JobFailure::terminal("robots.txt forbids scraping"))
        .await
        .unwrap();

    let retry_uri = format!("/api/v1/scraping/jobs/{token}/retry");
    let response = router
        .clone()
        .oneshot(authed_request("POST", &retry_uri, "owner-1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["retryCount"], 1);
    assert_eq!(body["message"], "scrape retry scheduled");

    let response = router
        .clone()
        .oneshot(authed_request(
            "GET",
            &format!("/api/v1/scraping/jobs/{token}"),
            "owner-1",
            None,
        ))
        .await
        .unwrap();
    let status = response_json(response).await;
    assert_eq!(status["status"], "pending");
    assert!(status["error"].is_null());

    // A second retry while the job is pending is rejected.
    let response = router
        .oneshot(authed_request("POST", &retry_uri, "owner-1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], "bad_request");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn scrape_retries_stop_once_the_budget_is_spent(ctx: &TestHarness) {
    let queue = ctx.queue_with_policy(RetryPolicy {
        base_delay_secs: 0,
        max_delay_secs: 0,
        default_max_retries: 1,
    });
    let deps = ctx.deps_with(Arc::new(FailingScraper { status: 503 }), queue);
    let router = build_router(deps.clone());
    let runner = JobRunner::new(build_registry(), deps, &test_config());
    let brand = create_brand(&ctx.db_pool, "owner-1", "Acme Goods").await;

    let response = router
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/v1/scraping/brand",
            "owner-1",
            Some(json!({ "brandId": brand.id, "targetUrl": "https://acme.test" })),
        ))
        .await
        .unwrap();
    let token = response_json(response).await["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    // First attempt fails and reschedules, second spends the budget.
    assert_eq!(runner.run_once().await, 1);
    assert_eq!(runner.run_once().await, 1);

    let response = router
        .clone()
        .oneshot(authed_request(
            "GET",
            &format!("/api/v1/scraping/jobs/{token}"),
            "owner-1",
            None,
        ))
        .await
        .unwrap();
    let status = response_json(response).await;
    assert_eq!(status["status"], "failed");
    assert_eq!(status["retryCount"], 1);
    assert_eq!(status["maxRetries"], 1);
    assert!(status["error"].is_string());

    let response = router
        .oneshot(authed_request(
            "POST",
            &format!("/api/v1/scraping/jobs/{token}/retry"),
            "owner-1",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("retry budget exhausted"));
}
