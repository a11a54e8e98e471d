// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /posts (shape, image rewriting, offset/limit, graceful degradation)
// - GET /posts error payload on a dead source
// - GET /proxy-image parameter and allow-list rejections

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use tg_channel_feed::api::{create_router, AppState};
use tg_channel_feed::PreviewSource;

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

const PREVIEW_HTML: &str = include_str!("fixtures/channel_preview.html");

/// Serves the fixture page once, then an empty (exhausted) page.
struct FixtureSource {
    calls: AtomicUsize,
}

#[async_trait]
impl PreviewSource for FixtureSource {
    async fn fetch_page(&self, _before: Option<u64>) -> Result<String> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(PREVIEW_HTML.to_string())
        } else {
            Ok(String::new())
        }
    }
}

struct DeadSource;

#[async_trait]
impl PreviewSource for DeadSource {
    async fn fetch_page(&self, _before: Option<u64>) -> Result<String> {
        Err(anyhow!("dns failure"))
    }
}

/// Build the router the way the binary does, with no store and no mailer
/// configured — the degraded-but-serving configuration.
fn test_router() -> Router {
    let state = AppState::new(Arc::new(FixtureSource {
        calls: AtomicUsize::new(0),
    }))
    .with_site_base_url("https://site.example/");
    create_router(state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json: Json = serde_json::from_slice(&bytes).expect("response must be valid JSON");
    (status, json)
}

#[tokio::test]
async fn health_returns_200() {
    let app = test_router();
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn posts_listing_serves_rewritten_sorted_posts_without_collaborators() {
    let (status, json) = get_json(test_router(), "/posts").await;
    assert_eq!(status, StatusCode::OK);

    let posts = json["posts"].as_array().expect("posts array");
    assert_eq!(posts.len(), 3);
    assert_eq!(json["hasMore"], Json::Bool(false));

    // newest first
    let ids: Vec<u64> = posts.iter().map(|p| p["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![104, 102, 101]);

    // CDN references must leave the payload proxied
    let image_url = posts[0]["imageUrl"].as_str().unwrap();
    assert!(image_url.starts_with("/proxy-image?url="));
    for img in posts[0]["images"].as_array().unwrap() {
        assert!(img.as_str().unwrap().starts_with("/proxy-image?url="));
    }

    assert!(posts[0]["timestamp"].is_number());
    assert_eq!(posts[1]["title"], "Short headline");
    assert_eq!(posts[1]["titleLocalized"], posts[1]["title"]);
    assert_eq!(posts[0]["sourceUrl"], "https://t.me/acmestudio/104");
}

#[tokio::test]
async fn posts_listing_honors_offset_and_limit() {
    let (status, json) = get_json(test_router(), "/posts?offset=1&limit=2").await;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<u64> = json["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![102, 101]);
    assert_eq!(json["hasMore"], Json::Bool(false));
}

#[tokio::test]
async fn dead_source_yields_structured_500() {
    let app = create_router(AppState::new(Arc::new(DeadSource)));
    let (status, json) = get_json(app, "/posts").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("first preview page"));
    assert_eq!(json["posts"], Json::Array(vec![]));
    assert_eq!(json["hasMore"], Json::Bool(false));
}

#[tokio::test]
async fn proxy_image_requires_a_url() {
    let app = test_router();
    let req = Request::builder()
        .uri("/proxy-image")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proxy_image_rejects_foreign_hosts() {
    let app = test_router();
    let req = Request::builder()
        .uri("/proxy-image?url=https%3A%2F%2Fexample.com%2Fx.jpg")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
