// src/api.rs
//
// Public HTTP surface: the post listing and the image proxy. All failures
// below this layer degrade the payload instead of raising; the only caller-
// visible error is a first-page fetch failure, returned as a structured 500.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::extract::Post;
use crate::feed::{self, PreviewSource, DEFAULT_LIMIT, MAX_LIMIT};
use crate::imageproxy;
use crate::notify::{self, Mailer, NotificationStore};

const PROXY_FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const PROXY_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn PreviewSource>,
    pub store: Option<Arc<dyn NotificationStore>>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub site_base_url: String,
    proxy_client: reqwest::Client,
}

impl AppState {
    pub fn new(source: Arc<dyn PreviewSource>) -> Self {
        Self {
            source,
            store: None,
            mailer: None,
            site_base_url: String::new(),
            proxy_client: reqwest::Client::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn NotificationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_site_base_url(mut self, url: impl Into<String>) -> Self {
        self.site_base_url = url.into();
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/posts", get(list_posts))
        .route("/proxy-image", get(proxy_image))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct PostsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PostsResponse {
    posts: Vec<Post>,
    has_more: bool,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PostsError {
    error: String,
    posts: Vec<Post>,
    has_more: bool,
}

async fn list_posts(State(state): State<AppState>, Query(q): Query<PostsQuery>) -> Response {
    let limit = q
        .limit
        .unwrap_or(DEFAULT_LIMIT as i64)
        .clamp(1, MAX_LIMIT as i64) as usize;
    let offset = q.offset.unwrap_or(0).max(0) as usize;

    let slice = match feed::collect(state.source.as_ref(), offset, limit).await {
        Ok(slice) => slice,
        Err(err) => {
            tracing::error!(error = ?err, "post listing failed");
            let payload = PostsError {
                error: format!("{err:#}"),
                posts: Vec::new(),
                has_more: false,
            };
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response();
        }
    };

    // Only the freshest page can reveal never-before-seen posts. The gate is
    // detached: the response must not wait on subscriber delivery.
    if offset == 0 {
        if let (Some(store), Some(mailer)) = (state.store.clone(), state.mailer.clone()) {
            tokio::spawn(notify::announce_new_posts(
                store,
                mailer,
                state.site_base_url.clone(),
                slice.posts.clone(),
            ));
        }
    }

    let mut posts = slice.posts;
    for post in &mut posts {
        imageproxy::rewrite_post_images(post);
    }
    Json(PostsResponse {
        posts,
        has_more: slice.has_more,
    })
    .into_response()
}

#[derive(serde::Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

async fn proxy_image(State(state): State<AppState>, Query(q): Query<ProxyQuery>) -> Response {
    let Some(url) = q.url.filter(|u| !u.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing url parameter").into_response();
    };
    if !imageproxy::is_allowed_image_host(&url) {
        return (StatusCode::FORBIDDEN, "image host not allowed").into_response();
    }

    let resp = match state
        .proxy_client
        .get(&url)
        .timeout(PROXY_FETCH_TIMEOUT)
        .send()
        .await
        .and_then(|r| r.error_for_status())
    {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!(error = ?err, url = %url, "image proxy fetch failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "image fetch failed").into_response();
        }
    };

    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = match resp.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = ?err, url = %url, "image proxy body read failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "image fetch failed").into_response();
        }
    };

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, PROXY_CACHE_CONTROL.to_string()),
        ],
        bytes,
    )
        .into_response()
}
