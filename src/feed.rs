// src/feed.rs
//
// Backward pagination over a channel's preview pages plus the in-memory
// merge/sort/slice stage. The channel is an append-only timeline owned by
// the external source; nothing here is persisted, every request recomputes
// its view from scratch.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;

use crate::extract::{extract, Post};

/// Hard cap on page fetches per request. Bounds worst-case cost against a
/// pathological or hostile source that never exhausts.
pub const PAGE_FETCH_CAP: usize = 25;

pub const MAX_LIMIT: usize = 50;
pub const DEFAULT_LIMIT: usize = 10;

const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One page of raw preview HTML, optionally older than a given message id.
#[async_trait]
pub trait PreviewSource: Send + Sync {
    async fn fetch_page(&self, before: Option<u64>) -> Result<String>;
}

/// Live source: `https://t.me/s/<channel>`, `?before=<id>` for older pages.
pub struct HttpPreviewSource {
    channel: String,
    client: reqwest::Client,
}

impl HttpPreviewSource {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PreviewSource for HttpPreviewSource {
    async fn fetch_page(&self, before: Option<u64>) -> Result<String> {
        let url = format!("https://t.me/s/{}", self.channel);
        let mut req = self.client.get(&url).timeout(PAGE_FETCH_TIMEOUT);
        if let Some(id) = before {
            req = req.query(&[("before", id.to_string())]);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("fetching preview page for '{}'", self.channel))?
            .error_for_status()
            .with_context(|| format!("preview page for '{}' returned an error", self.channel))?;
        resp.text().await.context("reading preview page body")
    }
}

/// The answer to one "list posts" request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSlice {
    pub posts: Vec<Post>,
    pub has_more: bool,
}

/// Walk backward through preview pages until the request can be answered or
/// the source is exhausted, then merge, sort and slice.
///
/// Pages overlap at cursor boundaries; the id-keyed accumulator keeps one
/// copy per post (last seen wins, content is immutable per id in practice).
/// A fetch failure on the very first page is the caller's problem; any later
/// failure just stops accumulation and serves what was gathered.
pub async fn collect(source: &dyn PreviewSource, offset: usize, limit: usize) -> Result<FeedSlice> {
    let limit = limit.clamp(1, MAX_LIMIT);

    let mut seen: HashMap<u64, Post> = HashMap::new();
    let mut cursor: Option<u64> = None;
    let mut exhausted = false;
    let mut fetches = 0usize;

    while fetches < PAGE_FETCH_CAP {
        let html = match source.fetch_page(cursor).await {
            Ok(html) => html,
            Err(err) if fetches == 0 => {
                return Err(err.context("first preview page fetch failed"));
            }
            Err(err) => {
                tracing::warn!(error = ?err, pages = fetches, "page fetch failed mid-walk, serving partial feed");
                counter!("feed_fetch_errors_total").increment(1);
                break;
            }
        };
        fetches += 1;
        counter!("feed_pages_fetched_total").increment(1);

        let page = extract(&html);
        if page.posts.is_empty() {
            exhausted = true;
            break;
        }
        for post in page.posts {
            seen.insert(post.id, post);
        }
        match page.oldest_id {
            Some(id) => cursor = Some(id),
            None => {
                // no cursor can be derived, nothing older is reachable
                exhausted = true;
                break;
            }
        }
        if seen.len() > offset + limit {
            break;
        }
    }

    let mut all: Vec<Post> = seen.into_values().collect();
    // newest first; descending id breaks timestamp ties deterministically
    all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

    let total = all.len();
    let posts: Vec<Post> = all.into_iter().skip(offset).take(limit).collect();
    // conservative: unless an empty page confirmed exhaustion, assume more
    let has_more = total > offset + limit || !exhausted;

    Ok(FeedSlice { posts, has_more })
}
