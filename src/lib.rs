// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod extract;
pub mod feed;
pub mod imageproxy;
pub mod metrics;
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::extract::{extract, ExtractedPage, Post};
pub use crate::feed::{collect, FeedSlice, HttpPreviewSource, PreviewSource};
pub use crate::notify::{announce_new_posts, Mailer, MarkOutcome, NotificationStore};
