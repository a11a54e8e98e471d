// src/notify/mod.rs
//
// The notification gate: at-most-once-per-post-id email dispatch to
// confirmed subscribers. The unique key on the notification record is the
// only thing guarding against duplicate sends when two requests race on the
// freshest page; everything past that key is best-effort. A crash between
// "record inserted" and "emails sent" loses that post's notifications, by
// accepted contract.

pub mod email;
pub mod store;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;

use crate::extract::Post;

/// Outcome of claiming a post id in the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The record was inserted now; this post has never been announced.
    Fresh,
    /// The unique key already existed; someone announced it before us.
    AlreadyNotified,
}

/// Durable collaborator: notification records plus the subscriber list.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert-or-detect-duplicate on the post id's unique key.
    async fn mark_notified(&self, post_id: u64) -> Result<MarkOutcome>;
    async fn confirmed_subscribers(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Mail transport collaborator; delivery failure is an `Err`, caught per
/// recipient by the gate.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingEmail) -> Result<()>;
}

/// Deep link into the site's post view.
pub fn post_deep_link(site_base_url: &str, post_id: u64) -> String {
    let encoded: String =
        url::form_urlencoded::byte_serialize(post_id.to_string().as_bytes()).collect();
    format!("{site_base_url}#/post/{encoded}")
}

/// Announce each not-yet-notified post to every confirmed subscriber.
///
/// Runs detached from the request that triggered it and never propagates an
/// error: a store failure skips that one post, a delivery failure skips that
/// one recipient, and the loop moves on.
pub async fn announce_new_posts(
    store: Arc<dyn NotificationStore>,
    mailer: Arc<dyn Mailer>,
    site_base_url: String,
    posts: Vec<Post>,
) {
    for post in posts {
        match store.mark_notified(post.id).await {
            Ok(MarkOutcome::Fresh) => {}
            Ok(MarkOutcome::AlreadyNotified) => {
                counter!("notify_duplicate_total").increment(1);
                continue;
            }
            Err(err) => {
                tracing::warn!(error = ?err, post_id = post.id, "could not record notification, skipping post");
                counter!("notify_store_errors_total").increment(1);
                continue;
            }
        }

        let subscribers = match store.confirmed_subscribers().await {
            Ok(list) => list,
            Err(err) => {
                tracing::warn!(error = ?err, post_id = post.id, "could not load subscribers, skipping post");
                counter!("notify_store_errors_total").increment(1);
                continue;
            }
        };

        let link = post_deep_link(&site_base_url, post.id);
        for recipient in subscribers {
            let mail = build_post_email(&recipient, &post, &link);
            match mailer.send(&mail).await {
                Ok(()) => {
                    counter!("notify_sent_total").increment(1);
                }
                Err(err) => {
                    tracing::warn!(error = ?err, recipient = %recipient, post_id = post.id, "email delivery failed");
                    counter!("notify_send_errors_total").increment(1);
                }
            }
        }
        tracing::info!(post_id = post.id, title = %post.title, "new post announced");
    }
}

fn build_post_email(recipient: &str, post: &Post, link: &str) -> OutgoingEmail {
    let title = html_escape::encode_text(&post.title).to_string();
    let body = html_escape::encode_text(&post.body).replace('\n', "<br>");
    OutgoingEmail {
        to: recipient.to_string(),
        subject: format!("New post: {}", post.title),
        text: format!("{}\n\n{}\n\nRead it here: {}", post.title, post.body, link),
        html: format!(
            "<h2>{title}</h2><p>{body}</p><p><a href=\"{link}\">Read it on the site</a></p>"
        ),
    }
}
