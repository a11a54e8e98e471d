// src/imageproxy.rs
//
// Telegram CDN hosts block hotlinking/CORS, so image references are
// rewritten to the same-origin `/proxy-image` endpoint. The allow-list is
// shared between the rewriter and the proxy handler so the proxy can never
// be used as an open relay.

use url::Url;

use crate::extract::Post;

/// Hosts (and their subdomains) the proxy will fetch from.
pub const ALLOWED_IMAGE_HOSTS: &[&str] =
    &["telesco.pe", "cdn-telegram.org", "telegram-cdn.org", "t.me"];

pub fn is_allowed_image_host(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    ALLOWED_IMAGE_HOSTS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// Rewrite an allow-listed CDN URL into its same-origin proxy form; anything
/// else (including the empty string) passes through unchanged.
pub fn rewrite_image_url(raw: &str) -> String {
    if raw.is_empty() || !is_allowed_image_host(raw) {
        return raw.to_string();
    }
    let encoded: String = url::form_urlencoded::byte_serialize(raw.as_bytes()).collect();
    format!("/proxy-image?url={encoded}")
}

/// Rewrite every image reference a post carries, in place.
pub fn rewrite_post_images(post: &mut Post) {
    if let Some(url) = post.image_url.take() {
        post.image_url = Some(rewrite_image_url(&url));
    }
    for url in &mut post.images {
        *url = rewrite_image_url(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_listed_host_is_rewritten_with_encoded_original() {
        let out = rewrite_image_url("https://telegram-cdn.org/x.jpg");
        assert!(out.starts_with("/proxy-image?url="));
        assert!(out.contains("https%3A%2F%2Ftelegram-cdn.org%2Fx.jpg"));
    }

    #[test]
    fn subdomains_of_allowed_hosts_are_rewritten() {
        let out = rewrite_image_url("https://cdn4.telesco.pe/file/abc.jpg");
        assert!(out.starts_with("/proxy-image?url="));
    }

    #[test]
    fn foreign_host_passes_through() {
        assert_eq!(
            rewrite_image_url("https://example.com/x.jpg"),
            "https://example.com/x.jpg"
        );
    }

    #[test]
    fn lookalike_suffix_is_not_allowed() {
        assert!(!is_allowed_image_host("https://evil-t.me.example.com/x.jpg"));
        assert!(!is_allowed_image_host("https://nott.me/x.jpg"));
    }

    #[test]
    fn empty_and_garbage_pass_through() {
        assert_eq!(rewrite_image_url(""), "");
        assert_eq!(rewrite_image_url("not a url"), "not a url");
    }
}
