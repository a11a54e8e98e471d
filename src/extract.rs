// src/extract.rs
//
// HTML post extractor for Telegram public-channel preview pages.
// t.me serves no JSON API for public channels; the preview markup is the
// wire format. Treat it as unstable: every locator in this module is a
// narrow adapter (fragment marker + per-field regex) so an upstream markup
// change only touches this file.

use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

/// Fixed category tag; the source has no categorization of its own.
pub const POST_CATEGORY: &str = "news";

/// Class marker that opens every message block on a preview page.
const FRAGMENT_MARKER: &str = "tgme_widget_message_wrap";

/// One structured post extracted from a message block.
///
/// `title`/`body` are duplicated into the `*_localized` pair at ingestion
/// time; downstream localization may rewrite the latter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub title_localized: String,
    pub body: String,
    pub body_localized: String,
    /// Unix milliseconds derived from the message's publish time.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub images: Vec<String>,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Result of parsing one preview page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub posts: Vec<Post>,
    /// Minimum message id on this page; the next backward-pagination cursor.
    pub oldest_id: Option<u64>,
}

fn re_br() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").unwrap())
}

fn re_block_close() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)</(?:p|blockquote|li)\s*>").unwrap())
}

fn re_tags() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap())
}

fn re_extra_newlines() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

fn re_data_post() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r#"data-post="([^"]+)""#).unwrap())
}

fn re_datetime() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r#"<time[^>]+datetime="([^"]+)""#).unwrap())
}

fn re_photo() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"tgme_widget_message_photo_wrap[^>]*?background-image\s*:\s*url\('([^']+)'\)"#)
            .unwrap()
    })
}

/// Parse one preview page into posts plus the backward-pagination cursor.
///
/// Pure: identical input yields identical output. Message blocks missing an
/// id, a parseable publish time, or any text/image content are skipped
/// without failing the page.
pub fn extract(html: &str) -> ExtractedPage {
    let t0 = std::time::Instant::now();

    let mut posts = Vec::new();
    let mut rejected = 0usize;
    for fragment in split_fragments(html) {
        match parse_fragment(fragment) {
            Some(post) => posts.push(post),
            None => rejected += 1,
        }
    }
    let oldest_id = posts.iter().map(|p| p.id).min();

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("extract_parse_ms").record(ms);
    counter!("extract_posts_total").increment(posts.len() as u64);
    if rejected > 0 {
        counter!("extract_rejected_total").increment(rejected as u64);
    }

    ExtractedPage { posts, oldest_id }
}

/// Slice the page into per-message fragments at each wrapper marker.
fn split_fragments(html: &str) -> Vec<&str> {
    let starts: Vec<usize> = html.match_indices(FRAGMENT_MARKER).map(|(i, _)| i).collect();
    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(html.len());
            &html[start..end]
        })
        .collect()
}

fn parse_fragment(fragment: &str) -> Option<Post> {
    // data-post="channel/123" carries both the deep-link path and the id.
    let post_path = re_data_post().captures(fragment)?.get(1)?.as_str();
    let id: u64 = post_path.rsplit('/').next()?.parse().ok()?;

    let timestamp = re_datetime()
        .captures(fragment)
        .and_then(|c| c.get(1))
        .and_then(|m| chrono::DateTime::parse_from_rfc3339(m.as_str()).ok())?
        .timestamp_millis();

    let images = photo_urls(fragment);
    let text = message_text_block(fragment)
        .map(clean_text)
        .unwrap_or_default();
    if text.is_empty() && images.is_empty() {
        return None;
    }

    let title = derive_title(&text, id);
    let body = derive_body(&text);
    Some(Post {
        id,
        title: title.clone(),
        title_localized: title,
        body: body.clone(),
        body_localized: body,
        timestamp,
        image_url: images.first().cloned(),
        images,
        category: POST_CATEGORY.to_string(),
        source_url: Some(format!("https://t.me/{post_path}")),
    })
}

/// Inner HTML of the message text container, found by balancing nested divs
/// (the container holds inline markup and may hold nested divs).
fn message_text_block(fragment: &str) -> Option<&str> {
    let marker = fragment.find("tgme_widget_message_text")?;
    let open_end = marker + fragment[marker..].find('>')? + 1;
    let rest = &fragment[open_end..];

    let mut depth = 1usize;
    let mut pos = 0usize;
    loop {
        let close = rest[pos..].find("</div")?;
        match rest[pos..].find("<div") {
            Some(open) if open < close => {
                depth += 1;
                pos += open + 4;
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[..pos + close]);
                }
                pos += close + 5;
            }
        }
    }
}

/// Background-image URLs from photo wrappers, encounter order, deduplicated.
fn photo_urls(fragment: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cap in re_photo().captures_iter(fragment) {
        let url = cap[1].to_string();
        if !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

/// Flatten a message's inner HTML to plain text.
///
/// Explicit breaks and closed p/blockquote/li become newlines, remaining
/// tags are stripped, entities are decoded one level (unparseable escapes
/// are left untouched), runs of 3+ newlines collapse to 2.
pub fn clean_text(raw: &str) -> String {
    let mut out = re_br().replace_all(raw, "\n").to_string();
    out = re_block_close().replace_all(&out, "\n").to_string();
    out = re_tags().replace_all(&out, "").to_string();
    out = out.replace("&nbsp;", " ");
    out = html_escape::decode_html_entities(&out).to_string();
    out = re_extra_newlines().replace_all(&out, "\n\n").to_string();
    out.trim().to_string()
}

fn derive_title(text: &str, id: u64) -> String {
    if text.is_empty() {
        return format!("Post #{id}");
    }
    let first_line = text.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= 120 {
        return first_line.to_string();
    }
    let words: Vec<&str> = first_line.split_whitespace().collect();
    if words.len() <= 8 {
        return first_line.to_string();
    }
    format!("{}…", words[..8].join(" "))
}

fn derive_body(text: &str) -> String {
    match text.split_once('\n') {
        Some((_, rest)) if !rest.trim().is_empty() => rest.trim().to_string(),
        _ => text.to_string(),
    }
}
