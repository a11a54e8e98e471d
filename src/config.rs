// src/config.rs
//
// Environment-driven configuration. Only the source channel is mandatory;
// a missing store path or SMTP block disables notifications without
// touching the listing path.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Public channel name, the `<channel>` in `https://t.me/s/<channel>`.
    pub channel: String,
    /// Base URL used for deep links in notification emails.
    pub site_base_url: String,
    /// SQLite path for notification records and subscribers; `None` runs
    /// the service without the notification gate.
    pub store_path: Option<String>,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let channel = std::env::var("TELEGRAM_CHANNEL").context("TELEGRAM_CHANNEL missing")?;
        let site_base_url = std::env::var("SITE_BASE_URL").unwrap_or_default();
        let store_path = std::env::var("NOTIFY_DB_PATH").ok().filter(|s| !s.is_empty());
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        Ok(Self {
            channel,
            site_base_url,
            store_path,
            bind_addr,
        })
    }
}
