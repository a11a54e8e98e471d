//! Telegram Channel Feed — Binary Entrypoint
//! Boots the Axum HTTP server, wiring routes, shared state, and middleware.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tg_channel_feed::api::{self, AppState};
use tg_channel_feed::config::AppConfig;
use tg_channel_feed::feed::HttpPreviewSource;
use tg_channel_feed::metrics::Metrics;
use tg_channel_feed::notify::email::SmtpMailer;
use tg_channel_feed::notify::store::SqliteStore;
use tg_channel_feed::notify::{Mailer, NotificationStore};
use tg_channel_feed::PreviewSource;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tg_channel_feed=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env().context("loading configuration")?;

    let source: Arc<dyn PreviewSource> = Arc::new(HttpPreviewSource::new(config.channel.clone()));

    // Missing collaborators disable notifications, never the listing path.
    let store: Option<Arc<dyn NotificationStore>> = match &config.store_path {
        Some(path) => match SqliteStore::open(path) {
            Ok(store) => Some(Arc::new(store)),
            Err(err) => {
                tracing::warn!(error = ?err, "notification store unavailable, notifications disabled");
                None
            }
        },
        None => None,
    };
    let mailer: Option<Arc<dyn Mailer>> = match SmtpMailer::from_env() {
        Ok(Some(mailer)) => Some(Arc::new(mailer)),
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(error = ?err, "mail transport misconfigured, notifications disabled");
            None
        }
    };
    if store.is_none() || mailer.is_none() {
        tracing::info!("notification gate disabled (store or mail transport not configured)");
    }

    let metrics = Metrics::init();

    let mut state = AppState::new(source).with_site_base_url(config.site_base_url.clone());
    if let Some(store) = store {
        state = state.with_store(store);
    }
    if let Some(mailer) = mailer {
        state = state.with_mailer(mailer);
    }

    let app = api::create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, channel = %config.channel, "serving channel feed");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
