use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder and register the series the
    /// ingestion and notification paths emit.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_counter!("feed_pages_fetched_total", "Preview pages fetched.");
        describe_counter!(
            "feed_fetch_errors_total",
            "Preview page fetch failures after the first page."
        );
        describe_counter!("extract_posts_total", "Posts extracted from preview pages.");
        describe_counter!(
            "extract_rejected_total",
            "Message fragments rejected for missing id/timestamp/content."
        );
        describe_histogram!("extract_parse_ms", "Page parse time in milliseconds.");
        describe_counter!("notify_sent_total", "Subscriber emails delivered.");
        describe_counter!(
            "notify_duplicate_total",
            "Posts skipped because their notification record already existed."
        );
        describe_counter!("notify_store_errors_total", "Notification store failures.");
        describe_counter!("notify_send_errors_total", "Email delivery failures.");

        Self { handle }
    }

    /// Returns a router exposing `/metrics` in Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
