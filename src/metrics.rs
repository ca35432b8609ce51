use anyhow::Context;
use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::AppConfig;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if another recorder is already set.
    pub fn init(cfg: &AppConfig) -> anyhow::Result<Self> {
        // Default buckets; histograms render as summaries.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        // Static gauges describing the active fetch setup
        gauge!("fetch_attempt_timeout_ms").set(cfg.fetch.timeout.as_millis() as f64);
        gauge!("fetch_feed_proxies").set(cfg.fetch.feed_proxies.len() as f64);
        gauge!("fetch_page_proxies").set(cfg.fetch.page_proxies.len() as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
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
