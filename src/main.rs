//! News Audio Generator - server entrypoint.
//! Boots the Axum HTTP server on Shuttle: config, pipeline, scheduler, metrics.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_audio_generator::api::{self, AppState};
use news_audio_generator::metrics::Metrics;
use news_audio_generator::{AppConfig, GenerationPipeline};

/// Compact tracing logs, only when NEWS_DEV_LOG=1.
fn enable_dev_tracing() {
    let dev_flag = std::env::var("NEWS_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");
    if !dev_flag {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_audio_generator=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let config = AppConfig::from_env().context("loading configuration")?;
    tracing::info!(
        provider = %config.ai.provider,
        output_dir = %config.output_dir.display(),
        "configuration loaded"
    );

    let metrics = match Metrics::init(&config) {
        Ok(m) => Some(m.router()),
        Err(e) => {
            tracing::warn!(error = %e, "metrics disabled");
            None
        }
    };

    let pipeline = Arc::new(GenerationPipeline::from_config(config));
    let app = api::router(AppState::new(pipeline));
    let app = match metrics {
        Some(m) => app.merge(m),
        None => app,
    };

    Ok(app.into())
}
