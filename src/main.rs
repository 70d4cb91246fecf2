// src/main.rs

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sessionalign::{HttpFeedSource, PipelineStatus, SessionConfig, SessionDashboard};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let ticker = args.next().unwrap_or_else(|| "SPY".to_string());
    let config = match args.next() {
        Some(path) => SessionConfig::from_json_file(&path).with_context(|| format!("loading {path}"))?,
        None => SessionConfig::default(),
    }
    .with_env_overrides()
    .context("reading SESSIONALIGN_* overrides")?;

    let source = Arc::new(HttpFeedSource::new(config.feed.clone()));
    let mut dashboard = SessionDashboard::new(config, source);
    let mut clock = dashboard.clock_state();
    let mut pipeline = dashboard.pipeline_state();

    let run = dashboard.select_ticker(ticker.as_str());
    info!(%ticker, "fetching feeds");

    let watch_loop = async {
        loop {
            tokio::select! {
                changed = clock.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *clock.borrow_and_update();
                    info!(phase = ?state.phase, boundary = %state.boundary, countdown = %state.countdown(), "session clock");
                }
                changed = pipeline.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = pipeline.borrow_and_update().clone();
                    match (&state.status, &state.published) {
                        (PipelineStatus::Ready, Some(published)) => info!(
                            ticker = %published.ticker,
                            current = published.series.current.len(),
                            previous = published.series.previous.len(),
                            stats = ?published.series.stats,
                            "series ready"
                        ),
                        (PipelineStatus::Unavailable(reason), _) => warn!(%reason, "series unavailable"),
                        (status, _) => info!(?status, "pipeline"),
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => info!("interrupted"),
        _ = watch_loop => {}
    }

    run.abort();
    dashboard.teardown().await;
    Ok(())
}
