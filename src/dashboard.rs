// src/dashboard.rs

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::aligner::SeriesAligner;
use crate::calendar::TradingCalendar;
use crate::clock::{Clock, ClockHandle, ClockState, SessionClock, SystemClock};
use crate::config::SessionConfig;
use crate::error::PipelineError;
use crate::fetcher::FeedSource;
use crate::pipeline::{PipelineState, RunOutcome, TickerPipeline};

/// Owner of the two independent triggers: ticker selections feeding the
/// pipeline, and the once-per-tick session clock.
///
/// Tearing the dashboard down stops the clock and keeps any in-flight run
/// from publishing.
pub struct SessionDashboard {
    config: SessionConfig,
    clock_source: Arc<dyn Clock>,
    clock_state: Arc<watch::Sender<ClockState>>,
    clock: Option<ClockHandle>,
    pipeline: TickerPipeline,
    cancel: CancellationToken,
}

impl SessionDashboard {
    pub fn new(config: SessionConfig, source: Arc<dyn FeedSource>) -> Self {
        Self::with_clock(config, source, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SessionConfig, source: Arc<dyn FeedSource>, clock_source: Arc<dyn Clock>) -> Self {
        let cancel = CancellationToken::new();
        let aligner = SeriesAligner::new(config.aligner.clone());
        let pipeline = TickerPipeline::new(source, aligner, Arc::clone(&clock_source), cancel.child_token());

        let (clock_state, _) = watch::channel(ClockState::compute(&Self::calendar(&config), &clock_source.now()));

        let mut dashboard = SessionDashboard {
            config,
            clock_source,
            clock_state: Arc::new(clock_state),
            clock: None,
            pipeline,
            cancel,
        };
        dashboard.restart_clock();
        dashboard
    }

    fn calendar(config: &SessionConfig) -> TradingCalendar {
        TradingCalendar::from_config(&config.aligner)
    }

    fn restart_clock(&mut self) {
        if let Some(previous) = self.clock.take() {
            previous.cancel();
        }
        let clock = SessionClock::new(Self::calendar(&self.config), self.config.clock.period())
            .with_source(Arc::clone(&self.clock_source));
        self.clock = Some(clock.spawn(Arc::clone(&self.clock_state), self.cancel.child_token()));
    }

    /// Selects a ticker: restarts the clock and starts a new pipeline run.
    pub fn select_ticker(&mut self, ticker: impl Into<String>) -> JoinHandle<Result<RunOutcome, PipelineError>> {
        self.restart_clock();
        self.pipeline.select_ticker(ticker)
    }

    pub fn clock_state(&self) -> watch::Receiver<ClockState> {
        self.clock_state.subscribe()
    }

    pub fn pipeline_state(&self) -> watch::Receiver<PipelineState> {
        self.pipeline.subscribe()
    }

    pub async fn teardown(mut self) {
        self.cancel.cancel();
        self.pipeline.shutdown();
        if let Some(clock) = self.clock.take() {
            clock.stop().await;
        }
        info!("dashboard torn down");
    }
}

impl Drop for SessionDashboard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
