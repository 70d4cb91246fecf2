// src/pipeline.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join;
use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aligner::{SeriesAligner, StitchedSeries};
use crate::clock::Clock;
use crate::error::PipelineError;
use crate::feed::{FeedKind, FeedTable, RawPrediction, RawTick};
use crate::fetcher::FeedSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    Idle,
    Loading,
    Ready,
    /// The latest run failed; whatever was published before stays in place.
    Unavailable(String),
}

/// Output of one successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedSeries {
    pub ticker: String,
    pub generation: u64,
    pub stitched_at: DateTime<Utc>,
    pub series: StitchedSeries,
}

/// State shared with the rendering layer. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    /// Incremented by every ticker selection.
    pub generation: u64,
    pub ticker: Option<String>,
    pub status: PipelineStatus,
    pub published: Option<Arc<PublishedSeries>>,
}

impl PipelineState {
    /// True when the published series belongs to the latest selection.
    pub fn is_current(&self) -> bool {
        self.published.as_ref().map_or(false, |published| published.generation == self.generation)
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState { generation: 0, ticker: None, status: PipelineStatus::Idle, published: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Published,
    /// Finished after a newer selection or teardown; nothing was applied.
    Discarded,
}

/// Runs fetch-then-stitch for the selected ticker. Only the most recently
/// started run may publish.
pub struct TickerPipeline {
    source: Arc<dyn FeedSource>,
    aligner: Arc<SeriesAligner>,
    clock: Arc<dyn Clock>,
    state: Arc<watch::Sender<PipelineState>>,
    cancel: CancellationToken,
    in_flight: Option<CancellationToken>,
}

impl TickerPipeline {
    pub fn new(
        source: Arc<dyn FeedSource>,
        aligner: SeriesAligner,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::default());
        TickerPipeline {
            source,
            aligner: Arc::new(aligner),
            clock,
            state: Arc::new(state),
            cancel,
            in_flight: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Starts a run for `ticker`, superseding any run still in flight.
    pub fn select_ticker(&mut self, ticker: impl Into<String>) -> JoinHandle<Result<RunOutcome, PipelineError>> {
        let ticker = ticker.into();
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
        }
        let run_cancel = self.cancel.child_token();
        self.in_flight = Some(run_cancel.clone());

        let mut generation = 0;
        self.state.send_modify(|state| {
            state.generation += 1;
            generation = state.generation;
            state.ticker = Some(ticker.clone());
            state.status = PipelineStatus::Loading;
        });
        info!(%ticker, generation, "ticker selected");

        let run = PipelineRun {
            ticker,
            generation,
            source: Arc::clone(&self.source),
            aligner: Arc::clone(&self.aligner),
            clock: Arc::clone(&self.clock),
            state: Arc::clone(&self.state),
            cancel: run_cancel,
        };
        tokio::spawn(run.execute())
    }

    /// Cancels the in-flight run and prevents any later publication.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        self.in_flight = None;
    }
}

impl Drop for TickerPipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct PipelineRun {
    ticker: String,
    generation: u64,
    source: Arc<dyn FeedSource>,
    aligner: Arc<SeriesAligner>,
    clock: Arc<dyn Clock>,
    state: Arc<watch::Sender<PipelineState>>,
    cancel: CancellationToken,
}

impl PipelineRun {
    async fn execute(self) -> Result<RunOutcome, PipelineError> {
        // Feeds that arrive go through the publish gate even if cancelled meanwhile.
        let fetched = tokio::select! {
            biased;
            fetched = self.fetch_both() => fetched,
            _ = self.cancel.cancelled() => {
                debug!(ticker = %self.ticker, generation = self.generation, "run cancelled before feeds arrived");
                return Err(PipelineError::Cancelled);
            }
        };

        let (ticks, predictions) = match fetched {
            Ok(tables) => tables,
            Err(err) => {
                let reason = err.to_string();
                let applied = self.publish(|state| state.status = PipelineStatus::Unavailable(reason));
                if applied {
                    error!(ticker = %self.ticker, error = %err, "feeds unavailable, keeping previous series");
                }
                return Err(err);
            }
        };

        let stitched_at = self.clock.now();
        let aligner = Arc::clone(&self.aligner);
        let series = task::spawn_blocking(move || {
            let config = aligner.config();
            let ticks = RawTick::from_rows(&ticks, config.tick_header);
            let predictions = RawPrediction::from_rows(&predictions, config.prediction_header);
            aligner.stitch(&ticks, &predictions, &stitched_at)
        })
        .await?;

        let published = PublishedSeries {
            ticker: self.ticker.clone(),
            generation: self.generation,
            stitched_at,
            series,
        };
        let current = published.series.current.len();
        let previous = published.series.previous.len();

        let applied = self.publish(|state| {
            state.status = PipelineStatus::Ready;
            state.published = Some(Arc::new(published));
        });

        if applied {
            info!(ticker = %self.ticker, generation = self.generation, current, previous, "series published");
            Ok(RunOutcome::Published)
        } else {
            debug!(ticker = %self.ticker, generation = self.generation, "stale run discarded");
            Ok(RunOutcome::Discarded)
        }
    }

    /// Both feeds are requested concurrently; either failing fails the run.
    async fn fetch_both(&self) -> Result<(FeedTable, FeedTable), PipelineError> {
        let ticks = async {
            self.source
                .fetch(FeedKind::Ticks, &self.ticker)
                .await
                .map_err(|source| PipelineError::Feed { feed: FeedKind::Ticks, source })
        };
        let predictions = async {
            self.source
                .fetch(FeedKind::Predictions, &self.ticker)
                .await
                .map_err(|source| PipelineError::Feed { feed: FeedKind::Predictions, source })
        };
        try_join(ticks, predictions).await
    }

    /// Applies `update` only if this run is still the latest and not cancelled.
    fn publish(&self, update: impl FnOnce(&mut PipelineState)) -> bool {
        self.state.send_if_modified(|state| {
            if self.cancel.is_cancelled() || state.generation != self.generation {
                return false;
            }
            update(state);
            true
        })
    }
}
