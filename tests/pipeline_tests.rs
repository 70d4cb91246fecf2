// tests/pipeline_tests.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use chrono_tz::US::Eastern;
use sessionalign::{
    AlignerConfig, FeedError, FeedKind, FeedSource, FeedTable, FixedClock, PipelineError, PipelineStatus,
    RunOutcome, SeriesAligner, TickerPipeline,
};
use tokio_util::sync::CancellationToken;

/// Serves the same tables for every ticker after a per-ticker delay.
#[derive(Default)]
struct ScriptedSource {
    delays: HashMap<String, Duration>,
    failing: HashSet<(String, FeedKind)>,
}

impl ScriptedSource {
    fn delay(mut self, ticker: &str, delay: Duration) -> Self {
        self.delays.insert(ticker.to_string(), delay);
        self
    }

    fn failing(mut self, ticker: &str, kind: FeedKind) -> Self {
        self.failing.insert((ticker.to_string(), kind));
        self
    }
}

fn table(rows: &[&[&str]]) -> FeedTable {
    rows.iter().map(|row| row.iter().map(|cell| cell.to_string()).collect()).collect()
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch(&self, kind: FeedKind, ticker: &str) -> Result<FeedTable, FeedError> {
        let delay = self.delays.get(ticker).copied().unwrap_or(Duration::from_millis(10));
        tokio::time::sleep(delay).await;

        if self.failing.contains(&(ticker.to_string(), kind)) {
            return Err(FeedError::Status { url: format!("scripted://{ticker}/{kind}"), status: 503 });
        }

        Ok(session_table(kind))
    }
}

fn session_table(kind: FeedKind) -> FeedTable {
    match kind {
        FeedKind::Ticks => table(&[
            &["2024-01-09 10:00:00", "100"],
            &["2024-01-09 10:30:00", "100.5"],
            &["2024-01-09 11:00:00", "101"],
        ]),
        FeedKind::Predictions => table(&[
            &["timestamp", "high", "low"],
            &["2024-01-09 10:00:00", "1.02", "0.98"],
        ]),
    }
}

/// Answers at once, but cancels the given token while doing so.
struct CancellingSource {
    token: CancellationToken,
}

#[async_trait]
impl FeedSource for CancellingSource {
    async fn fetch(&self, kind: FeedKind, _ticker: &str) -> Result<FeedTable, FeedError> {
        self.token.cancel();
        Ok(session_table(kind))
    }
}

fn pipeline_with(source: Arc<dyn FeedSource>, cancel: CancellationToken) -> TickerPipeline {
    let now = Eastern.with_ymd_and_hms(2024, 1, 9, 12, 0, 0).unwrap().with_timezone(&Utc);
    TickerPipeline::new(source, SeriesAligner::new(AlignerConfig::default()), Arc::new(FixedClock(now)), cancel)
}

fn pipeline(source: ScriptedSource) -> TickerPipeline {
    pipeline_with(Arc::new(source), CancellationToken::new())
}

#[tokio::test(start_paused = true)]
async fn test_selection_publishes_stitched_series() {
    let mut pipeline = pipeline(ScriptedSource::default());

    let run = pipeline.select_ticker("SPY");
    assert_eq!(pipeline.state().status, PipelineStatus::Loading);

    assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Published);

    let state = pipeline.state();
    assert_eq!(state.status, PipelineStatus::Ready);
    assert!(state.is_current());
    let published = state.published.unwrap();
    assert_eq!(published.ticker, "SPY");
    assert_eq!(published.series.current.len(), 1);
    assert_eq!(published.series.stats.unmatched, 2);
    assert_eq!(published.series.current[0].predicted_high, 102.0);
    assert_eq!(published.series.current[0].actual_price, Some(101.0));
}

#[tokio::test(start_paused = true)]
async fn test_stale_run_finishing_last_is_discarded() {
    let source = ScriptedSource::default()
        .delay("X", Duration::from_secs(5))
        .delay("Y", Duration::from_secs(1));
    let mut pipeline = pipeline(source);

    let run_a = pipeline.select_ticker("X");
    let run_b = pipeline.select_ticker("Y");

    assert_eq!(run_b.await.unwrap().unwrap(), RunOutcome::Published);
    assert!(matches!(run_a.await.unwrap(), Err(PipelineError::Cancelled)));

    let state = pipeline.state();
    assert_eq!(state.generation, 2);
    assert_eq!(state.ticker.as_deref(), Some("Y"));
    assert_eq!(state.published.unwrap().ticker, "Y");
}

#[tokio::test(start_paused = true)]
async fn test_stale_run_finishing_first_is_discarded() {
    let source = ScriptedSource::default()
        .delay("X", Duration::from_secs(1))
        .delay("Y", Duration::from_secs(5));
    let mut pipeline = pipeline(source);
    let mut updates = pipeline.subscribe();

    let run_a = pipeline.select_ticker("X");
    let run_b = pipeline.select_ticker("Y");

    assert!(matches!(run_a.await.unwrap(), Err(PipelineError::Cancelled)));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(pipeline.state().published.is_none());

    assert_eq!(run_b.await.unwrap().unwrap(), RunOutcome::Published);
    assert!(updates.has_changed().unwrap());
    let state = updates.borrow_and_update().clone();
    assert_eq!(state.published.unwrap().ticker, "Y");
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_keeps_previous_series() {
    let source = ScriptedSource::default().failing("BAD", FeedKind::Predictions);
    let mut pipeline = pipeline(source);

    pipeline.select_ticker("SPY").await.unwrap().unwrap();
    let result = pipeline.select_ticker("BAD").await.unwrap();

    match result {
        Err(PipelineError::Feed { feed, source }) => {
            assert_eq!(feed, FeedKind::Predictions);
            assert!(matches!(source, FeedError::Status { status: 503, .. }));
        }
        other => panic!("expected feed failure, got {other:?}"),
    }

    let state = pipeline.state();
    assert!(matches!(state.status, PipelineStatus::Unavailable(_)));
    assert_eq!(state.ticker.as_deref(), Some("BAD"));
    assert!(!state.is_current());
    assert_eq!(state.published.unwrap().ticker, "SPY");
}

#[tokio::test(start_paused = true)]
async fn test_tick_feed_failure_fails_the_run() {
    let source = ScriptedSource::default().failing("BAD", FeedKind::Ticks);
    let mut pipeline = pipeline(source);

    let result = pipeline.select_ticker("BAD").await.unwrap();

    assert!(matches!(result, Err(PipelineError::Feed { feed: FeedKind::Ticks, .. })));
    assert!(pipeline.state().published.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_prevents_publication() {
    let source = ScriptedSource::default().delay("SPY", Duration::from_secs(5));
    let mut pipeline = pipeline(source);

    let run = pipeline.select_ticker("SPY");
    pipeline.shutdown();

    assert!(matches!(run.await.unwrap(), Err(PipelineError::Cancelled)));
    let state = pipeline.state();
    assert_eq!(state.status, PipelineStatus::Loading);
    assert!(state.published.is_none());
}

#[tokio::test]
async fn test_run_cancelled_after_feeds_arrive_is_discarded() {
    let cancel = CancellationToken::new();
    let source = CancellingSource { token: cancel.clone() };
    let mut pipeline = pipeline_with(Arc::new(source), cancel);

    let outcome = pipeline.select_ticker("SPY").await.unwrap().unwrap();

    assert_eq!(outcome, RunOutcome::Discarded);
    let state = pipeline.state();
    assert_eq!(state.status, PipelineStatus::Loading);
    assert!(state.published.is_none());
}
