// src/lib.rs

pub mod config;
pub mod error;
pub mod market_timezone;
pub mod normalizer;
pub mod calendar;
pub mod clock;
pub mod feed;
pub mod aligner;
pub mod frame;
pub mod session;
pub mod fetcher;
pub mod pipeline;
pub mod dashboard;

pub use aligner::{SeriesAligner, SessionBucket, StitchStats, StitchedPoint, StitchedSeries};
pub use calendar::{is_weekend, TradingCalendar};
pub use clock::{Clock, ClockHandle, ClockPhase, ClockState, FixedClock, SessionClock, SystemClock};
pub use config::{AlignerConfig, ClockConfig, FeedConfig, PredictionMode, SessionConfig};
pub use dashboard::SessionDashboard;
pub use error::{ConfigError, FeedError, PipelineError, RowError};
pub use feed::{FeedKind, FeedTable, RawPrediction, RawTick};
pub use fetcher::{FeedSource, HttpFeedSource};
pub use market_timezone::MarketTimezone;
pub use normalizer::{normalize, NormalizedInstant};
pub use pipeline::{PipelineState, PipelineStatus, PublishedSeries, RunOutcome, TickerPipeline};
pub use session::{FeedSession, RateLimiter};
