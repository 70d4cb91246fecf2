// src/config.rs

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveTime};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::market_timezone::MarketTimezone;

pub const REQUESTS_PER_SECOND: u32 = 5;
pub const MAX_BURST_REQUESTS: u32 = 10;
pub const MAX_FETCH_RETRIES: u32 = 5;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const CLOCK_TICK_MILLIS: u64 = 1_000;
/// Upper bound for the horizon and the prediction match window: one week.
pub const MAX_OFFSET_MINUTES: i64 = 7 * 24 * 60;

pub const DEFAULT_TICKS_URL: &str = "http://localhost:8080/feeds/{ticker}/ticks";
pub const DEFAULT_PREDICTIONS_URL: &str = "http://localhost:8080/feeds/{ticker}/predictions";

const ENV_PREFIX: &str = "SESSIONALIGN_";

/// How raw prediction columns relate to the price at prediction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMode {
    /// Raw high/low are multipliers on the current price.
    #[default]
    Multiplier,
    /// Raw high/low are already price levels.
    Absolute,
}

impl PredictionMode {
    pub fn apply(&self, raw: f64, current_price: f64) -> f64 {
        match self {
            PredictionMode::Multiplier => raw * current_price,
            PredictionMode::Absolute => raw,
        }
    }
}

impl FromStr for PredictionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "multiplier" => Ok(PredictionMode::Multiplier),
            "absolute" => Ok(PredictionMode::Absolute),
            other => Err(format!("unknown prediction mode {other:?}")),
        }
    }
}

/// Parameters of the series aligner and the trading calendar it consults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    pub market: MarketTimezone,
    pub session_open: NaiveTime,
    pub session_close: NaiveTime,
    /// Ticks outside `[window_start, window_end)` exchange-local are dropped.
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    pub horizon_minutes: i64,
    pub match_window_minutes: i64,
    pub prediction_mode: PredictionMode,
    pub prediction_header: bool,
    pub tick_header: bool,
}

impl AlignerConfig {
    /// `None` unless `horizon_minutes` is within `1..=MAX_OFFSET_MINUTES`.
    pub fn horizon(&self) -> Option<ChronoDuration> {
        offset(self.horizon_minutes)
    }

    /// `None` unless `match_window_minutes` is within `1..=MAX_OFFSET_MINUTES`.
    pub fn match_window(&self) -> Option<ChronoDuration> {
        offset(self.match_window_minutes)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, minutes) in [
            ("horizon_minutes", self.horizon_minutes),
            ("match_window_minutes", self.match_window_minutes),
        ] {
            if offset(minutes).is_none() {
                return Err(ConfigError::InvalidValue { name: name.to_string(), value: minutes.to_string() });
            }
        }
        Ok(())
    }
}

fn offset(minutes: i64) -> Option<ChronoDuration> {
    if (1..=MAX_OFFSET_MINUTES).contains(&minutes) {
        ChronoDuration::try_minutes(minutes)
    } else {
        None
    }
}

impl Default for AlignerConfig {
    fn default() -> Self {
        let market = MarketTimezone::Eastern;
        let (open, close) = market.working_hours();
        AlignerConfig {
            market,
            session_open: open,
            session_close: close,
            window_start: open,
            window_end: close,
            horizon_minutes: 60,
            match_window_minutes: 60,
            prediction_mode: PredictionMode::Multiplier,
            prediction_header: true,
            tick_header: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub tick_millis: u64,
}

impl ClockConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig { tick_millis: CLOCK_TICK_MILLIS }
    }
}

/// Where the two feeds live. `{ticker}` in either URL is replaced per run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub ticks_url: String,
    pub predictions_url: String,
    pub api_key: Option<String>,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            ticks_url: DEFAULT_TICKS_URL.to_string(),
            predictions_url: DEFAULT_PREDICTIONS_URL.to_string(),
            api_key: None,
            max_retries: MAX_FETCH_RETRIES,
            timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub aligner: AlignerConfig,
    pub clock: ClockConfig,
    pub feed: FeedConfig,
}

impl SessionConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let body = fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&body)?;
        config.aligner.validate()?;
        Ok(config)
    }

    /// Defaults overridden by any `SESSIONALIGN_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        let aligner = &mut self.aligner;
        if let Some(market) = env_parse::<MarketTimezone>("MARKET")? {
            let (open, close) = market.working_hours();
            aligner.market = market;
            aligner.session_open = open;
            aligner.session_close = close;
            aligner.window_start = open;
            aligner.window_end = close;
        }
        if let Some(time) = env_time("SESSION_OPEN")? {
            aligner.session_open = time;
        }
        if let Some(time) = env_time("SESSION_CLOSE")? {
            aligner.session_close = time;
        }
        if let Some(time) = env_time("WINDOW_START")? {
            aligner.window_start = time;
        }
        if let Some(time) = env_time("WINDOW_END")? {
            aligner.window_end = time;
        }
        if let Some(minutes) = env_minutes("HORIZON_MINUTES")? {
            aligner.horizon_minutes = minutes;
        }
        if let Some(minutes) = env_minutes("MATCH_WINDOW_MINUTES")? {
            aligner.match_window_minutes = minutes;
        }
        if let Some(mode) = env_parse::<PredictionMode>("PREDICTION_MODE")? {
            aligner.prediction_mode = mode;
        }
        if let Some(tick_millis) = env_parse::<u64>("CLOCK_TICK_MS")? {
            self.clock.tick_millis = tick_millis;
        }
        if let Some(url) = env_str("TICKS_URL") {
            self.feed.ticks_url = url;
        }
        if let Some(url) = env_str("PREDICTIONS_URL") {
            self.feed.predictions_url = url;
        }
        if let Some(key) = env_str("API_KEY") {
            self.feed.api_key = Some(key);
        }
        if let Some(retries) = env_parse::<u32>("MAX_RETRIES")? {
            self.feed.max_retries = retries;
        }
        if let Some(secs) = env_parse::<u64>("TIMEOUT_SECS")? {
            self.feed.timeout_secs = secs;
        }
        Ok(self)
    }
}

fn env_str(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_str(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name: format!("{ENV_PREFIX}{name}"), value }),
        None => Ok(None),
    }
}

fn env_minutes(name: &str) -> Result<Option<i64>, ConfigError> {
    match env_parse::<i64>(name)? {
        Some(minutes) if offset(minutes).is_none() => Err(ConfigError::InvalidValue {
            name: format!("{ENV_PREFIX}{name}"),
            value: minutes.to_string(),
        }),
        parsed => Ok(parsed),
    }
}

fn env_time(name: &str) -> Result<Option<NaiveTime>, ConfigError> {
    match env_str(name) {
        Some(value) => NaiveTime::parse_from_str(&value, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&value, "%H:%M:%S"))
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name: format!("{ENV_PREFIX}{name}"), value }),
        None => Ok(None),
    }
}
