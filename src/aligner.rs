// src/aligner.rs

use chrono::{DateTime, Duration as ChronoDuration, TimeZone};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::calendar::TradingCalendar;
use crate::config::AlignerConfig;
use crate::error::RowError;
use crate::feed::{RawPrediction, RawTick};
use crate::normalizer::{normalize, NormalizedInstant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBucket {
    Current,
    Previous,
    Discard,
}

/// One tick stitched to its prediction band and to the price observed one
/// horizon later.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchedPoint {
    /// Tick the prediction was made from.
    pub origin: NormalizedInstant,
    /// Projected observation time, `origin + horizon`.
    pub timestamp: NormalizedInstant,
    pub current_price: f64,
    /// Price of the first sample at or after `timestamp`; `None` when the feed
    /// does not reach that far or the sample's price is unusable.
    pub actual_price: Option<f64>,
    pub predicted_high: f64,
    pub predicted_low: f64,
    pub predicted_close: Option<f64>,
}

/// Per-reason counts of rows that did not become points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StitchStats {
    pub ticks: usize,
    pub predictions: usize,
    pub malformed_timestamps: usize,
    pub non_finite_values: usize,
    pub outside_window: usize,
    pub unmatched: usize,
    pub discarded: usize,
    pub emitted: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StitchedSeries {
    pub current: Vec<StitchedPoint>,
    pub previous: Vec<StitchedPoint>,
    pub stats: StitchStats,
}

impl StitchedSeries {
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.previous.is_empty()
    }
}

struct Sample {
    instant: NormalizedInstant,
    price: Result<f64, RowError>,
}

struct Band {
    instant: NormalizedInstant,
    high: f64,
    low: f64,
    close: Option<f64>,
}

/// Stitches historical ticks to hourly prediction rows.
#[derive(Debug, Clone)]
pub struct SeriesAligner {
    config: AlignerConfig,
    calendar: TradingCalendar,
}

impl SeriesAligner {
    pub fn new(config: AlignerConfig) -> Self {
        let calendar = TradingCalendar::from_config(&config);
        SeriesAligner { config, calendar }
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// Buckets a point by its origin's exchange-local date.
    pub fn classify<T: TimeZone>(&self, origin: &NormalizedInstant, reference_now: &DateTime<T>) -> SessionBucket {
        let date = origin.date();
        if date == self.calendar.local(reference_now).date_naive() {
            SessionBucket::Current
        } else if date == self.calendar.previous_trading_day(reference_now) {
            SessionBucket::Previous
        } else {
            SessionBucket::Discard
        }
    }

    pub fn stitch<T: TimeZone>(
        &self,
        ticks: &[RawTick],
        predictions: &[RawPrediction],
        reference_now: &DateTime<T>,
    ) -> StitchedSeries {
        let mut stats = StitchStats { ticks: ticks.len(), ..StitchStats::default() };
        let (Some(horizon), Some(match_window)) = (self.config.horizon(), self.config.match_window()) else {
            warn!(
                horizon_minutes = self.config.horizon_minutes,
                match_window_minutes = self.config.match_window_minutes,
                "offsets out of range, nothing stitched"
            );
            return StitchedSeries { stats, ..StitchedSeries::default() };
        };
        let samples = self.normalize_ticks(ticks, &mut stats);
        let bands = self.normalize_predictions(predictions, &mut stats);

        let zone = self.config.market.timezone();
        let mut series = StitchedSeries::default();

        for (index, sample) in samples.iter().enumerate() {
            let time = sample.instant.time();
            if time < self.config.window_start || time >= self.config.window_end {
                stats.outside_window += 1;
                continue;
            }

            let current_price = match &sample.price {
                Ok(price) => *price,
                Err(error) => {
                    debug!(at = %sample.instant, %error, "skipping tick");
                    stats.non_finite_values += 1;
                    continue;
                }
            };

            let Some(band) = match_prediction(&bands, &sample.instant, match_window) else {
                stats.unmatched += 1;
                continue;
            };

            let Some(target) = sample.instant.utc().checked_add_signed(horizon) else {
                stats.outside_window += 1;
                continue;
            };
            let later = &samples[index + 1..];
            let actual_price = later
                .get(later.partition_point(|s| s.instant.utc() < target))
                .and_then(|s| s.price.as_ref().ok().copied());

            let mode = self.config.prediction_mode;
            let point = StitchedPoint {
                origin: sample.instant,
                timestamp: NormalizedInstant::from_utc(target, zone),
                current_price,
                actual_price,
                predicted_high: mode.apply(band.high, current_price),
                predicted_low: mode.apply(band.low, current_price),
                predicted_close: band.close.map(|close| mode.apply(close, current_price)),
            };

            match self.classify(&point.origin, reference_now) {
                SessionBucket::Current => series.current.push(point),
                SessionBucket::Previous => series.previous.push(point),
                SessionBucket::Discard => {
                    stats.discarded += 1;
                    continue;
                }
            }
            stats.emitted += 1;
        }

        debug!(?stats, "stitched series");
        series.stats = stats;
        series
    }

    /// Normalizes every tick in parallel and returns them sorted by instant.
    fn normalize_ticks(&self, ticks: &[RawTick], stats: &mut StitchStats) -> Vec<Sample> {
        let market = self.config.market;
        let parsed: Vec<(usize, Result<Sample, RowError>)> = ticks
            .par_iter()
            .enumerate()
            .map(|(index, tick)| {
                let sample = normalize(&tick.timestamp, market).map(|instant| Sample {
                    instant,
                    price: parse_finite("price", &tick.price),
                });
                (index, sample)
            })
            .collect();

        let mut samples = Vec::with_capacity(parsed.len());
        for (index, result) in parsed {
            match result {
                Ok(sample) => samples.push(sample),
                Err(error) => {
                    warn!(row = index, %error, "dropping tick");
                    stats.malformed_timestamps += 1;
                }
            }
        }
        samples.sort_by_key(|sample| sample.instant);
        samples
    }

    fn normalize_predictions(&self, predictions: &[RawPrediction], stats: &mut StitchStats) -> Vec<Band> {
        let rows = predictions.iter().enumerate().skip(usize::from(self.config.prediction_header));

        let mut bands = Vec::with_capacity(predictions.len());
        for (index, row) in rows {
            stats.predictions += 1;
            match self.normalize_prediction(row) {
                Ok(band) => bands.push(band),
                Err(error @ RowError::MalformedTimestamp(_)) => {
                    warn!(row = index, %error, "dropping prediction");
                    stats.malformed_timestamps += 1;
                }
                Err(error) => {
                    debug!(row = index, %error, "dropping prediction");
                    stats.non_finite_values += 1;
                }
            }
        }
        bands.sort_by_key(|band| band.instant);
        bands
    }

    fn normalize_prediction(&self, row: &RawPrediction) -> Result<Band, RowError> {
        let instant = normalize(&row.timestamp, self.config.market)?;
        let high = parse_finite("predicted high", &row.predicted_high)?;
        let low = parse_finite("predicted low", &row.predicted_low)?;
        let close = row
            .predicted_close
            .as_deref()
            .and_then(|raw| parse_finite("predicted close", raw).ok());
        Ok(Band { instant, high, low, close })
    }
}

/// Closest prediction at or after `at` and no later than `window` past it;
/// the earliest wins a tie.
fn match_prediction<'a>(bands: &'a [Band], at: &NormalizedInstant, window: ChronoDuration) -> Option<&'a Band> {
    let start = bands.partition_point(|band| band.instant < *at);
    let limit = at.utc().checked_add_signed(window)?;
    bands[start..]
        .iter()
        .take_while(|band| band.instant.utc() <= limit)
        .min_by_key(|band| band.instant.utc() - at.utc())
}

fn parse_finite(field: &'static str, raw: &str) -> Result<f64, RowError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| RowError::NonFiniteValue { field, raw: raw.to_string() })
}
