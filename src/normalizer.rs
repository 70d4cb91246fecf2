// src/normalizer.rs

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::RowError;
use crate::market_timezone::MarketTimezone;

/// ISO-8601 without an offset, read as exchange-local civil time.
const ISO_LOCAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
/// ISO-8601 forms RFC 3339 rejects: offsets without a colon (`+0000`) and
/// minute precision (`2024-01-09T10:00Z`).
const ISO_OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%#z"];
const EXCHANGE_LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SECONDARY_ZONE_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// An instant together with its wall clock in the exchange zone.
///
/// The wall clock is always expressed in the exchange zone, whatever zone the
/// raw text was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NormalizedInstant {
    utc: DateTime<Utc>,
    local: DateTime<Tz>,
}

impl NormalizedInstant {
    pub fn from_utc(utc: DateTime<Utc>, zone: Tz) -> Self {
        NormalizedInstant { utc, local: utc.with_timezone(&zone) }
    }

    pub fn from_zoned(local: DateTime<Tz>) -> Self {
        NormalizedInstant { utc: local.with_timezone(&Utc), local }
    }

    pub fn utc(&self) -> DateTime<Utc> {
        self.utc
    }

    pub fn local(&self) -> DateTime<Tz> {
        self.local
    }

    pub fn zone(&self) -> Tz {
        self.local.timezone()
    }

    pub fn date(&self) -> NaiveDate {
        self.local.date_naive()
    }

    pub fn time(&self) -> NaiveTime {
        self.local.time()
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.utc.timestamp_millis()
    }
}

impl fmt::Display for NormalizedInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.local.format("%Y-%m-%d %H:%M:%S %Z"))
    }
}

/// Parses `raw` in the first recognized encoding and re-expresses it in the
/// exchange zone of `market`.
///
/// Encodings are tried in order:
/// 1. ISO-8601, with or without an offset (no offset means exchange-local),
/// 2. `yyyy-MM-dd HH:mm:ss` in exchange-local civil time,
/// 3. `MM/dd/yyyy HH:mm:ss` in the market's secondary zone (US Pacific).
pub fn normalize(raw: &str, market: MarketTimezone) -> Result<NormalizedInstant, RowError> {
    let text = raw.trim();
    let zone = market.timezone();

    let offset_aware = DateTime::parse_from_rfc3339(text)
        .ok()
        .or_else(|| ISO_OFFSET_FORMATS.iter().find_map(|format| DateTime::parse_from_str(text, format).ok()));
    if let Some(dt) = offset_aware {
        return Ok(NormalizedInstant::from_utc(dt.with_timezone(&Utc), zone));
    }

    for format in ISO_LOCAL_FORMATS.iter().chain(std::iter::once(&EXCHANGE_LOCAL_FORMAT)) {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return market
                .localize(&naive)
                .map(NormalizedInstant::from_zoned)
                .ok_or_else(|| malformed(raw));
        }
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(text, SECONDARY_ZONE_FORMAT) {
        return market
            .secondary_timezone()
            .from_local_datetime(&naive)
            .earliest()
            .map(|origin| NormalizedInstant::from_utc(origin.with_timezone(&Utc), zone))
            .ok_or_else(|| malformed(raw));
    }

    Err(malformed(raw))
}

fn malformed(raw: &str) -> RowError {
    RowError::MalformedTimestamp(raw.to_string())
}
