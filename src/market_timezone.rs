// src/market_timezone.rs

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;

/// Exchanges whose session hours are known. Each one fixes the zone in which
/// session boundaries are defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketTimezone {
    #[default]
    Eastern,
    Central,
    // Additional market timezones can be added here
}

impl MarketTimezone {
    // Returns the regular session hours for the market
    pub fn working_hours(&self) -> (NaiveTime, NaiveTime) {
        match self {
            MarketTimezone::Eastern => (hm(9, 30), hm(16, 0)),
            MarketTimezone::Central => (hm(8, 30), hm(15, 0)),
        }
    }

    // Returns the timezone corresponding to the market
    pub fn timezone(&self) -> Tz {
        match self {
            MarketTimezone::Eastern => chrono_tz::US::Eastern,
            MarketTimezone::Central => chrono_tz::US::Central,
        }
    }

    /// Zone that `MM/dd/yyyy HH:mm:ss` timestamps are written in.
    pub fn secondary_timezone(&self) -> Tz {
        chrono_tz::US::Pacific
    }

    /// Resolves a civil time in the exchange zone. A time repeated by a DST
    /// fold resolves to its earliest instant; a time skipped by a DST gap is `None`.
    pub fn localize(&self, naive: &NaiveDateTime) -> Option<DateTime<Tz>> {
        self.timezone().from_local_datetime(naive).earliest()
    }

    /// Start and end of a session running `start_time..end_time` on `date`.
    pub fn market_hours_on_date(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<(DateTime<Tz>, DateTime<Tz>), String> {
        let start_tz_datetime = self
            .localize(&NaiveDateTime::new(date, start_time))
            .ok_or_else(|| format!("Unable to determine unique timezone datetime for start on {date}"))?;
        let end_tz_datetime = self
            .localize(&NaiveDateTime::new(date, end_time))
            .ok_or_else(|| format!("Unable to determine unique timezone datetime for end on {date}"))?;

        Ok((start_tz_datetime, end_tz_datetime))
    }
}

impl FromStr for MarketTimezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eastern" | "us/eastern" | "america/new_york" => Ok(MarketTimezone::Eastern),
            "central" | "us/central" | "america/chicago" => Ok(MarketTimezone::Central),
            other => Err(format!("unsupported market timezone {other:?}")),
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}
