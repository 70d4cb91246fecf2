// src/calendar.rs

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;

use crate::config::AlignerConfig;
use crate::market_timezone::MarketTimezone;

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Fixed weekly schedule: every weekday trades from `open` to `close`
/// exchange-local. Holidays are not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingCalendar {
    market: MarketTimezone,
    open: NaiveTime,
    close: NaiveTime,
}

impl TradingCalendar {
    pub fn new(market: MarketTimezone, open: NaiveTime, close: NaiveTime) -> Self {
        TradingCalendar { market, open, close }
    }

    pub fn for_market(market: MarketTimezone) -> Self {
        let (open, close) = market.working_hours();
        Self::new(market, open, close)
    }

    pub fn from_config(config: &AlignerConfig) -> Self {
        Self::new(config.market, config.session_open, config.session_close)
    }

    pub fn market(&self) -> MarketTimezone {
        self.market
    }

    pub fn open(&self) -> NaiveTime {
        self.open
    }

    pub fn close(&self) -> NaiveTime {
        self.close
    }

    pub fn local<T: TimeZone>(&self, now: &DateTime<T>) -> DateTime<Tz> {
        now.with_timezone(&self.market.timezone())
    }

    /// True between open and close (both inclusive) on a weekday.
    pub fn is_trading_session<T: TimeZone>(&self, now: &DateTime<T>) -> bool {
        let local = self.local(now);
        let time = local.time();
        !is_weekend(local.date_naive()) && time >= self.open && time <= self.close
    }

    /// The trading day whose session counts as "previous" at `now`.
    ///
    /// The day boundary is session close, not midnight: once today's session
    /// has closed, today itself is the previous trading day. Before close the
    /// previous weekday is used, and on weekends the most recent Friday.
    pub fn previous_trading_day<T: TimeZone>(&self, now: &DateTime<T>) -> NaiveDate {
        let local = self.local(now);
        let today = local.date_naive();

        if !is_weekend(today) && local.time() > self.close {
            return today;
        }
        previous_weekday(today)
    }

    /// Today's open if `now` is a weekday before open, otherwise the open of
    /// the next weekday (Friday rolls to Monday).
    pub fn next_session_open<T: TimeZone>(&self, now: &DateTime<T>) -> DateTime<Tz> {
        let local = self.local(now);
        let today = local.date_naive();

        let day = if !is_weekend(today) && local.time() < self.open {
            today
        } else {
            next_weekday(today)
        };
        self.at(day, self.open)
    }

    /// Session close on the exchange-local date of `now`.
    pub fn session_close_on<T: TimeZone>(&self, now: &DateTime<T>) -> DateTime<Tz> {
        self.at(self.local(now).date_naive(), self.close)
    }

    pub fn session_bounds(&self, date: NaiveDate) -> Result<(DateTime<Tz>, DateTime<Tz>), String> {
        self.market.market_hours_on_date(date, self.open, self.close)
    }

    fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
        let naive = date.and_time(time);
        // Session boundaries never land in a DST gap for the supported zones.
        self.market
            .localize(&naive)
            .unwrap_or_else(|| self.market.timezone().from_utc_datetime(&naive))
    }
}

fn previous_weekday(date: NaiveDate) -> NaiveDate {
    let mut day = date - ChronoDuration::days(1);
    while is_weekend(day) {
        day -= ChronoDuration::days(1);
    }
    day
}

fn next_weekday(date: NaiveDate) -> NaiveDate {
    let mut day = date + ChronoDuration::days(1);
    while is_weekend(day) {
        day += ChronoDuration::days(1);
    }
    day
}
