// tests/clock_tests.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;
use chrono_tz::US::Eastern;
use sessionalign::{Clock, ClockPhase, ClockState, FixedClock, MarketTimezone, SessionClock, TradingCalendar};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

fn eastern(day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Tz> {
    Eastern.with_ymd_and_hms(2024, 1, day, hour, minute, second).unwrap()
}

fn calendar() -> TradingCalendar {
    TradingCalendar::for_market(MarketTimezone::Eastern)
}

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn at(now: DateTime<Tz>) -> Arc<Self> {
        Arc::new(ManualClock(Mutex::new(now.with_timezone(&Utc))))
    }

    fn set(&self, now: DateTime<Tz>) {
        *self.0.lock().unwrap() = now.with_timezone(&Utc);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[test]
fn test_saturday_is_closed_until_monday_open() {
    let state = ClockState::compute(&calendar(), &eastern(6, 10, 0, 0));

    assert_eq!(state.phase, ClockPhase::Closed);
    assert_eq!(state.boundary.local(), eastern(8, 9, 30, 0));
    assert_eq!(state.remaining, ChronoDuration::minutes(47 * 60 + 30));
    assert_eq!(state.countdown(), "47:30:00");
}

#[test]
fn test_pre_open_counts_down_to_open() {
    let state = ClockState::compute(&calendar(), &eastern(9, 8, 0, 0));

    assert_eq!(state.phase, ClockPhase::PreOpen);
    assert_eq!(state.boundary.local(), eastern(9, 9, 30, 0));
    assert_eq!(state.countdown(), "01:30:00");
}

#[test]
fn test_open_counts_down_to_close() {
    let calendar = calendar();

    let at_open = ClockState::compute(&calendar, &eastern(9, 9, 30, 0));
    assert_eq!(at_open.phase, ClockPhase::Open);
    assert!(at_open.is_open());
    assert_eq!(at_open.boundary.local(), eastern(9, 16, 0, 0));
    assert_eq!(at_open.countdown(), "06:30:00");

    let at_close = ClockState::compute(&calendar, &eastern(9, 16, 0, 0));
    assert_eq!(at_close.phase, ClockPhase::Open);
    assert_eq!(at_close.remaining, ChronoDuration::zero());
}

#[test]
fn test_after_close_targets_next_open() {
    let calendar = calendar();

    let tuesday = ClockState::compute(&calendar, &eastern(9, 16, 0, 1));
    assert_eq!(tuesday.phase, ClockPhase::Closed);
    assert_eq!(tuesday.boundary.local(), eastern(10, 9, 30, 0));

    let friday = ClockState::compute(&calendar, &eastern(5, 17, 0, 0));
    assert_eq!(friday.phase, ClockPhase::Closed);
    assert_eq!(friday.boundary.local(), eastern(8, 9, 30, 0));
}

#[tokio::test(start_paused = true)]
async fn test_clock_recomputes_from_wall_clock_each_tick() {
    let calendar = calendar();
    let source = ManualClock::at(eastern(9, 9, 29, 58));
    let (tx, mut rx) = watch::channel(ClockState::compute(&calendar, &source.now()));

    let handle = SessionClock::new(calendar, Duration::from_secs(1))
        .with_source(source.clone())
        .spawn(Arc::new(tx), CancellationToken::new());

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().phase, ClockPhase::PreOpen);

    source.set(eastern(9, 9, 30, 0));
    rx.changed().await.unwrap();
    let state = *rx.borrow_and_update();
    assert_eq!(state.phase, ClockPhase::Open);
    assert_eq!(state.countdown(), "06:30:00");

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_clock_stops_publishing() {
    let calendar = calendar();
    let source = Arc::new(FixedClock(eastern(6, 10, 0, 0).with_timezone(&Utc)));
    let (tx, mut rx) = watch::channel(ClockState::compute(&calendar, &source.now()));
    let tx = Arc::new(tx);
    let token = CancellationToken::new();

    let handle = SessionClock::new(calendar, Duration::from_secs(1))
        .with_source(source)
        .spawn(Arc::clone(&tx), token.clone());

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().phase, ClockPhase::Closed);

    token.cancel();
    handle.stop().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_cancels_clock() {
    let calendar = calendar();
    let source = Arc::new(FixedClock(eastern(9, 11, 0, 0).with_timezone(&Utc)));
    let (tx, mut rx) = watch::channel(ClockState::compute(&calendar, &source.now()));
    let tx = Arc::new(tx);

    let handle = SessionClock::new(calendar, Duration::from_secs(1))
        .with_source(source)
        .spawn(Arc::clone(&tx), CancellationToken::new());

    rx.changed().await.unwrap();
    rx.borrow_and_update();
    drop(handle);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!rx.has_changed().unwrap());
}
