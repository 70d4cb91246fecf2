// src/clock.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::calendar::{is_weekend, TradingCalendar};
use crate::normalizer::NormalizedInstant;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant. Used for replays of past sessions.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPhase {
    PreOpen,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    pub phase: ClockPhase,
    /// Next state boundary: session close while open, otherwise the next open.
    pub boundary: NormalizedInstant,
    pub remaining: ChronoDuration,
}

impl ClockState {
    pub fn compute<T: TimeZone>(calendar: &TradingCalendar, now: &DateTime<T>) -> Self {
        let local = calendar.local(now);
        let time = local.time();

        let (phase, boundary) = if is_weekend(local.date_naive()) || time > calendar.close() {
            (ClockPhase::Closed, calendar.next_session_open(now))
        } else if time < calendar.open() {
            (ClockPhase::PreOpen, calendar.next_session_open(now))
        } else {
            (ClockPhase::Open, calendar.session_close_on(now))
        };

        let remaining = (boundary.with_timezone(&Utc) - now.with_timezone(&Utc)).max(ChronoDuration::zero());

        ClockState {
            phase,
            boundary: NormalizedInstant::from_zoned(boundary),
            remaining,
        }
    }

    pub fn is_open(&self) -> bool {
        self.phase == ClockPhase::Open
    }

    /// Remaining time as `HH:MM:SS`; hours are not wrapped at 24.
    pub fn countdown(&self) -> String {
        let total = self.remaining.num_seconds().max(0);
        format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
    }
}

/// Recomputes the [`ClockState`] from wall-clock time on every tick.
pub struct SessionClock {
    calendar: TradingCalendar,
    period: Duration,
    source: Arc<dyn Clock>,
}

impl SessionClock {
    pub fn new(calendar: TradingCalendar, period: Duration) -> Self {
        SessionClock { calendar, period, source: Arc::new(SystemClock) }
    }

    pub fn with_source(mut self, source: Arc<dyn Clock>) -> Self {
        self.source = source;
        self
    }

    pub fn current(&self) -> ClockState {
        ClockState::compute(&self.calendar, &self.source.now())
    }

    /// Starts the recurring tick, publishing into `state` until `cancel` fires.
    /// A tick racing with cancellation never reaches `state`.
    pub fn spawn(self, state: Arc<watch::Sender<ClockState>>, cancel: CancellationToken) -> ClockHandle {
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        break;
                    }
                    _ = ticker.tick() => {
                        let next = self.current();
                        state.send_if_modified(|current| {
                            if token.is_cancelled() {
                                return false;
                            }
                            *current = next;
                            true
                        });
                        trace!(phase = ?next.phase, countdown = %next.countdown(), "session clock tick");
                    }
                }
            }
            debug!("session clock stopped");
        });

        ClockHandle { cancel, task: Some(task) }
    }
}

pub struct ClockHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ClockHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancels the tick and waits for the task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
