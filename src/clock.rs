//! Time source for the scheduled workload.
//!
//! The scheduler only sleeps and reads the wall clock through [`Clock`], so
//! tests can swap in [`ManualClock`] and run every round without waiting.

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Wall clock plus an async sleep.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real time backed by the system clock and `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Deterministic clock: sleeping completes immediately and advances `now`.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    slept: Duration,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                slept: Duration::ZERO,
            }),
        }
    }

    /// Move the clock forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }

    /// Total time requested through [`Clock::sleep`].
    pub fn total_slept(&self) -> Duration {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).slept
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).now
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.advance(duration);
        self.state.lock().unwrap_or_else(PoisonError::into_inner).slept += duration;
        future::ready(()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        clock.sleep(Duration::from_secs(5)).await;
        clock.sleep(Duration::from_secs(2)).await;

        assert_eq!(clock.total_slept(), Duration::from_secs(7));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(7));
    }

    #[test]
    fn test_advance_does_not_count_as_sleep() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        clock.advance(Duration::from_secs(60));

        assert_eq!(clock.total_slept(), Duration::ZERO);
        assert_eq!(clock.now(), start + chrono::Duration::minutes(1));
    }
}
