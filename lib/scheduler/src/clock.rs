//! Time source for the scheduler.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use std::fmt;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time anchored to the tokio timer.
///
/// Reads `Utc::now()` once and advances by tokio's monotonic clock from
/// then on, so the engine's sleeps and the timestamps it records agree.
/// Under `tokio::time::pause` the clock follows simulated time.
///
/// Readings are truncated to microseconds, the precision of a Postgres
/// `TIMESTAMPTZ`, so a stored timestamp reads back unchanged.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_utc: DateTime<Utc>,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    /// Anchors the clock at the current wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Anchors the clock so that "now" reads as `at`.
    #[must_use]
    pub fn anchored_at(at: DateTime<Utc>) -> Self {
        Self {
            anchor_utc: at,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.anchor.elapsed()).unwrap_or(TimeDelta::MAX);
        self.anchor_utc
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .trunc_subsecs(6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn follows_simulated_time() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = TokioClock::anchored_at(start);
        assert_eq!(clock.now(), start);

        tokio::time::sleep(Duration::from_secs(90)).await;
        let elapsed = clock.now() - start;
        assert!(elapsed >= TimeDelta::seconds(90));
        assert!(elapsed < TimeDelta::seconds(90) + TimeDelta::milliseconds(5));
    }

    #[tokio::test(start_paused = true)]
    async fn readings_have_microsecond_precision() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
            + TimeDelta::nanoseconds(123_456_789);
        let clock = TokioClock::anchored_at(start);
        assert_eq!(clock.now().timestamp_subsec_nanos(), 123_456_000);

        tokio::time::sleep(Duration::from_nanos(1_500_250)).await;
        let now = clock.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
        assert_eq!(now, now.trunc_subsecs(6));
    }
}
