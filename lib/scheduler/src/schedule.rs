//! Due-time arithmetic and missed-firing handling.
//!
//! Recurring triggers live on a fixed grid `created_at + k * interval`.
//! Every computation here stays on that grid, so execution latency never
//! shifts later firings.

use crate::config::OverduePolicy;
use crate::trigger::{Period, Trigger, TriggerSchedule, TriggerStatus};
use chrono::{DateTime, TimeDelta, Utc};

/// Returns the last grid slot `base + k * period` (k >= 0) that is not
/// later than `now`, or `base` itself if `now` is earlier.
#[must_use]
pub fn latest_slot_at_or_before(
    base: DateTime<Utc>,
    period: Period,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if now <= base {
        return base;
    }
    let behind = (now - base).num_microseconds().unwrap_or(i64::MAX);
    let step = period.as_delta().num_microseconds().unwrap_or(i64::MAX);
    base + TimeDelta::microseconds((behind / step).saturating_mul(step))
}

/// Returns the first grid slot `base + k * period` (k >= 0) that is not
/// earlier than `now`.
#[must_use]
pub fn first_slot_at_or_after(
    base: DateTime<Utc>,
    period: Period,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let latest = latest_slot_at_or_before(base, period, now);
    if latest >= now {
        latest
    } else {
        latest + period.as_delta()
    }
}

/// Returns the due time following a recurring firing scheduled at `fired`.
///
/// Normally `fired + interval`. If the engine fell more than a whole
/// interval behind, missed slots are skipped rather than replayed.
#[must_use]
pub fn next_recurring_fire(
    fired: DateTime<Utc>,
    interval: Period,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    first_slot_at_or_after(fired + interval.as_delta(), interval, now)
}

/// How a stored trigger is treated when the engine starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPlan {
    /// Insert into the pending-fire index at this time.
    Schedule(DateTime<Utc>),
    /// Overdue one-shot dropped by policy; mark terminal without firing.
    Drop,
    /// Not scheduled: manual or already terminal.
    Skip,
}

/// Decides how a stored trigger re-enters the engine at startup.
///
/// The due time comes from the persisted `next_fire_at`, falling back to
/// `created_at + schedule`. Recurring triggers resume on their grid; overdue
/// one-shot triggers follow `overdue`.
#[must_use]
pub fn startup_plan(trigger: &Trigger, now: DateTime<Utc>, overdue: OverduePolicy) -> StartupPlan {
    if trigger.status == TriggerStatus::Terminal {
        return StartupPlan::Skip;
    }
    let Some(first) = trigger.schedule.first_fire_at(trigger.created_at) else {
        return StartupPlan::Skip;
    };
    let due = trigger.next_fire_at.unwrap_or(first);

    match trigger.schedule {
        TriggerSchedule::Recurring { interval } => {
            StartupPlan::Schedule(first_slot_at_or_after(due, interval, now))
        }
        TriggerSchedule::OneShot { .. } if due >= now => StartupPlan::Schedule(due),
        TriggerSchedule::OneShot { .. } => match overdue {
            OverduePolicy::FireImmediately => StartupPlan::Schedule(now),
            OverduePolicy::Drop => StartupPlan::Drop,
        },
        TriggerSchedule::Manual => StartupPlan::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn secs(n: i64) -> TimeDelta {
        TimeDelta::seconds(n)
    }

    fn period(n: i64) -> Period {
        Period::from_secs(n).unwrap()
    }

    #[test]
    fn slot_in_future_is_unchanged() {
        let base = t0() + secs(10);
        assert_eq!(first_slot_at_or_after(base, period(5), t0()), base);
    }

    #[test]
    fn slot_fast_forwards_along_grid() {
        // Grid 0, 5, 10, 15 ...; now = 12 -> 15.
        assert_eq!(
            first_slot_at_or_after(t0(), period(5), t0() + secs(12)),
            t0() + secs(15)
        );
        // Exactly on a slot is due now.
        assert_eq!(
            first_slot_at_or_after(t0(), period(5), t0() + secs(10)),
            t0() + secs(10)
        );
    }

    #[test]
    fn slot_lookup_keeps_sub_second_offsets() {
        let base = t0() + TimeDelta::microseconds(250_001);
        let now = base + secs(10) + TimeDelta::microseconds(1);

        assert_eq!(first_slot_at_or_after(base, period(5), now), base + secs(15));
        assert_eq!(latest_slot_at_or_before(base, period(5), now), base + secs(10));
        assert_eq!(latest_slot_at_or_before(base, period(5), t0()), base);
    }

    #[test]
    fn recurring_next_does_not_drift() {
        let mut fired = t0() + secs(5);
        for _ in 0..1_000 {
            // Fired late by 300ms every time; the grid is unaffected.
            let now = fired + TimeDelta::milliseconds(300);
            fired = next_recurring_fire(fired, period(5), now);
        }
        assert_eq!(fired, t0() + secs(5 + 5 * 1_000));
    }

    #[test]
    fn recurring_next_skips_missed_slots() {
        let fired = t0() + secs(5);
        let now = t0() + secs(23);
        assert_eq!(next_recurring_fire(fired, period(5), now), t0() + secs(25));
    }

    fn recurring(created_at: DateTime<Utc>, every: i64) -> Trigger {
        Trigger::new(
            "ping",
            TriggerSchedule::Recurring {
                interval: period(every),
            },
            None,
            created_at,
        )
    }

    fn one_shot(created_at: DateTime<Utc>, delay: i64) -> Trigger {
        Trigger::new(
            "once",
            TriggerSchedule::OneShot {
                delay: period(delay),
            },
            None,
            created_at,
        )
    }

    #[test]
    fn startup_recurring_uses_persisted_next_fire() {
        let mut trigger = recurring(t0(), 60);
        trigger.next_fire_at = Some(t0() + secs(180));

        assert_eq!(
            startup_plan(&trigger, t0() + secs(150), OverduePolicy::FireImmediately),
            StartupPlan::Schedule(t0() + secs(180))
        );
    }

    #[test]
    fn startup_recurring_overdue_resumes_on_grid() {
        let trigger = recurring(t0(), 60);
        assert_eq!(
            startup_plan(&trigger, t0() + secs(601), OverduePolicy::Drop),
            StartupPlan::Schedule(t0() + secs(660))
        );
    }

    #[test]
    fn startup_one_shot_pending_keeps_due_time() {
        let trigger = one_shot(t0(), 30);
        assert_eq!(
            startup_plan(&trigger, t0() + secs(10), OverduePolicy::FireImmediately),
            StartupPlan::Schedule(t0() + secs(30))
        );
    }

    #[test]
    fn startup_one_shot_overdue_follows_policy() {
        let trigger = one_shot(t0(), 30);
        let now = t0() + secs(3_600);

        assert_eq!(
            startup_plan(&trigger, now, OverduePolicy::FireImmediately),
            StartupPlan::Schedule(now)
        );
        assert_eq!(
            startup_plan(&trigger, now, OverduePolicy::Drop),
            StartupPlan::Drop
        );
    }

    #[test]
    fn startup_skips_terminal_and_manual() {
        let mut fired = one_shot(t0(), 30);
        fired.status = TriggerStatus::Terminal;
        assert_eq!(
            startup_plan(&fired, t0(), OverduePolicy::FireImmediately),
            StartupPlan::Skip
        );

        let manual = Trigger::new("x", TriggerSchedule::Manual, None, t0());
        assert_eq!(
            startup_plan(&manual, t0(), OverduePolicy::FireImmediately),
            StartupPlan::Skip
        );
    }
}
