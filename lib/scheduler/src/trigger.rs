//! Trigger definitions and registration requests.
//!
//! A trigger is identified by its name. Its schedule is a tagged enum so a
//! one-shot trigger cannot carry an interval, a recurring trigger cannot lack
//! one, and a manual trigger has neither.

use crate::error::TriggerError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Longest accepted delay or interval: ten years.
pub const MAX_PERIOD_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// Longest accepted trigger name.
pub const MAX_NAME_LEN: usize = 128;

/// The kind of trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fires once, `delay` after creation.
    OneShot,
    /// Fires every `interval`, starting one interval after creation.
    Recurring,
    /// Never fires on its own; fired explicitly by a caller.
    Manual,
}

impl TriggerKind {
    /// Returns the snake_case name used in storage and on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneShot => "one_shot",
            Self::Recurring => "recurring",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_shot" => Ok(Self::OneShot),
            "recurring" => Ok(Self::Recurring),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown trigger kind '{other}'")),
        }
    }
}

/// A strictly positive, bounded number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Period {
    secs: i64,
}

impl Period {
    /// Creates a period from whole seconds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchedule` if `secs` is not in `1..=MAX_PERIOD_SECONDS`.
    pub fn from_secs(secs: i64) -> Result<Self, TriggerError> {
        if secs <= 0 {
            return Err(TriggerError::InvalidSchedule {
                reason: format!("schedule must be a positive number of seconds, got {secs}"),
            });
        }
        if secs > MAX_PERIOD_SECONDS {
            return Err(TriggerError::InvalidSchedule {
                reason: format!("schedule of {secs}s exceeds the maximum of {MAX_PERIOD_SECONDS}s"),
            });
        }
        Ok(Self { secs })
    }

    /// Returns the period in whole seconds.
    #[must_use]
    pub const fn as_secs(&self) -> i64 {
        self.secs
    }

    /// Returns the period as a chrono delta for timestamp arithmetic.
    #[must_use]
    pub fn as_delta(&self) -> TimeDelta {
        TimeDelta::seconds(self.secs)
    }
}

impl TryFrom<i64> for Period {
    type Error = TriggerError;

    fn try_from(secs: i64) -> Result<Self, Self::Error> {
        Self::from_secs(secs)
    }
}

impl From<Period> for i64 {
    fn from(period: Period) -> Self {
        period.secs
    }
}

/// When a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSchedule {
    /// Fires once at `created_at + delay`.
    OneShot {
        #[serde(rename = "delay_seconds")]
        delay: Period,
    },
    /// Fires at `created_at + k * interval` for k = 1, 2, ...
    Recurring {
        #[serde(rename = "interval_seconds")]
        interval: Period,
    },
    /// Fired only on request.
    Manual,
}

impl TriggerSchedule {
    /// Returns the trigger kind for this schedule.
    #[must_use]
    pub const fn kind(&self) -> TriggerKind {
        match self {
            Self::OneShot { .. } => TriggerKind::OneShot,
            Self::Recurring { .. } => TriggerKind::Recurring,
            Self::Manual => TriggerKind::Manual,
        }
    }

    /// Returns the delay or interval, if any.
    #[must_use]
    pub const fn period(&self) -> Option<Period> {
        match self {
            Self::OneShot { delay } => Some(*delay),
            Self::Recurring { interval } => Some(*interval),
            Self::Manual => None,
        }
    }

    /// Returns the first due time for a trigger created at `created_at`.
    #[must_use]
    pub fn first_fire_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.period().map(|p| created_at + p.as_delta())
    }

    /// Builds a schedule from its stored representation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchedule` if the kind and the period disagree.
    pub fn from_parts(kind: TriggerKind, period_secs: Option<i64>) -> Result<Self, TriggerError> {
        match (kind, period_secs) {
            (TriggerKind::OneShot, Some(secs)) => Ok(Self::OneShot {
                delay: Period::from_secs(secs)?,
            }),
            (TriggerKind::Recurring, Some(secs)) => Ok(Self::Recurring {
                interval: Period::from_secs(secs)?,
            }),
            (TriggerKind::Manual, None) => Ok(Self::Manual),
            (TriggerKind::Manual, Some(_)) => Err(TriggerError::InvalidSchedule {
                reason: "manual triggers do not take a schedule".to_string(),
            }),
            (kind, None) => Err(TriggerError::InvalidSchedule {
                reason: format!("{kind} triggers require a schedule"),
            }),
        }
    }
}

/// Lifecycle status of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    /// Manual trigger, never scheduled.
    Idle,
    /// Waiting in the timer engine for its next due time.
    Scheduled,
    /// A firing is in flight.
    Firing,
    /// One-shot trigger that has fired or was dropped; never fires again.
    Terminal,
}

impl TriggerStatus {
    /// Returns the snake_case name used in storage and on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::Firing => "firing",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "scheduled" => Ok(Self::Scheduled),
            "firing" => Ok(Self::Firing),
            "terminal" => Ok(Self::Terminal),
            other => Err(format!("unknown trigger status '{other}'")),
        }
    }
}

/// A registered trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Unique, immutable name.
    pub name: String,
    /// Kind and period.
    #[serde(flatten)]
    pub schedule: TriggerSchedule,
    /// Opaque data handed to the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    /// Current lifecycle status.
    pub status: TriggerStatus,
    /// When the trigger was registered.
    pub created_at: DateTime<Utc>,
    /// Next due time, maintained by the timer engine.
    pub next_fire_at: Option<DateTime<Utc>>,
}

impl Trigger {
    /// Creates a trigger registered at `created_at`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        schedule: TriggerSchedule,
        payload: Option<JsonValue>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let status = match schedule {
            TriggerSchedule::Manual => TriggerStatus::Idle,
            _ => TriggerStatus::Scheduled,
        };
        Self {
            name: name.into(),
            schedule,
            payload,
            status,
            created_at,
            next_fire_at: schedule.first_fire_at(created_at),
        }
    }

    /// Returns the trigger kind.
    #[must_use]
    pub const fn kind(&self) -> TriggerKind {
        self.schedule.kind()
    }

    /// Returns whether the timer engine should ever see this trigger.
    #[must_use]
    pub const fn is_scheduled_kind(&self) -> bool {
        !matches!(self.schedule, TriggerSchedule::Manual)
    }
}

/// A request to register a trigger, as received from callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterTrigger {
    /// Unique trigger name.
    pub name: String,
    /// Trigger kind.
    pub kind: TriggerKind,
    /// Delay for one-shot triggers.
    #[serde(default)]
    pub delay_seconds: Option<i64>,
    /// Interval for recurring triggers.
    #[serde(default)]
    pub interval_seconds: Option<i64>,
    /// Optional payload.
    #[serde(default)]
    pub payload: Option<JsonValue>,
}

impl RegisterTrigger {
    /// A one-shot trigger firing `delay_seconds` after registration.
    #[must_use]
    pub fn one_shot(name: impl Into<String>, delay_seconds: i64) -> Self {
        Self {
            name: name.into(),
            kind: TriggerKind::OneShot,
            delay_seconds: Some(delay_seconds),
            interval_seconds: None,
            payload: None,
        }
    }

    /// A recurring trigger firing every `interval_seconds`.
    #[must_use]
    pub fn recurring(name: impl Into<String>, interval_seconds: i64) -> Self {
        Self {
            name: name.into(),
            kind: TriggerKind::Recurring,
            delay_seconds: None,
            interval_seconds: Some(interval_seconds),
            payload: None,
        }
    }

    /// A manual trigger.
    #[must_use]
    pub fn manual(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TriggerKind::Manual,
            delay_seconds: None,
            interval_seconds: None,
            payload: None,
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Validates the name and resolves the schedule.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` for a bad name and `InvalidSchedule` when the
    /// schedule fields do not match the kind or are not positive.
    pub fn validate(&self) -> Result<TriggerSchedule, TriggerError> {
        validate_name(&self.name)?;
        let period = match self.kind {
            TriggerKind::OneShot => {
                if self.interval_seconds.is_some() {
                    return Err(TriggerError::InvalidSchedule {
                        reason: "one_shot triggers take delay_seconds, not interval_seconds"
                            .to_string(),
                    });
                }
                self.delay_seconds
            }
            TriggerKind::Recurring => {
                if self.delay_seconds.is_some() {
                    return Err(TriggerError::InvalidSchedule {
                        reason: "recurring triggers take interval_seconds, not delay_seconds"
                            .to_string(),
                    });
                }
                self.interval_seconds
            }
            TriggerKind::Manual => self.delay_seconds.or(self.interval_seconds),
        };
        TriggerSchedule::from_parts(self.kind, period)
    }
}

/// Checks that a trigger name is usable as a key and a URL path segment.
///
/// # Errors
///
/// Returns `InvalidName` describing the first problem found.
pub fn validate_name(name: &str) -> Result<(), TriggerError> {
    let invalid = |reason: &str| TriggerError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 128 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
    {
        return Err(invalid("only letters, digits, '.', '_', ':' and '-' are allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn period_rejects_non_positive() {
        assert!(Period::from_secs(0).is_err());
        assert!(Period::from_secs(-5).is_err());
        assert!(Period::from_secs(MAX_PERIOD_SECONDS + 1).is_err());
        assert_eq!(Period::from_secs(5).unwrap().as_secs(), 5);
    }

    #[test]
    fn new_trigger_computes_first_fire() {
        let schedule = TriggerSchedule::Recurring {
            interval: Period::from_secs(5).unwrap(),
        };
        let trigger = Trigger::new("ping", schedule, None, epoch());

        assert_eq!(trigger.kind(), TriggerKind::Recurring);
        assert_eq!(trigger.status, TriggerStatus::Scheduled);
        assert_eq!(trigger.next_fire_at, Some(epoch() + TimeDelta::seconds(5)));
    }

    #[test]
    fn manual_trigger_has_no_fire_time() {
        let trigger = Trigger::new("x", TriggerSchedule::Manual, Some(json!({"a": 1})), epoch());

        assert_eq!(trigger.status, TriggerStatus::Idle);
        assert_eq!(trigger.next_fire_at, None);
        assert!(!trigger.is_scheduled_kind());
    }

    #[test]
    fn register_validates_schedule_for_kind() {
        assert!(matches!(
            RegisterTrigger::one_shot("once", 3).validate(),
            Ok(TriggerSchedule::OneShot { .. })
        ));
        assert!(matches!(
            RegisterTrigger::recurring("ping", 0).validate(),
            Err(TriggerError::InvalidSchedule { .. })
        ));

        let missing = RegisterTrigger {
            interval_seconds: None,
            ..RegisterTrigger::recurring("ping", 5)
        };
        assert!(matches!(
            missing.validate(),
            Err(TriggerError::InvalidSchedule { .. })
        ));

        let crossed = RegisterTrigger {
            interval_seconds: Some(10),
            ..RegisterTrigger::one_shot("once", 3)
        };
        assert!(matches!(
            crossed.validate(),
            Err(TriggerError::InvalidSchedule { .. })
        ));

        let manual_with_delay = RegisterTrigger {
            delay_seconds: Some(1),
            ..RegisterTrigger::manual("x")
        };
        assert!(matches!(
            manual_with_delay.validate(),
            Err(TriggerError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn register_validates_name() {
        assert!(matches!(
            RegisterTrigger::manual("").validate(),
            Err(TriggerError::InvalidName { .. })
        ));
        assert!(matches!(
            RegisterTrigger::manual("has/slash").validate(),
            Err(TriggerError::InvalidName { .. })
        ));
        assert!(RegisterTrigger::manual("billing.sync:eu-1").validate().is_ok());
    }

    #[test]
    fn register_request_from_json() {
        let request: RegisterTrigger = serde_json::from_value(json!({
            "name": "ping",
            "kind": "recurring",
            "interval_seconds": 5
        }))
        .expect("deserialize");

        assert_eq!(request, RegisterTrigger::recurring("ping", 5));
    }

    #[test]
    fn trigger_json_shape() {
        let schedule = TriggerSchedule::OneShot {
            delay: Period::from_secs(3).unwrap(),
        };
        let trigger = Trigger::new("once", schedule, None, epoch());
        let value = serde_json::to_value(&trigger).expect("serialize");

        assert_eq!(value["kind"], "one_shot");
        assert_eq!(value["delay_seconds"], 3);
        assert_eq!(value["status"], "scheduled");
        assert!(value.get("payload").is_none());

        let parsed: Trigger = serde_json::from_value(value).expect("deserialize");
        assert_eq!(parsed, trigger);
    }

    #[test]
    fn kind_and_status_parse_their_names() {
        for kind in [TriggerKind::OneShot, TriggerKind::Recurring, TriggerKind::Manual] {
            assert_eq!(kind.as_str().parse::<TriggerKind>(), Ok(kind));
        }
        assert_eq!("terminal".parse::<TriggerStatus>(), Ok(TriggerStatus::Terminal));
        assert!("waiting".parse::<TriggerStatus>().is_err());
    }
}
