//! Execution history.
//!
//! Every firing, scheduled or manual, appends exactly one record. Records
//! refer to their trigger by name only, so they can outlive it.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_triggers_core::ExecutionId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;

/// Outcome of a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The action completed.
    Success,
    /// The action returned an error or panicked.
    Failure,
}

impl Outcome {
    /// Returns the snake_case name used in storage and on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

/// One firing of a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique identifier.
    pub id: ExecutionId,
    /// Name of the trigger that fired.
    pub trigger_name: String,
    /// Due time the engine fired for; `None` for manual firings.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// When the action started.
    pub executed_at: DateTime<Utc>,
    /// Whether the action succeeded.
    pub outcome: Outcome,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// The trigger payload handed to the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
}

impl ExecutionRecord {
    /// Creates a successful record.
    #[must_use]
    pub fn success(
        trigger_name: impl Into<String>,
        scheduled_for: Option<DateTime<Utc>>,
        executed_at: DateTime<Utc>,
        payload: Option<JsonValue>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            trigger_name: trigger_name.into(),
            scheduled_for,
            executed_at,
            outcome: Outcome::Success,
            error_detail: None,
            payload,
        }
    }

    /// Creates a failed record.
    #[must_use]
    pub fn failure(
        trigger_name: impl Into<String>,
        scheduled_for: Option<DateTime<Utc>>,
        executed_at: DateTime<Utc>,
        payload: Option<JsonValue>,
        error_detail: impl Into<String>,
    ) -> Self {
        Self {
            outcome: Outcome::Failure,
            error_detail: Some(error_detail.into()),
            ..Self::success(trigger_name, scheduled_for, executed_at, payload)
        }
    }

    /// Returns whether the firing succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Trait for the append-only execution log.
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    /// Appends a record.
    async fn append(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Lists all records, oldest first.
    async fn list(&self) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Lists the records of one trigger, oldest first.
    async fn list_for(&self, trigger_name: &str) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Deletes the records of one trigger, returning how many were removed.
    async fn delete_for(&self, trigger_name: &str) -> Result<u64, StoreError>;

    /// Deletes one record, returning whether it existed.
    async fn delete(&self, id: &ExecutionId) -> Result<bool, StoreError>;
}

/// In-memory implementation of [`ExecutionLog`].
#[derive(Debug, Default)]
pub struct InMemoryExecutionLog {
    records: RwLock<Vec<ExecutionRecord>>,
}

impl InMemoryExecutionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_execution_time(a: &ExecutionRecord, b: &ExecutionRecord) -> std::cmp::Ordering {
    a.executed_at.cmp(&b.executed_at).then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl ExecutionLog for InMemoryExecutionLog {
    async fn append(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        let mut records = self.records.read().await.clone();
        records.sort_by(by_execution_time);
        Ok(records)
    }

    async fn list_for(&self, trigger_name: &str) -> Result<Vec<ExecutionRecord>, StoreError> {
        let mut records: Vec<ExecutionRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.trigger_name == trigger_name)
            .cloned()
            .collect();
        records.sort_by(by_execution_time);
        Ok(records)
    }

    async fn delete_for(&self, trigger_name: &str) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.trigger_name != trigger_name);
        Ok((before - records.len()) as u64)
    }

    async fn delete(&self, id: &ExecutionId) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| &r.id != id);
        Ok(records.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use serde_json::json;

    #[test]
    fn failure_record_carries_detail() {
        let now = Utc::now();
        let record = ExecutionRecord::failure("ping", Some(now), now, None, "timeout");

        assert!(!record.is_success());
        assert_eq!(record.error_detail.as_deref(), Some("timeout"));
        assert_eq!(record.scheduled_for, Some(now));
    }

    #[test]
    fn record_json_shape() {
        let now = Utc::now();
        let record = ExecutionRecord::success("x", None, now, Some(json!({"a": 1})));
        let value = serde_json::to_value(&record).expect("serialize");

        assert_eq!(value["trigger_name"], "x");
        assert_eq!(value["outcome"], "success");
        assert_eq!(value["payload"], json!({"a": 1}));
        assert!(value.get("error_detail").is_none());
    }

    #[tokio::test]
    async fn list_for_filters_and_orders() {
        let log = InMemoryExecutionLog::new();
        let now = Utc::now();
        let later = now + TimeDelta::seconds(5);

        log.append(&ExecutionRecord::success("ping", None, later, None))
            .await
            .unwrap();
        log.append(&ExecutionRecord::success("other", None, now, None))
            .await
            .unwrap();
        log.append(&ExecutionRecord::success("ping", None, now, None))
            .await
            .unwrap();

        let ping = log.list_for("ping").await.unwrap();
        assert_eq!(ping.len(), 2);
        assert_eq!(ping[0].executed_at, now);
        assert_eq!(ping[1].executed_at, later);
        assert_eq!(log.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn delete_for_removes_only_that_trigger() {
        let log = InMemoryExecutionLog::new();
        let now = Utc::now();
        for name in ["ping", "ping", "other"] {
            log.append(&ExecutionRecord::success(name, None, now, None))
                .await
                .unwrap();
        }

        assert_eq!(log.delete_for("ping").await.unwrap(), 2);
        let remaining = log.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].trigger_name, "other");
    }

    #[tokio::test]
    async fn delete_removes_one_record() {
        let log = InMemoryExecutionLog::new();
        let now = Utc::now();
        let first = ExecutionRecord::success("ping", None, now, None);
        let second = ExecutionRecord::success("ping", None, now, None);
        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        assert!(log.delete(&first.id).await.unwrap());
        assert!(!log.delete(&first.id).await.unwrap());
        assert_eq!(log.list().await.unwrap(), vec![second]);
    }
}
