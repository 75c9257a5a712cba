//! PostgreSQL trigger store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_triggers_scheduler::{
    StoreError, Trigger, TriggerKind, TriggerSchedule, TriggerStatus, TriggerStore,
};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for trigger queries.
#[derive(FromRow)]
struct TriggerRow {
    name: String,
    kind: String,
    schedule_seconds: Option<i64>,
    payload: Option<serde_json::Value>,
    status: String,
    created_at: DateTime<Utc>,
    next_fire_at: Option<DateTime<Utc>>,
}

fn invalid_data(message: String) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

impl TriggerRow {
    fn try_into_trigger(self) -> Result<Trigger, sqlx::Error> {
        let kind = TriggerKind::from_str(&self.kind)
            .map_err(|e| invalid_data(format!("trigger '{}': {}", self.name, e)))?;
        let schedule = TriggerSchedule::from_parts(kind, self.schedule_seconds)
            .map_err(|e| invalid_data(format!("trigger '{}': {}", self.name, e)))?;
        let status = TriggerStatus::from_str(&self.status)
            .map_err(|e| invalid_data(format!("trigger '{}': {}", self.name, e)))?;

        Ok(Trigger {
            name: self.name,
            schedule,
            payload: self.payload,
            status,
            created_at: self.created_at,
            next_fire_at: self.next_fire_at,
        })
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable {
        reason: e.to_string(),
    }
}

fn not_found(name: &str) -> StoreError {
    StoreError::NotFound {
        name: name.to_string(),
    }
}

/// [`TriggerStore`] backed by the `triggers` table.
pub struct PgTriggerStore {
    pool: PgPool,
}

impl PgTriggerStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerStore for PgTriggerStore {
    async fn create(&self, trigger: Trigger) -> Result<Trigger, StoreError> {
        // The primary key makes check-and-insert a single atomic statement.
        let inserted = sqlx::query(
            r#"
            INSERT INTO triggers (name, kind, schedule_seconds, payload, status, created_at, next_fire_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(&trigger.name)
        .bind(trigger.kind().as_str())
        .bind(trigger.schedule.period().map(|p| p.as_secs()))
        .bind(&trigger.payload)
        .bind(trigger.status.as_str())
        .bind(trigger.created_at)
        .bind(trigger.next_fire_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists { name: trigger.name });
        }
        Ok(trigger)
    }

    async fn get(&self, name: &str) -> Result<Trigger, StoreError> {
        let row: Option<TriggerRow> = sqlx::query_as(
            r#"
            SELECT name, kind, schedule_seconds, payload, status, created_at, next_fire_at
            FROM triggers
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.ok_or_else(|| not_found(name))?
            .try_into_trigger()
            .map_err(unavailable)
    }

    async fn list(&self) -> Result<Vec<Trigger>, StoreError> {
        let rows: Vec<TriggerRow> = sqlx::query_as(
            r#"
            SELECT name, kind, schedule_seconds, payload, status, created_at, next_fire_at
            FROM triggers
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(|r| r.try_into_trigger().map_err(unavailable))
            .collect()
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM triggers
            WHERE name = $1
            "#,
        )
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if deleted.rows_affected() == 0 {
            return Err(not_found(name));
        }
        Ok(())
    }

    async fn update_next_fire(&self, name: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        // Matches the row even when the guard leaves it unchanged, so a
        // zero count only means the trigger is gone.
        let updated = sqlx::query(
            r#"
            UPDATE triggers
            SET next_fire_at = GREATEST(COALESCE(next_fire_at, $2), $2)
            WHERE name = $1
            "#,
        )
        .bind(name)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if updated.rows_affected() == 0 {
            return Err(not_found(name));
        }
        Ok(())
    }

    async fn update_status(&self, name: &str, status: TriggerStatus) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE triggers
            SET status = $2
            WHERE name = $1
            "#,
        )
        .bind(name)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if updated.rows_affected() == 0 {
            return Err(not_found(name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use event_triggers_scheduler::Period;
    use serde_json::json;

    fn row(kind: &str, schedule_seconds: Option<i64>, status: &str) -> TriggerRow {
        TriggerRow {
            name: "ping".to_string(),
            kind: kind.to_string(),
            schedule_seconds,
            payload: Some(json!({"a": 1})),
            status: status.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            next_fire_at: None,
        }
    }

    #[test]
    fn recurring_row_converts() {
        let trigger = row("recurring", Some(5), "scheduled")
            .try_into_trigger()
            .expect("valid row");

        assert_eq!(
            trigger.schedule,
            TriggerSchedule::Recurring {
                interval: Period::from_secs(5).unwrap()
            }
        );
        assert_eq!(trigger.status, TriggerStatus::Scheduled);
        assert_eq!(trigger.payload, Some(json!({"a": 1})));
    }

    #[test]
    fn manual_row_has_no_schedule() {
        let trigger = row("manual", None, "idle")
            .try_into_trigger()
            .expect("valid row");
        assert_eq!(trigger.schedule, TriggerSchedule::Manual);
    }

    #[test]
    fn corrupt_rows_are_decode_errors() {
        for bad in [
            row("weekly", Some(5), "scheduled"),
            row("recurring", None, "scheduled"),
            row("one_shot", Some(0), "scheduled"),
            row("recurring", Some(5), "paused"),
        ] {
            assert!(matches!(
                bad.try_into_trigger(),
                Err(sqlx::Error::Decode(_))
            ));
        }
    }
}
