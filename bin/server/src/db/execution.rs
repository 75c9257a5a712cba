//! PostgreSQL execution log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_triggers_core::ExecutionId;
use event_triggers_scheduler::{ExecutionLog, ExecutionRecord, Outcome, StoreError};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for execution queries.
#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    trigger_name: String,
    scheduled_for: Option<DateTime<Utc>>,
    executed_at: DateTime<Utc>,
    outcome: String,
    error_detail: Option<String>,
    payload: Option<serde_json::Value>,
}

impl ExecutionRow {
    fn try_into_record(self) -> Result<ExecutionRecord, sqlx::Error> {
        let id = ExecutionId::from_str(&self.id).map_err(|e| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid execution id '{}': {}", self.id, e),
            )))
        })?;
        let outcome = Outcome::from_str(&self.outcome).map_err(|e| {
            sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("execution '{}': {}", self.id, e),
            )))
        })?;

        Ok(ExecutionRecord {
            id,
            trigger_name: self.trigger_name,
            scheduled_for: self.scheduled_for,
            executed_at: self.executed_at,
            outcome,
            error_detail: self.error_detail,
            payload: self.payload,
        })
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable {
        reason: e.to_string(),
    }
}

/// [`ExecutionLog`] backed by the `trigger_executions` table.
pub struct PgExecutionLog {
    pool: PgPool,
}

impl PgExecutionLog {
    /// Creates a new log.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionLog for PgExecutionLog {
    async fn append(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trigger_executions (id, trigger_name, scheduled_for, executed_at, outcome, error_detail, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.trigger_name)
        .bind(record.scheduled_for)
        .bind(record.executed_at)
        .bind(record.outcome.as_str())
        .bind(&record.error_detail)
        .bind(&record.payload)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT id, trigger_name, scheduled_for, executed_at, outcome, error_detail, payload
            FROM trigger_executions
            ORDER BY executed_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(|r| r.try_into_record().map_err(unavailable))
            .collect()
    }

    async fn list_for(&self, trigger_name: &str) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT id, trigger_name, scheduled_for, executed_at, outcome, error_detail, payload
            FROM trigger_executions
            WHERE trigger_name = $1
            ORDER BY executed_at, id
            "#,
        )
        .bind(trigger_name)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(|r| r.try_into_record().map_err(unavailable))
            .collect()
    }

    async fn delete_for(&self, trigger_name: &str) -> Result<u64, StoreError> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM trigger_executions
            WHERE trigger_name = $1
            "#,
        )
        .bind(trigger_name)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(deleted.rows_affected())
    }

    async fn delete(&self, id: &ExecutionId) -> Result<bool, StoreError> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM trigger_executions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(deleted.rows_affected() > 0)
    }
}
