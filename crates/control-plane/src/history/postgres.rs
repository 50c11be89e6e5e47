//! PostgreSQL history store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;

use super::{HistoryError, HistoryRecord, HistoryStore, RunSummary, TimeRange};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS migration_history (
    migration_id  TEXT        NOT NULL,
    start_time    BIGINT      NOT NULL,
    seq           INTEGER     NOT NULL,
    viewer_domain TEXT        NOT NULL,
    step_name     TEXT        NOT NULL,
    status        TEXT        NOT NULL,
    payload       JSONB,
    error         JSONB,
    recorded_at   TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (migration_id, start_time, seq)
)
"#;

/// History persisted in a `migration_history` table.
#[derive(Debug, Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    migration_id: String,
    start_time: i64,
    seq: i32,
    viewer_domain: String,
    step_name: String,
    status: String,
    payload: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = HistoryError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let error = row
            .error
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| HistoryError::Corrupt(format!("error column: {}", e)))?;

        Ok(HistoryRecord {
            migration_id: row.migration_id,
            start_time: row.start_time,
            seq: row.seq,
            viewer_domain: row.viewer_domain,
            step_name: row.step_name,
            status: row.status.parse()?,
            payload: row.payload,
            error,
            recorded_at: row.recorded_at,
        })
    }
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, HistoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await?;

        tracing::info!(max_connections, "History store connection pool created");
        Ok(Self::new(pool))
    }

    /// Create the history table if missing.
    pub async fn init_schema(&self) -> Result<(), HistoryError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_one_record(
        &self,
        migration_id: &str,
        start_time: i64,
        seq: i32,
    ) -> Result<Option<HistoryRecord>, HistoryError> {
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT migration_id, start_time, seq, viewer_domain, step_name,
                   status, payload, error, recorded_at
            FROM migration_history
            WHERE migration_id = $1 AND start_time = $2 AND seq = $3
            "#,
        )
        .bind(migration_id)
        .bind(start_time)
        .bind(seq)
        .fetch_optional(&self.pool)
        .await?;

        row.map(HistoryRecord::try_from).transpose()
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        let error = record
            .error
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| HistoryError::Corrupt(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO migration_history (
                migration_id, start_time, seq, viewer_domain, step_name,
                status, payload, error, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (migration_id, start_time, seq) DO NOTHING
            "#,
        )
        .bind(&record.migration_id)
        .bind(record.start_time)
        .bind(record.seq)
        .bind(&record.viewer_domain)
        .bind(&record.step_name)
        .bind(record.status.as_str())
        .bind(&record.payload)
        .bind(&error)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Position already taken: accept only an identical retry.
        let existing = self
            .fetch_one_record(&record.migration_id, record.start_time, record.seq)
            .await?;

        match existing {
            Some(stored) if stored.same_checkpoint(&record) => Ok(()),
            _ => Err(record.conflict()),
        }
    }

    async fn query(
        &self,
        migration_id: &str,
        range: TimeRange,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT migration_id, start_time, seq, viewer_domain, step_name,
                   status, payload, error, recorded_at
            FROM migration_history
            WHERE migration_id = $1
              AND ($2::BIGINT IS NULL OR start_time >= $2)
              AND ($3::BIGINT IS NULL OR start_time <= $3)
            ORDER BY start_time ASC, seq ASC
            "#,
        )
        .bind(migration_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HistoryRecord::try_from).collect()
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>, HistoryError> {
        let runs = sqlx::query_as::<_, RunSummary>(
            r#"
            SELECT migration_id, start_time, MIN(viewer_domain) AS viewer_domain
            FROM migration_history
            GROUP BY migration_id, start_time
            ORDER BY start_time DESC, migration_id ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::RecordStatus;
    use serde_json::json;

    fn row(status: &str, error: Option<serde_json::Value>) -> HistoryRow {
        HistoryRow {
            migration_id: "mig-1".to_string(),
            start_time: 1_700_000_000,
            seq: 4,
            viewer_domain: "www.example.com".to_string(),
            step_name: "CreateWebACL".to_string(),
            status: status.to_string(),
            payload: None,
            error,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_into_record() {
        let record = HistoryRecord::try_from(row(
            "FAILED",
            Some(json!({"Error": "Exception", "Cause": "quota"})),
        ))
        .unwrap();

        assert_eq!(record.status, RecordStatus::Failed);
        let error = record.error.unwrap();
        assert_eq!(error.error, "Exception");
        assert_eq!(error.cause, "quota");
    }

    #[test]
    fn test_row_unknown_status() {
        let err = HistoryRecord::try_from(row("RUNNING", None)).unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt(_)));
    }

    #[test]
    fn test_row_corrupt_error_column() {
        let err = HistoryRecord::try_from(row("FAILED", Some(json!("oops")))).unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt(_)));
    }

    #[test]
    fn test_schema_keys_on_run_and_seq() {
        assert!(SCHEMA.contains("PRIMARY KEY (migration_id, start_time, seq)"));
    }
}
