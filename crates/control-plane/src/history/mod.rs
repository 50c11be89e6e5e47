//! Migration history.
//!
//! Every run appends checkpoint records keyed by `(migration_id, start_time)`
//! and ordered by a per-run sequence number. Records are never overwritten.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryHistoryStore;
pub use postgres::PgHistoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::engine::ErrorInfo;

/// Step name used for run-level records (start, completion, timeout, abort).
pub const RUN_RECORD_STEP: &str = "Migration";

#[derive(Debug, Error)]
pub enum HistoryError {
    /// A different record already occupies this position.
    #[error("Conflicting history record for migration {migration_id} at {start_time}#{seq}")]
    Conflict {
        migration_id: String,
        start_time: i64,
        seq: i32,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data could not be decoded.
    #[error("Corrupt history record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Started,
    Succeeded,
    Failed,
    TimedOut,
    Completed,
    /// The run was stopped by a server shutdown before reaching an end state.
    Aborted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Started => "STARTED",
            RecordStatus::Succeeded => "SUCCEEDED",
            RecordStatus::Failed => "FAILED",
            RecordStatus::TimedOut => "TIMED_OUT",
            RecordStatus::Completed => "COMPLETED",
            RecordStatus::Aborted => "ABORTED",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(RecordStatus::Started),
            "SUCCEEDED" => Ok(RecordStatus::Succeeded),
            "FAILED" => Ok(RecordStatus::Failed),
            "TIMED_OUT" => Ok(RecordStatus::TimedOut),
            "COMPLETED" => Ok(RecordStatus::Completed),
            "ABORTED" => Ok(RecordStatus::Aborted),
            other => Err(HistoryError::Corrupt(format!("unknown status '{}'", other))),
        }
    }
}

/// One durable checkpoint of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub migration_id: String,
    pub start_time: i64,
    pub seq: i32,
    pub viewer_domain: String,
    pub step_name: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Same checkpoint content, ignoring when it was recorded.
    pub fn same_checkpoint(&self, other: &HistoryRecord) -> bool {
        self.migration_id == other.migration_id
            && self.start_time == other.start_time
            && self.seq == other.seq
            && self.viewer_domain == other.viewer_domain
            && self.step_name == other.step_name
            && self.status == other.status
            && self.payload == other.payload
            && self.error == other.error
    }

    pub(crate) fn conflict(&self) -> HistoryError {
        HistoryError::Conflict {
            migration_id: self.migration_id.clone(),
            start_time: self.start_time,
            seq: self.seq,
        }
    }
}

/// Inclusive start-time filter for history queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TimeRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl TimeRange {
    pub fn contains(&self, start_time: i64) -> bool {
        self.from.map_or(true, |from| start_time >= from)
            && self.to.map_or(true, |to| start_time <= to)
    }
}

/// Identity of one run, as listed by [`HistoryStore::recent_runs`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub migration_id: String,
    pub start_time: i64,
    pub viewer_domain: String,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a record. Re-appending an identical record is a no-op.
    async fn append(&self, record: HistoryRecord) -> Result<(), HistoryError>;

    /// Records of a migration ordered by `(start_time, seq)`.
    async fn query(
        &self,
        migration_id: &str,
        range: TimeRange,
    ) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Most recent runs, newest first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>, HistoryError>;
}

/// Open the store selected by `endpoint`: PostgreSQL when set, memory otherwise.
pub async fn connect(
    endpoint: Option<&str>,
    max_connections: u32,
) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    match endpoint {
        Some(url) => {
            let store = PgHistoryStore::connect(url, max_connections).await?;
            store.init_schema().await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("No history store endpoint configured, using in-memory history");
            Ok(Arc::new(InMemoryHistoryStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RecordStatus::Started,
            RecordStatus::Succeeded,
            RecordStatus::Failed,
            RecordStatus::TimedOut,
            RecordStatus::Completed,
            RecordStatus::Aborted,
        ] {
            assert_eq!(status.as_str().parse::<RecordStatus>().unwrap(), status);
            assert_eq!(serde_json::to_value(status).unwrap(), json!(status.as_str()));
        }
        assert!("RUNNING".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_same_checkpoint_ignores_recorded_at() {
        let record = HistoryRecord {
            migration_id: "mig-1".to_string(),
            start_time: 100,
            seq: 3,
            viewer_domain: "www.example.com".to_string(),
            step_name: "CreateWebACL".to_string(),
            status: RecordStatus::Succeeded,
            payload: Some(json!({"webAclArn": "arn:acl"})),
            error: None,
            recorded_at: Utc::now(),
        };

        let mut retry = record.clone();
        retry.recorded_at = record.recorded_at + chrono::Duration::seconds(5);
        assert!(record.same_checkpoint(&retry));

        retry.status = RecordStatus::Failed;
        assert!(!record.same_checkpoint(&retry));
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange {
            from: Some(10),
            to: Some(20),
        };
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(9));
        assert!(!range.contains(21));
        assert!(TimeRange::default().contains(i64::MIN));
    }

    #[tokio::test]
    async fn test_connect_without_endpoint_is_memory() {
        let store = connect(None, 5).await.unwrap();
        assert!(store.recent_runs(10).await.unwrap().is_empty());
    }
}
