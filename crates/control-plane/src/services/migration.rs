//! Migration service.
//!
//! Starts migration runs in the background and answers history queries.
//! Runs are tracked so shutdown can drain or abort them.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::engine::{ExecutionEngine, MigrationContext, MigrationInput, RunStatus};
use crate::error::{AppError, AppResult};
use crate::history::{HistoryRecord, HistoryStore, RunSummary, TimeRange};

/// Default number of runs returned by [`MigrationService::recent`].
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// Upper bound on listed runs.
pub const MAX_RECENT_LIMIT: usize = 500;

/// Response to a start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMigrationResponse {
    pub migration_id: String,
    pub start_time: i64,
}

/// A run accepted for execution.
#[derive(Debug)]
pub struct StartedMigration {
    pub migration_id: String,
    pub start_time: i64,
    /// Resolves to the terminal status, or `None` on a fatal engine error.
    pub handle: JoinHandle<Option<RunStatus>>,
}

impl StartedMigration {
    pub fn response(&self) -> StartMigrationResponse {
        StartMigrationResponse {
            migration_id: self.migration_id.clone(),
            start_time: self.start_time,
        }
    }
}

/// Migration service.
#[derive(Clone)]
pub struct MigrationService {
    engine: Arc<ExecutionEngine>,
    history: Arc<dyn HistoryStore>,
    runs: TaskTracker,
    cancel: CancellationToken,
}

impl MigrationService {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        let history = engine.history();
        Self {
            engine,
            history,
            runs: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Validate the input and spawn the run.
    ///
    /// Returns as soon as the run is scheduled; its progress is visible
    /// through history.
    pub fn start(&self, input: MigrationInput) -> AppResult<StartedMigration> {
        if self.runs.is_closed() {
            return Err(AppError::Unavailable("Server is shutting down".to_string()));
        }
        input.validate()?;

        let migration_id = uuid::Uuid::new_v4().to_string();
        let start_time = chrono::Utc::now().timestamp();
        let ctx = MigrationContext::new(migration_id.clone(), start_time, input);

        tracing::info!(
            migration_id = %migration_id,
            viewer_domain = %ctx.viewer_domain(),
            "Migration accepted"
        );

        let engine = Arc::clone(&self.engine);
        let cancel = self.cancel.clone();
        let id = migration_id.clone();
        let handle = self.runs.spawn(async move {
            match engine.run_until_cancelled(ctx, &cancel).await {
                Ok(outcome) => {
                    tracing::info!(
                        migration_id = %id,
                        status = ?outcome.status,
                        steps = outcome.visited.len(),
                        "Migration finished"
                    );
                    Some(outcome.status)
                }
                Err(e) => {
                    tracing::error!(
                        migration_id = %id,
                        error = %e,
                        "Migration ended with an engine error"
                    );
                    None
                }
            }
        });

        Ok(StartedMigration {
            migration_id,
            start_time,
            handle,
        })
    }

    /// Stop accepting runs and wait up to `grace` for running ones.
    ///
    /// Runs still going after the grace period are cancelled; each appends
    /// an ABORTED record before this returns.
    pub async fn shutdown(&self, grace: Duration) {
        self.runs.close();
        if self.runs.is_empty() {
            return;
        }

        tracing::info!(
            running = self.runs.len(),
            grace_secs = grace.as_secs(),
            "Waiting for running migrations"
        );
        if tokio::time::timeout(grace, self.runs.wait()).await.is_err() {
            tracing::warn!(
                running = self.runs.len(),
                "Grace period elapsed, aborting running migrations"
            );
            self.cancel.cancel();
            self.runs.wait().await;
        }
    }

    /// History of a migration, ordered by start time then sequence.
    pub async fn history(
        &self,
        migration_id: &str,
        range: TimeRange,
    ) -> AppResult<Vec<HistoryRecord>> {
        if let (Some(from), Some(to)) = (range.from, range.to) {
            if from > to {
                return Err(AppError::BadRequest(format!(
                    "'from' ({}) is after 'to' ({})",
                    from, to
                )));
            }
        }

        let records = self.history.query(migration_id, range).await?;
        if records.is_empty() {
            return Err(AppError::NotFound(format!("Migration {}", migration_id)));
        }
        Ok(records)
    }

    /// Most recent runs, newest first.
    pub async fn recent(&self, limit: Option<usize>) -> AppResult<Vec<RunSummary>> {
        let limit = limit
            .unwrap_or(DEFAULT_RECENT_LIMIT)
            .clamp(1, MAX_RECENT_LIMIT);
        Ok(self.history.recent_runs(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{sample_input, OriginType};
    use crate::engine::testing::ScriptedExecutor;
    use crate::engine::{EngineConfig, WorkflowGraph};
    use crate::history::{InMemoryHistoryStore, RecordStatus};

    fn service() -> MigrationService {
        let engine = ExecutionEngine::new(
            Arc::new(WorkflowGraph::migration_pipeline().unwrap()),
            Arc::new(ScriptedExecutor::new()),
            Arc::new(InMemoryHistoryStore::new()),
            &EngineConfig::default(),
        );
        MigrationService::new(Arc::new(engine))
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_to_completion() {
        let service = service();
        let started = service
            .start(sample_input(OriginType::Cname, "origin.example.com"))
            .unwrap();

        assert!(uuid::Uuid::parse_str(&started.migration_id).is_ok());
        let response = started.response();
        assert_eq!(response.migration_id, started.migration_id);

        let status = started.handle.await.unwrap();
        assert_eq!(status, Some(RunStatus::Succeeded));

        let records = service
            .history(&response.migration_id, TimeRange::default())
            .await
            .unwrap();
        assert_eq!(records.first().unwrap().status, RecordStatus::Started);
        assert_eq!(records.last().unwrap().status, RecordStatus::Completed);
        assert!(records.iter().all(|r| r.start_time == response.start_time));

        let recent = service.recent(None).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].migration_id, response.migration_id);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_input() {
        let service = service();
        let mut input = sample_input(OriginType::A, "203.0.113.10");
        input.viewer_domain = String::new();

        let err = service.start(input).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(service.recent(None).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_runs_past_grace() {
        let service = service();
        let started = service
            .start(sample_input(OriginType::Cname, "origin.example.com"))
            .unwrap();

        service.shutdown(Duration::from_secs(5)).await;

        assert_eq!(started.handle.await.unwrap(), Some(RunStatus::Aborted));

        let records = service
            .history(&started.migration_id, TimeRange::default())
            .await
            .unwrap();
        let last = records.last().unwrap();
        assert_eq!(last.status, RecordStatus::Aborted);
        assert_eq!(last.step_name, crate::history::RUN_RECORD_STEP);
        assert!(!records.iter().any(|r| r.status == RecordStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_runs_within_grace() {
        let service = service();
        let started = service
            .start(sample_input(OriginType::A, "203.0.113.10"))
            .unwrap();

        service.shutdown(Duration::from_secs(60 * 60)).await;

        assert_eq!(started.handle.await.unwrap(), Some(RunStatus::Succeeded));
        let records = service
            .history(&started.migration_id, TimeRange::default())
            .await
            .unwrap();
        assert_eq!(records.last().unwrap().status, RecordStatus::Completed);
    }

    #[tokio::test]
    async fn test_start_rejected_after_shutdown() {
        let service = service();
        service.shutdown(Duration::from_secs(1)).await;

        let err = service
            .start(sample_input(OriginType::Cname, "origin.example.com"))
            .unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_history_unknown_migration() {
        let service = service();
        let err = service
            .history("does-not-exist", TimeRange::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_history_inverted_range() {
        let service = service();
        let err = service
            .history(
                "any",
                TimeRange {
                    from: Some(200),
                    to: Some(100),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
