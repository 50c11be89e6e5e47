//! Execution engine.
//!
//! Walks the workflow graph for a single migration run. Each run is a
//! sequential loop over steps driven by a cursor; many runs can execute
//! concurrently on the runtime since waits are timer-based.
//!
//! A run stops early only on a task failure, the deadline, or cancellation
//! of the token handed to [`ExecutionEngine::run_until_cancelled`].

use cutover_tasks::{TaskError, TaskExecutor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::EngineConfig;
use super::context::{ErrorInfo, MigrationContext, StepFailure};
use super::error::EngineError;
use super::graph::WorkflowGraph;
use super::step::{StepKind, TaskStep};
use crate::history::{HistoryRecord, HistoryStore, RecordStatus, RUN_RECORD_STEP};

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
}

/// Result of [`ExecutionEngine::run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub context: MigrationContext,
    pub status: RunStatus,
    /// Step names in the order they were entered.
    pub visited: Vec<String>,
}

impl RunOutcome {
    /// How many times `step` was entered.
    pub fn visits(&self, step: &str) -> usize {
        self.visited.iter().filter(|s| s.as_str() == step).count()
    }
}

/// Appends checkpoints for one run. Append failures are logged, not raised.
struct Journal<'a> {
    store: &'a dyn HistoryStore,
    migration_id: String,
    start_time: i64,
    viewer_domain: String,
    next_seq: i32,
}

impl<'a> Journal<'a> {
    fn new(store: &'a dyn HistoryStore, ctx: &MigrationContext) -> Self {
        Self {
            store,
            migration_id: ctx.migration_id().to_string(),
            start_time: ctx.start_time(),
            viewer_domain: ctx.viewer_domain().to_string(),
            next_seq: 0,
        }
    }

    async fn record(
        &mut self,
        step: &str,
        status: RecordStatus,
        payload: Option<serde_json::Value>,
        error: Option<ErrorInfo>,
    ) {
        let record = HistoryRecord {
            migration_id: self.migration_id.clone(),
            start_time: self.start_time,
            seq: self.next_seq,
            viewer_domain: self.viewer_domain.clone(),
            step_name: step.to_string(),
            status,
            payload,
            error,
            recorded_at: chrono::Utc::now(),
        };
        self.next_seq += 1;

        if let Err(e) = self.store.append(record).await {
            tracing::warn!(
                migration_id = %self.migration_id,
                step = %step,
                status = status.as_str(),
                error = %e,
                "Failed to append history record"
            );
        }
    }
}

/// Runs migrations over a shared workflow graph.
pub struct ExecutionEngine {
    graph: Arc<WorkflowGraph>,
    executor: Arc<dyn TaskExecutor>,
    history: Arc<dyn HistoryStore>,
    deadline: Duration,
}

impl ExecutionEngine {
    pub fn new(
        graph: Arc<WorkflowGraph>,
        executor: Arc<dyn TaskExecutor>,
        history: Arc<dyn HistoryStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            graph,
            executor,
            history,
            deadline: config.execution_deadline,
        }
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn history(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.history)
    }

    /// Drive one migration to a terminal status.
    ///
    /// Task failures end the run with [`RunStatus::Failed`]. An `Err` is
    /// returned only when the error-reporting task itself fails or the
    /// graph and context disagree.
    pub async fn run(&self, ctx: MigrationContext) -> Result<RunOutcome, EngineError> {
        self.run_until_cancelled(ctx, &CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but ends with [`RunStatus::Aborted`] once
    /// `cancel` fires. Pending waits and task calls are abandoned and an
    /// ABORTED run record is appended.
    pub async fn run_until_cancelled(
        &self,
        mut ctx: MigrationContext,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        let started = Instant::now();
        let mut journal = Journal::new(self.history.as_ref(), &ctx);
        let mut visited: Vec<String> = Vec::new();
        let mut cursor = self.graph.entry().to_string();

        tracing::info!(
            migration_id = %ctx.migration_id(),
            viewer_domain = %ctx.viewer_domain(),
            origin_type = ctx.origin_info().origin_type.as_str(),
            "Migration started"
        );
        journal
            .record(
                RUN_RECORD_STEP,
                RecordStatus::Started,
                Some(ctx.input_summary()),
                None,
            )
            .await;

        loop {
            if cancel.is_cancelled() {
                return Ok(self.abort(ctx, visited, &mut journal, &cursor).await);
            }
            if started.elapsed() >= self.deadline {
                return Ok(self
                    .time_out(ctx, visited, &mut journal, &cursor, started)
                    .await);
            }

            let step = self
                .graph
                .step(&cursor)
                .ok_or_else(|| EngineError::UnknownStep(cursor.clone()))?;
            visited.push(step.name.clone());

            tracing::debug!(
                migration_id = %ctx.migration_id(),
                step = %step.name,
                kind = step.kind_name(),
                "Entering step"
            );

            let next = match &step.kind {
                StepKind::Task(task) => {
                    let invoked = tokio::select! {
                        result = self.invoke_task(task, &ctx) => Some(result),
                        _ = cancel.cancelled() => None,
                    };
                    let Some(invoked) = invoked else {
                        return Ok(self.abort(ctx, visited, &mut journal, &step.name).await);
                    };

                    match invoked {
                        Ok(result) => {
                            ctx.merge_output(&step.name, task.output, result.clone())?;
                            journal
                                .record(&step.name, RecordStatus::Succeeded, Some(result), None)
                                .await;
                            task.next.clone()
                        }
                        Err(err) => {
                            return self
                                .fail(&step.name, task, err, ctx, visited, &mut journal)
                                .await;
                        }
                    }
                }
                StepKind::Wait(wait) => {
                    let remaining = self.deadline.saturating_sub(started.elapsed());
                    let slept = tokio::select! {
                        _ = tokio::time::sleep(wait.duration.min(remaining)) => true,
                        _ = cancel.cancelled() => false,
                    };
                    if !slept {
                        return Ok(self.abort(ctx, visited, &mut journal, &step.name).await);
                    }
                    Some(wait.next.clone())
                }
                StepKind::Choice(choice) => Some(choice.select(&ctx).to_string()),
                StepKind::Pass(pass) => {
                    pass.apply(&step.name, &mut ctx)?;
                    Some(pass.next.clone())
                }
            };

            match next {
                Some(next) => cursor = next,
                None => {
                    journal
                        .record(RUN_RECORD_STEP, RecordStatus::Completed, None, None)
                        .await;
                    tracing::info!(
                        migration_id = %ctx.migration_id(),
                        steps = visited.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Migration succeeded"
                    );
                    return Ok(RunOutcome {
                        context: ctx,
                        status: RunStatus::Succeeded,
                        visited,
                    });
                }
            }
        }
    }

    async fn invoke_task(
        &self,
        task: &TaskStep,
        ctx: &MigrationContext,
    ) -> Result<serde_json::Value, TaskError> {
        let request = task.project(ctx)?;
        let started = Instant::now();
        let result = self.executor.invoke(task.task, request).await;

        tracing::debug!(
            migration_id = %ctx.migration_id(),
            task = %task.task,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Task invocation finished"
        );
        result
    }

    async fn fail(
        &self,
        step: &str,
        task: &TaskStep,
        err: TaskError,
        mut ctx: MigrationContext,
        visited: Vec<String>,
        journal: &mut Journal<'_>,
    ) -> Result<RunOutcome, EngineError> {
        let failure = StepFailure {
            step_name: step.to_string(),
            error_info: ErrorInfo::from(&err),
        };

        tracing::warn!(
            migration_id = %ctx.migration_id(),
            step = %step,
            task = %task.task,
            error = %failure.error_info,
            "Task step failed"
        );

        if let Some(catch) = task.catch {
            let report = serde_json::json!({
                "viewer_domain": ctx.viewer_domain(),
                "migration_id": ctx.migration_id(),
                "step_name": step,
                "error": failure.error_info,
            });

            if let Err(source) = self.executor.invoke(catch.handler, report).await {
                tracing::error!(
                    migration_id = %ctx.migration_id(),
                    step = %step,
                    error = %source,
                    "Error handler failed"
                );
                journal
                    .record(
                        step,
                        RecordStatus::Failed,
                        None,
                        Some(failure.error_info.clone()),
                    )
                    .await;
                return Err(EngineError::HandlerFault {
                    step: step.to_string(),
                    source,
                });
            }
        }

        journal
            .record(
                step,
                RecordStatus::Failed,
                None,
                Some(failure.error_info.clone()),
            )
            .await;
        ctx.set_error(failure);

        Ok(RunOutcome {
            context: ctx,
            status: RunStatus::Failed,
            visited,
        })
    }

    async fn time_out(
        &self,
        ctx: MigrationContext,
        visited: Vec<String>,
        journal: &mut Journal<'_>,
        pending_step: &str,
        started: Instant,
    ) -> RunOutcome {
        let elapsed = started.elapsed();
        tracing::warn!(
            migration_id = %ctx.migration_id(),
            step = %pending_step,
            elapsed_ms = elapsed.as_millis() as u64,
            deadline_secs = self.deadline.as_secs(),
            "Migration timed out"
        );

        journal
            .record(
                RUN_RECORD_STEP,
                RecordStatus::TimedOut,
                Some(serde_json::json!({
                    "pendingStep": pending_step,
                    "elapsedSecs": elapsed.as_secs(),
                })),
                Some(ErrorInfo {
                    error: "TimeoutExceeded".to_string(),
                    cause: format!(
                        "Migration exceeded its deadline of {} seconds",
                        self.deadline.as_secs()
                    ),
                }),
            )
            .await;

        RunOutcome {
            context: ctx,
            status: RunStatus::TimedOut,
            visited,
        }
    }

    async fn abort(
        &self,
        ctx: MigrationContext,
        visited: Vec<String>,
        journal: &mut Journal<'_>,
        pending_step: &str,
    ) -> RunOutcome {
        tracing::warn!(
            migration_id = %ctx.migration_id(),
            step = %pending_step,
            "Migration aborted"
        );

        journal
            .record(
                RUN_RECORD_STEP,
                RecordStatus::Aborted,
                Some(serde_json::json!({ "pendingStep": pending_step })),
                Some(ErrorInfo {
                    error: "Aborted".to_string(),
                    cause: "Server shut down before the migration finished".to_string(),
                }),
            )
            .await;

        RunOutcome {
            context: ctx,
            status: RunStatus::Aborted,
            visited,
        }
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("entry", &self.graph.entry())
            .field("steps", &self.graph.len())
            .field("deadline", &self.deadline)
            .finish()
    }
}
