//! Migration API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::engine::MigrationInput;
use crate::error::AppError;
use crate::history::{HistoryRecord, RunSummary, TimeRange};
use crate::services::StartMigrationResponse;
use crate::state::AppState;

/// Query parameters for listing runs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMigrationsQuery {
    pub limit: Option<usize>,
}

/// Start a migration.
///
/// POST /api/migrations
///
/// The run continues in the background; poll its history for progress.
pub async fn start(
    State(state): State<AppState>,
    Json(input): Json<MigrationInput>,
) -> Result<(StatusCode, Json<StartMigrationResponse>), AppError> {
    let started = state.migrations.start(input)?;
    Ok((StatusCode::ACCEPTED, Json(started.response())))
}

/// List recent runs.
///
/// GET /api/migrations?limit=
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListMigrationsQuery>,
) -> Result<Json<Vec<RunSummary>>, AppError> {
    let runs = state.migrations.recent(query.limit).await?;
    Ok(Json(runs))
}

/// History of one migration.
///
/// GET /api/migrations/{migration_id}/history?from=&to=
pub async fn history(
    State(state): State<AppState>,
    Path(migration_id): Path<String>,
    Query(range): Query<TimeRange>,
) -> Result<Json<Vec<HistoryRecord>>, AppError> {
    let records = state.migrations.history(&migration_id, range).await?;
    Ok(Json(records))
}
