//! HTTP handlers for the Cutover API.

pub mod health;
pub mod migrations;

pub use health::{api_health, health_check};

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Application routes, without middleware layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(api_health))
        .route(
            "/api/migrations",
            post(migrations::start).get(migrations::list),
        )
        .route(
            "/api/migrations/{migration_id}/history",
            get(migrations::history),
        )
        .with_state(state)
}
