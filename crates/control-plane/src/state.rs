//! Application state for the Cutover control plane.
//!
//! Shared resources handed to every handler through Axum's state.

use crate::config::AppConfig;
use crate::services::MigrationService;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Migration start/query logic
    pub migrations: MigrationService,

    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(migrations: MigrationService, config: AppConfig) -> Self {
        Self {
            migrations,
            config: Arc::new(config),
            start_time: std::time::Instant::now(),
        }
    }

    /// Get the server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Name of the configured history backend.
    pub fn history_backend(&self) -> &'static str {
        if self.config.history_store_endpoint.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }
}
