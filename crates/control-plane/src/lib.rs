//! Cutover Control Plane Library
//!
//! Orchestrates DNS/CDN cutovers: a domain served by one DNS/CDN provider
//! is moved to another by walking a fixed workflow of certificate issuance,
//! validation polling, origin setup, edge policy creation, distribution
//! rollout and DNS switchover.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`engine`]: Workflow graph, per-run context and execution engine
//! - [`history`]: Append-only migration history (memory or PostgreSQL)
//! - [`services`]: Start and query migrations
//! - [`handlers`]: HTTP route handlers
//! - [`error`]: Custom error types with Axum integration
//! - [`state`]: Shared application state
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cutover_control_plane::{config::AppConfig, engine::{ExecutionEngine, WorkflowGraph}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let engine_config = config.engine_config()?;
//!     let history = cutover_control_plane::history::connect(None, 1).await?;
//!     let executor = cutover_tasks::create_http_registry(
//!         &engine_config.task_executor_endpoints,
//!         engine_config.task_timeout,
//!     )?;
//!     let engine = ExecutionEngine::new(
//!         Arc::new(WorkflowGraph::migration_pipeline()?),
//!         Arc::new(executor),
//!         history,
//!         &engine_config,
//!     );
//!     // ... start runs
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod history;
pub mod services;
pub mod state;

pub use error::{AppError, AppResult};
