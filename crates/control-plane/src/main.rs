//! Cutover Control Plane Server
//!
//! Serves the migration API and runs migrations in the background.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cutover_control_plane::{
    config::AppConfig,
    engine::{ExecutionEngine, WorkflowGraph},
    handlers, history,
    services::MigrationService,
    state::AppState,
};

/// Initialize tracing/logging.
fn init_tracing(json: bool) {
    let (json_layer, plain_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cutover_control_plane=debug,tower_http=debug".into()),
        )
        .with(json_layer)
        .with(plain_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let app_config = AppConfig::from_env()?;
    init_tracing(app_config.log_json);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Cutover Control Plane"
    );

    let engine_config = app_config.engine_config()?;

    tracing::info!(
        host = %app_config.host,
        port = app_config.port,
        deadline_secs = engine_config.execution_deadline.as_secs(),
        task_timeout_secs = engine_config.task_timeout.as_secs(),
        "Configuration loaded"
    );

    let history = history::connect(
        engine_config.history_store_endpoint.as_deref(),
        app_config.history_max_connections,
    )
    .await?;

    let executor = cutover_tasks::create_http_registry(
        &engine_config.task_executor_endpoints,
        engine_config.task_timeout,
    )?;

    let graph = WorkflowGraph::migration_pipeline()?;
    tracing::debug!(steps = graph.len(), entry = graph.entry(), "Workflow graph built");

    let engine = ExecutionEngine::new(Arc::new(graph), Arc::new(executor), history, &engine_config);
    let migrations = MigrationService::new(Arc::new(engine));
    let state = AppState::new(migrations.clone(), app_config.clone());

    // CORS configuration - allow all origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = app_config.bind_address().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    migrations.shutdown(app_config.shutdown_grace()).await;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
