//! Application configuration for the Cutover control plane.

use cutover_tasks::TaskName;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::engine::EngineConfig;
use crate::error::{AppError, AppResult};

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `CUTOVER_`:
/// - `CUTOVER_HOST`: Server bind address (default: "0.0.0.0")
/// - `CUTOVER_PORT`: Server port (default: 8090)
/// - `CUTOVER_HISTORY_STORE_ENDPOINT`: PostgreSQL URL; in-memory history when unset
/// - `CUTOVER_EXECUTION_DEADLINE_SECS`: Per-run deadline (default: 1800)
/// - `CUTOVER_TASK_TIMEOUT_SECS`: Per-invocation task timeout (default: 30)
/// - `CUTOVER_TASK_ENDPOINT_BASE`: Base URL; each task is served at `<base>/<task_name>`
/// - `CUTOVER_TASK_ENDPOINTS`: Overrides as `task_name=url,task_name=url`
/// - `CUTOVER_SHUTDOWN_GRACE_SECS`: How long shutdown waits for running migrations (default: 30)
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// PostgreSQL history store URL (optional)
    #[serde(default)]
    pub history_store_endpoint: Option<String>,

    /// Maximum history store connections
    #[serde(default = "default_history_max_connections")]
    pub history_max_connections: u32,

    /// Whole-run deadline in seconds
    #[serde(default = "default_execution_deadline_secs")]
    pub execution_deadline_secs: u64,

    /// Task invocation timeout in seconds
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Base URL for task endpoints
    #[serde(default)]
    pub task_endpoint_base: Option<String>,

    /// Per-task endpoint overrides
    #[serde(default)]
    pub task_endpoints: Option<String>,

    /// Seconds to let running migrations finish on shutdown before aborting them
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_history_max_connections() -> u32 {
    10
}

fn default_execution_deadline_secs() -> u64 {
    30 * 60
}

fn default_task_timeout_secs() -> u64 {
    30
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `CUTOVER_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("CUTOVER_").from_env::<AppConfig>()
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Grace period for in-flight migrations at shutdown.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Resolve the engine's deployment configuration.
    ///
    /// Every task must end up with an endpoint.
    pub fn engine_config(&self) -> AppResult<EngineConfig> {
        let mut endpoints: HashMap<TaskName, String> = HashMap::new();

        if let Some(base) = self.task_endpoint_base.as_deref() {
            let base = base.trim().trim_end_matches('/');
            if !base.is_empty() {
                for task in TaskName::ALL {
                    endpoints.insert(task, format!("{}/{}", base, task));
                }
            }
        }

        for (task, url) in self.endpoint_overrides()? {
            endpoints.insert(task, url);
        }

        let missing: Vec<&str> = TaskName::ALL
            .iter()
            .filter(|task| !endpoints.contains_key(*task))
            .map(|task| task.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "No endpoint configured for tasks: {}",
                missing.join(", ")
            )));
        }

        if self.execution_deadline_secs == 0 {
            return Err(AppError::Config(
                "execution_deadline_secs must be greater than zero".to_string(),
            ));
        }

        Ok(EngineConfig {
            history_store_endpoint: self
                .history_store_endpoint
                .clone()
                .filter(|url| !url.trim().is_empty()),
            execution_deadline: Duration::from_secs(self.execution_deadline_secs),
            task_executor_endpoints: endpoints,
            task_timeout: Duration::from_secs(self.task_timeout_secs),
        })
    }

    fn endpoint_overrides(&self) -> AppResult<Vec<(TaskName, String)>> {
        let Some(raw) = self.task_endpoints.as_deref() else {
            return Ok(Vec::new());
        };

        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (name, url) = entry.split_once('=').ok_or_else(|| {
                    AppError::Config(format!("Expected task_name=url, got '{}'", entry))
                })?;
                let task: TaskName = name
                    .parse()
                    .map_err(|e: cutover_tasks::TaskError| AppError::Config(e.to_string()))?;
                let url = url.trim();
                if url.is_empty() {
                    return Err(AppError::Config(format!("Empty endpoint for task {}", task)));
                }
                Ok((task, url.to_string()))
            })
            .collect()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            history_store_endpoint: None,
            history_max_connections: default_history_max_connections(),
            execution_deadline_secs: default_execution_deadline_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            task_endpoint_base: None,
            task_endpoints: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
            log_json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> AppConfig {
        envy::prefixed("CUTOVER_")
            .from_iter::<_, AppConfig>(
                vars.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<Vec<_>>(),
            )
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8090);
        assert_eq!(config.execution_deadline_secs, 1800);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(30));
        assert!(config.history_store_endpoint.is_none());
    }

    #[test]
    fn test_bind_address() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8090");
    }

    #[test]
    fn test_from_env_vars() {
        let config = from_vars(&[
            ("CUTOVER_PORT", "9000"),
            ("CUTOVER_TASK_TIMEOUT_SECS", "5"),
            ("CUTOVER_SHUTDOWN_GRACE_SECS", "90"),
            ("CUTOVER_HISTORY_STORE_ENDPOINT", "postgres://localhost/cutover"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.task_timeout_secs, 5);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(90));
        assert_eq!(
            config.history_store_endpoint.as_deref(),
            Some("postgres://localhost/cutover")
        );
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_engine_config_from_base() {
        let config = AppConfig {
            task_endpoint_base: Some("http://tasks.internal/".to_string()),
            ..AppConfig::default()
        };

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.task_executor_endpoints.len(), TaskName::ALL.len());
        assert_eq!(
            engine.task_executor_endpoints[&TaskName::CreateWebAcl],
            "http://tasks.internal/create_web_acl"
        );
        assert_eq!(engine.execution_deadline, Duration::from_secs(1800));
        assert!(engine.history_store_endpoint.is_none());
    }

    #[test]
    fn test_engine_config_overrides() {
        let config = AppConfig {
            task_endpoint_base: Some("http://tasks.internal".to_string()),
            task_endpoints: Some(
                " report_error = http://alerts.internal/report , update_dns_record=http://dns/update"
                    .to_string(),
            ),
            ..AppConfig::default()
        };

        let engine = config.engine_config().unwrap();
        assert_eq!(
            engine.task_executor_endpoints[&TaskName::ReportError],
            "http://alerts.internal/report"
        );
        assert_eq!(
            engine.task_executor_endpoints[&TaskName::UpdateDnsRecord],
            "http://dns/update"
        );
    }

    #[test]
    fn test_engine_config_missing_tasks() {
        let config = AppConfig {
            task_endpoints: Some("create_certificate=http://certs/create".to_string()),
            ..AppConfig::default()
        };

        match config.engine_config().unwrap_err() {
            AppError::Config(msg) => {
                assert!(msg.contains("report_error"));
                assert!(!msg.contains("create_certificate"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_engine_config_bad_override() {
        let config = AppConfig {
            task_endpoint_base: Some("http://tasks.internal".to_string()),
            task_endpoints: Some("purge_cache=http://x".to_string()),
            ..AppConfig::default()
        };
        assert!(matches!(config.engine_config(), Err(AppError::Config(_))));

        let config = AppConfig {
            task_endpoint_base: Some("http://tasks.internal".to_string()),
            task_endpoints: Some("report_error".to_string()),
            ..AppConfig::default()
        };
        assert!(matches!(config.engine_config(), Err(AppError::Config(_))));
    }
}
