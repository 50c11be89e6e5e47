//! HTTP task handler.
//!
//! Each external handler is reached by POSTing the projected request as
//! JSON to its endpoint. The response body is the task result. Failures
//! come back either as a non-2xx status or as a Lambda-style error body
//! (`{"errorType": ..., "errorMessage": ...}`).

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::TaskError;
use crate::name::TaskName;
use crate::registry::{TaskHandler, TaskRegistry};

/// Forwards one task to a remote endpoint.
pub struct HttpTaskHandler {
    task: TaskName,
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTaskHandler {
    /// Create a handler with its own client.
    pub fn new(
        task: TaskName,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TaskError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TaskError::from)?;

        Ok(Self::with_client(task, url, client, timeout))
    }

    /// Create a handler sharing an existing client.
    pub fn with_client(
        task: TaskName,
        url: impl Into<String>,
        client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            task,
            url: url.into(),
            client,
            timeout,
        }
    }

    /// Endpoint this handler posts to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TaskHandler for HttpTaskHandler {
    fn task(&self) -> TaskName {
        self.task
    }

    async fn handle(&self, request: &serde_json::Value) -> Result<serde_json::Value, TaskError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TaskError::Timeout(self.timeout.as_secs())
                } else {
                    TaskError::from(e)
                }
            })?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(
            task = %self.task,
            status = status.as_u16(),
            body_len = body.len(),
            "Task handler responded"
        );

        parse_response(status.as_u16(), &body)
    }
}

/// Turn a handler response into a task result or task error.
fn parse_response(status: u16, body: &str) -> Result<serde_json::Value, TaskError> {
    let parsed: Option<serde_json::Value> = if body.trim().is_empty() {
        Some(serde_json::Value::Null)
    } else {
        serde_json::from_str(body).ok()
    };

    if let Some(failure) = parsed.as_ref().and_then(reported_failure) {
        return Err(failure);
    }

    if !(200..300).contains(&status) {
        return Err(TaskError::Failed {
            error_type: format!("HttpStatus{}", status),
            message: body.to_string(),
        });
    }

    parsed.ok_or_else(|| TaskError::Json(format!("Handler returned non-JSON body: {}", body)))
}

/// Extract a Lambda-style error report from a response body.
fn reported_failure(body: &serde_json::Value) -> Option<TaskError> {
    let obj = body.as_object()?;
    if !obj.contains_key("errorType") && !obj.contains_key("errorMessage") {
        return None;
    }

    let field = |name: &str| obj.get(name).and_then(|v| v.as_str()).map(str::to_string);

    Some(TaskError::Failed {
        error_type: field("errorType").unwrap_or_else(|| "TaskFailed".to_string()),
        message: field("errorMessage").unwrap_or_default(),
    })
}

/// Create a registry with an HTTP handler for every task.
///
/// Fails if any task has no endpoint.
pub fn create_http_registry(
    endpoints: &HashMap<TaskName, String>,
    timeout: Duration,
) -> Result<TaskRegistry, TaskError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(TaskError::from)?;

    let mut registry = TaskRegistry::new();
    for (task, url) in endpoints {
        registry.register(HttpTaskHandler::with_client(
            *task,
            url.clone(),
            client.clone(),
            timeout,
        ));
    }

    let missing = registry.missing();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|t| t.as_str()).collect();
        return Err(TaskError::NotRegistered(names.join(", ")));
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_body() {
        let result = parse_response(
            200,
            r#"{"status": "success", "CertificateArn": "arn:cert", "DomainName": "www.example.com"}"#,
        )
        .unwrap();
        assert_eq!(result["CertificateArn"], "arn:cert");
    }

    #[test]
    fn test_parse_empty_body() {
        let result = parse_response(204, "").unwrap();
        assert!(result.is_null());
    }

    #[test]
    fn test_parse_lambda_error_body() {
        let err = parse_response(
            200,
            r#"{"errorType": "Exception", "errorMessage": "Error occurred: zone not found"}"#,
        )
        .unwrap_err();

        assert_eq!(err.error_type(), "Exception");
        assert_eq!(err.cause(), "Error occurred: zone not found");
    }

    #[test]
    fn test_parse_error_status() {
        let err = parse_response(502, "bad gateway").unwrap_err();
        assert_eq!(err.error_type(), "HttpStatus502");
        assert_eq!(err.cause(), "bad gateway");
    }

    #[test]
    fn test_parse_non_json_success() {
        let err = parse_response(200, "<html>").unwrap_err();
        assert!(matches!(err, TaskError::Json(_)));
    }

    #[test]
    fn test_create_http_registry_complete() {
        let endpoints: HashMap<TaskName, String> = TaskName::ALL
            .iter()
            .map(|t| (*t, format!("http://tasks.local/{}", t)))
            .collect();

        let registry = create_http_registry(&endpoints, Duration::from_secs(5)).unwrap();
        assert!(registry.missing().is_empty());
    }

    #[test]
    fn test_create_http_registry_missing() {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            TaskName::CreateCertificate,
            "http://tasks.local/create_certificate".to_string(),
        );

        let err = create_http_registry(&endpoints, Duration::from_secs(5)).unwrap_err();
        match err {
            TaskError::NotRegistered(names) => {
                assert!(names.contains("report_error"));
                assert!(!names.contains("create_certificate"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_handler_url() {
        let handler = HttpTaskHandler::new(
            TaskName::UpdateDnsRecord,
            "http://tasks.local/update_dns_record",
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(handler.task(), TaskName::UpdateDnsRecord);
        assert_eq!(handler.url(), "http://tasks.local/update_dns_record");
    }
}
