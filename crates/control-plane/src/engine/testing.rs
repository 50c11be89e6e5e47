//! Scripted task executor for engine tests.

use async_trait::async_trait;
use cutover_tasks::{TaskError, TaskExecutor, TaskName};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Answers every task with a canned result and records each call.
///
/// Queued results are consumed first; once a task's queue is empty it
/// falls back to its default, which describes a healthy migration.
#[derive(Default)]
pub struct ScriptedExecutor {
    queued: Mutex<HashMap<TaskName, VecDeque<Result<Value, TaskError>>>>,
    defaults: Mutex<HashMap<TaskName, Value>>,
    delays: Mutex<HashMap<TaskName, Duration>>,
    calls: Mutex<Vec<(TaskName, Value)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-off result for `task`.
    pub fn push(&self, task: TaskName, result: Result<Value, TaskError>) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(task)
            .or_default()
            .push_back(result);
        self
    }

    /// Queue a failure for `task`.
    pub fn fail(&self, task: TaskName, error_type: &str, message: &str) -> &Self {
        self.push(
            task,
            Err(TaskError::Failed {
                error_type: error_type.to_string(),
                message: message.to_string(),
            }),
        )
    }

    /// Replace the fallback result for `task`.
    pub fn set_default(&self, task: TaskName, value: Value) -> &Self {
        self.defaults.lock().unwrap().insert(task, value);
        self
    }

    /// Make every call to `task` take `delay` of (virtual) time.
    pub fn delay(&self, task: TaskName, delay: Duration) -> &Self {
        self.delays.lock().unwrap().insert(task, delay);
        self
    }

    pub fn calls(&self) -> Vec<(TaskName, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tasks(&self) -> Vec<TaskName> {
        self.calls().into_iter().map(|(task, _)| task).collect()
    }

    pub fn count(&self, task: TaskName) -> usize {
        self.tasks().into_iter().filter(|t| *t == task).count()
    }

    /// Request of the most recent call to `task`.
    pub fn last_request(&self, task: TaskName) -> Option<Value> {
        self.calls()
            .into_iter()
            .rev()
            .find(|(t, _)| *t == task)
            .map(|(_, request)| request)
    }

    fn healthy_result(task: TaskName, request: &Value) -> Value {
        match task {
            TaskName::CreateCertificate => json!({
                "status": "success",
                "CertificateArn": "arn:aws:acm:us-east-1:123456789012:certificate/abc",
                "DomainName": request["viewer_domain"],
            }),
            TaskName::CreateValidationRecord => json!({"status": "success"}),
            TaskName::CheckValidationStatus => json!({"ValidationStatus": "SUCCESS"}),
            TaskName::CreateOriginRecord => json!({
                "OriginDomain": format!(
                    "k3j9x2qa.origin.{}",
                    request["DomainName"].as_str().unwrap_or_default()
                ),
            }),
            TaskName::CreateWebAcl => json!({
                "webAclArn": "arn:aws:wafv2:us-east-1:123456789012:global/webacl/x",
            }),
            TaskName::CreateCdnDistribution => json!({
                "DistributionId": "E2QWRUHAPOMQZL",
                "DistributionCname": "d111111abcdef8.cloudfront.net",
            }),
            TaskName::CheckCdnDistributionStatus => json!({"Status": "Deployed"}),
            TaskName::UpdateDnsRecord => json!({"status": "success"}),
            TaskName::ReportError => json!({"statusCode": 200}),
        }
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn invoke(&self, task: TaskName, request: Value) -> Result<Value, TaskError> {
        self.calls.lock().unwrap().push((task, request.clone()));

        let delay = self.delays.lock().unwrap().get(&task).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&task)
            .and_then(VecDeque::pop_front);
        if let Some(result) = queued {
            return result;
        }

        let default = self.defaults.lock().unwrap().get(&task).cloned();
        Ok(default.unwrap_or_else(|| Self::healthy_result(task, &request)))
    }
}
