//! Workflow step definitions.

use cutover_tasks::{TaskError, TaskName};
use std::time::Duration;

use super::context::{ContextRef, MigrationContext, OutputSlot};
use super::error::ContextError;

/// A named node in the workflow graph.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub kind: StepKind,
}

#[derive(Debug, Clone)]
pub enum StepKind {
    Task(TaskStep),
    Wait(WaitStep),
    Choice(ChoiceStep),
    Pass(PassStep),
}

impl Step {
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            StepKind::Task(_) => "task",
            StepKind::Wait(_) => "wait",
            StepKind::Choice(_) => "choice",
            StepKind::Pass(_) => "pass",
        }
    }

    /// Every step this one can transition to.
    pub fn successors(&self) -> Vec<&str> {
        match &self.kind {
            StepKind::Task(task) => task.next.iter().map(String::as_str).collect(),
            StepKind::Wait(wait) => vec![wait.next.as_str()],
            StepKind::Choice(choice) => choice
                .rules
                .iter()
                .map(|r| r.next.as_str())
                .chain(std::iter::once(choice.default.as_str()))
                .collect(),
            StepKind::Pass(pass) => vec![pass.next.as_str()],
        }
    }

    /// Output slot this step writes, if any.
    pub fn output_slot(&self) -> Option<OutputSlot> {
        match &self.kind {
            StepKind::Task(task) => Some(task.output),
            StepKind::Pass(PassStep {
                transform: PassTransform::CopyInto { slot, .. },
                ..
            }) => Some(*slot),
            _ => None,
        }
    }
}

/// One field of a task request, read from the context.
#[derive(Debug, Clone)]
pub struct RequestField {
    pub name: &'static str,
    pub source: ContextRef,
}

/// Shorthand for building request projections.
pub fn field(name: &'static str, source: ContextRef) -> RequestField {
    RequestField { name, source }
}

/// Route task failures to a shared reporting task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchPolicy {
    pub handler: TaskName,
}

/// Invoke an external task and store its result.
#[derive(Debug, Clone)]
pub struct TaskStep {
    pub task: TaskName,
    pub request: Vec<RequestField>,
    pub output: OutputSlot,
    /// `None` marks a terminal step.
    pub next: Option<String>,
    pub catch: Option<CatchPolicy>,
}

impl TaskStep {
    /// Build the request payload from the context.
    ///
    /// A missing source field fails the step like any executor error.
    pub fn project(&self, ctx: &MigrationContext) -> Result<serde_json::Value, TaskError> {
        let mut request = serde_json::Map::with_capacity(self.request.len());
        for field in &self.request {
            let value = ctx.resolve(&field.source).ok_or_else(|| {
                TaskError::InvalidRequest(format!(
                    "'{}' requires '{}', which is not in the context",
                    field.name, field.source
                ))
            })?;
            request.insert(field.name.to_string(), value);
        }
        Ok(serde_json::Value::Object(request))
    }
}

/// Suspend the run for a fixed duration.
#[derive(Debug, Clone)]
pub struct WaitStep {
    pub duration: Duration,
    pub next: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The referenced value is a string equal to `value`.
    StringEquals { path: ContextRef, value: String },
}

impl Condition {
    pub fn string_equals(path: ContextRef, value: impl Into<String>) -> Self {
        Condition::StringEquals {
            path,
            value: value.into(),
        }
    }

    /// Missing paths evaluate to false.
    pub fn evaluate(&self, ctx: &MigrationContext) -> bool {
        match self {
            Condition::StringEquals { path, value } => ctx
                .resolve(path)
                .and_then(|v| v.as_str().map(|s| s == value))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChoiceRule {
    pub condition: Condition,
    pub next: String,
}

/// Branch on the context. First matching rule wins.
#[derive(Debug, Clone)]
pub struct ChoiceStep {
    pub rules: Vec<ChoiceRule>,
    pub default: String,
}

impl ChoiceStep {
    pub fn select(&self, ctx: &MigrationContext) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.condition.evaluate(ctx))
            .map(|rule| rule.next.as_str())
            .unwrap_or(self.default.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum PassTransform {
    /// Write `{field: source}` into `slot`.
    CopyInto {
        source: ContextRef,
        slot: OutputSlot,
        field: &'static str,
    },
}

/// Pure context transformation; never calls an executor.
#[derive(Debug, Clone)]
pub struct PassStep {
    pub transform: PassTransform,
    pub next: String,
}

impl PassStep {
    pub fn apply(&self, step: &str, ctx: &mut MigrationContext) -> Result<(), ContextError> {
        match &self.transform {
            PassTransform::CopyInto {
                source,
                slot,
                field,
            } => {
                let value = ctx.resolve(source).unwrap_or(serde_json::Value::Null);
                let mut output = serde_json::Map::new();
                output.insert(field.to_string(), value);
                ctx.merge_output(step, *slot, serde_json::Value::Object(output))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::{sample_input, OriginType};
    use serde_json::json;

    fn context(origin_type: OriginType) -> MigrationContext {
        MigrationContext::new("mig-1", 1_700_000_000, sample_input(origin_type, "origin.example.com"))
    }

    #[test]
    fn test_project_request() {
        let mut ctx = context(OriginType::Cname);
        ctx.merge_output(
            "CreateCertificate",
            OutputSlot::CertificateDetails,
            json!({"CertificateArn": "arn:cert", "DomainName": "www.example.com"}),
        )
        .unwrap();

        let step = TaskStep {
            task: TaskName::CreateValidationRecord,
            request: vec![
                field(
                    "CertificateArn",
                    ContextRef::output(OutputSlot::CertificateDetails, "CertificateArn"),
                ),
                field("CloudflareAPIKey", ContextRef::SourceApiCredential),
                field("migration_id", ContextRef::MigrationId),
            ],
            output: OutputSlot::ValidationDetails,
            next: None,
            catch: None,
        };

        assert_eq!(
            step.project(&ctx).unwrap(),
            json!({
                "CertificateArn": "arn:cert",
                "CloudflareAPIKey": "cf-secret-token",
                "migration_id": "mig-1"
            })
        );
    }

    #[test]
    fn test_project_missing_field() {
        let ctx = context(OriginType::Cname);
        let step = TaskStep {
            task: TaskName::CheckCdnDistributionStatus,
            request: vec![field(
                "DistributionId",
                ContextRef::output(OutputSlot::DistributionDetails, "DistributionId"),
            )],
            output: OutputSlot::DistributionStatus,
            next: None,
            catch: None,
        };

        let err = step.project(&ctx).unwrap_err();
        assert_eq!(err.error_type(), "InvalidRequest");
        assert!(err.cause().contains("distributionDetails.DistributionId"));
    }

    #[test]
    fn test_choice_first_match_wins() {
        let choice = ChoiceStep {
            rules: vec![
                ChoiceRule {
                    condition: Condition::string_equals(ContextRef::OriginType, "A"),
                    next: "CreateOriginRecord".to_string(),
                },
                ChoiceRule {
                    condition: Condition::string_equals(ContextRef::OriginType, "A"),
                    next: "Unreachable".to_string(),
                },
            ],
            default: "SetOriginDomainDirectly".to_string(),
        };

        assert_eq!(choice.select(&context(OriginType::A)), "CreateOriginRecord");
        assert_eq!(
            choice.select(&context(OriginType::Cname)),
            "SetOriginDomainDirectly"
        );
    }

    #[test]
    fn test_condition_missing_path_is_false() {
        let ctx = context(OriginType::Cname);
        let condition = Condition::string_equals(
            ContextRef::output(OutputSlot::ValidationStatus, "ValidationStatus"),
            "SUCCESS",
        );
        assert!(!condition.evaluate(&ctx));
    }

    #[test]
    fn test_pass_copies_origin() {
        let mut ctx = context(OriginType::Cname);
        let pass = PassStep {
            transform: PassTransform::CopyInto {
                source: ContextRef::OriginValue,
                slot: OutputSlot::OriginDomain,
                field: "OriginDomain",
            },
            next: "CreateWebACL".to_string(),
        };

        pass.apply("SetOriginDomainDirectly", &mut ctx).unwrap();
        assert_eq!(ctx.origin_domain(), Some("origin.example.com"));
    }

    #[test]
    fn test_successors() {
        let step = Step {
            name: "IsValidated?".to_string(),
            kind: StepKind::Choice(ChoiceStep {
                rules: vec![ChoiceRule {
                    condition: Condition::string_equals(ContextRef::OriginType, "A"),
                    next: "CheckOriginIsIP?".to_string(),
                }],
                default: "WaitForCertValidation".to_string(),
            }),
        };
        assert_eq!(
            step.successors(),
            vec!["CheckOriginIsIP?", "WaitForCertValidation"]
        );
        assert_eq!(step.kind_name(), "choice");
        assert_eq!(step.output_slot(), None);
    }
}
