//! Workflow graph.
//!
//! The graph is an immutable adjacency map built once at startup and shared
//! by every run. [`GraphBuilder`] validates topology and applies the catch
//! policy to every task step.

use cutover_tasks::TaskName;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::context::{ContextRef, OutputSlot};
use super::error::GraphError;
use super::step::{
    field, CatchPolicy, ChoiceRule, ChoiceStep, Condition, PassStep, PassTransform, RequestField,
    Step, StepKind, TaskStep, WaitStep,
};

/// Step names of the migration pipeline.
pub mod names {
    pub const CREATE_CERTIFICATE: &str = "CreateCertificate";
    pub const WAIT_FOR_VALIDATION_RECORD: &str = "WaitForValidationRecord";
    pub const CREATE_VALIDATION_RECORD: &str = "CreateValidationRecord";
    pub const CHECK_VALIDATION_STATUS: &str = "CheckValidationStatus";
    pub const IS_VALIDATED: &str = "IsValidated?";
    pub const WAIT_FOR_CERT_VALIDATION: &str = "WaitForCertValidation";
    pub const CHECK_ORIGIN_IS_IP: &str = "CheckOriginIsIP?";
    pub const CREATE_ORIGIN_RECORD: &str = "CreateOriginRecord";
    pub const SET_ORIGIN_DOMAIN_DIRECTLY: &str = "SetOriginDomainDirectly";
    pub const CREATE_WEB_ACL: &str = "CreateWebACL";
    pub const CREATE_CDN_DISTRIBUTION: &str = "CreateCDNDistribution";
    pub const WAIT_FOR_CDN_DISTRIBUTION: &str = "WaitForCDNDistribution";
    pub const CHECK_CDN_DISTRIBUTION_STATUS: &str = "CheckCDNDistributionStatus";
    pub const IS_DISTRIBUTION_DEPLOYED: &str = "IsDistributionDeployed?";
    pub const UPDATE_DNS_RECORD: &str = "UpdateDNSRecord";
}

const VALIDATION_POLL: Duration = Duration::from_secs(30);
const DISTRIBUTION_POLL: Duration = Duration::from_secs(60);

/// Validated, immutable workflow graph.
#[derive(Debug)]
pub struct WorkflowGraph {
    entry: String,
    steps: HashMap<String, Step>,
}

impl WorkflowGraph {
    pub fn builder(entry: impl Into<String>) -> GraphBuilder {
        GraphBuilder {
            entry: entry.into(),
            steps: Vec::new(),
            catch: None,
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the task steps, sorted.
    pub fn task_steps(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .steps
            .values()
            .filter(|s| matches!(s.kind, StepKind::Task(_)))
            .map(|s| s.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// The DNS/CDN migration pipeline.
    pub fn migration_pipeline() -> Result<Self, GraphError> {
        use names::*;

        let certificate_arn =
            || ContextRef::output(OutputSlot::CertificateDetails, "CertificateArn");
        let certificate_domain = || ContextRef::output(OutputSlot::CertificateDetails, "DomainName");

        WorkflowGraph::builder(CREATE_CERTIFICATE)
            .catch_all(TaskName::ReportError)
            .task(
                CREATE_CERTIFICATE,
                TaskName::CreateCertificate,
                OutputSlot::CertificateDetails,
                vec![
                    field("viewer_domain", ContextRef::ViewerDomain),
                    field("migration_id", ContextRef::MigrationId),
                ],
                Some(WAIT_FOR_VALIDATION_RECORD),
            )
            .wait(
                WAIT_FOR_VALIDATION_RECORD,
                VALIDATION_POLL,
                CREATE_VALIDATION_RECORD,
            )
            .task(
                CREATE_VALIDATION_RECORD,
                TaskName::CreateValidationRecord,
                OutputSlot::ValidationDetails,
                vec![
                    field("CertificateArn", certificate_arn()),
                    field("CloudflareZoneID", ContextRef::SourceZoneId),
                    field("CloudflareAPIKey", ContextRef::SourceApiCredential),
                    field("ZoneID", ContextRef::DestinationZoneId),
                    field("migration_id", ContextRef::MigrationId),
                ],
                Some(CHECK_VALIDATION_STATUS),
            )
            .task(
                CHECK_VALIDATION_STATUS,
                TaskName::CheckValidationStatus,
                OutputSlot::ValidationStatus,
                vec![field("CertificateArn", certificate_arn())],
                Some(IS_VALIDATED),
            )
            .choice(
                IS_VALIDATED,
                vec![(
                    Condition::string_equals(
                        ContextRef::output(OutputSlot::ValidationStatus, "ValidationStatus"),
                        "SUCCESS",
                    ),
                    CHECK_ORIGIN_IS_IP,
                )],
                WAIT_FOR_CERT_VALIDATION,
            )
            .wait(
                WAIT_FOR_CERT_VALIDATION,
                VALIDATION_POLL,
                CHECK_VALIDATION_STATUS,
            )
            .choice(
                CHECK_ORIGIN_IS_IP,
                vec![(
                    Condition::string_equals(ContextRef::OriginType, "A"),
                    CREATE_ORIGIN_RECORD,
                )],
                SET_ORIGIN_DOMAIN_DIRECTLY,
            )
            .task(
                CREATE_ORIGIN_RECORD,
                TaskName::CreateOriginRecord,
                OutputSlot::OriginDomain,
                vec![
                    field("DomainName", certificate_domain()),
                    field("origin_info", ContextRef::OriginInfo),
                    field("ZoneID", ContextRef::DestinationZoneId),
                    field("CloudflareZoneID", ContextRef::SourceZoneId),
                    field("CloudflareAPIKey", ContextRef::SourceApiCredential),
                    field("migration_id", ContextRef::MigrationId),
                ],
                Some(CREATE_WEB_ACL),
            )
            .pass(
                SET_ORIGIN_DOMAIN_DIRECTLY,
                PassTransform::CopyInto {
                    source: ContextRef::OriginValue,
                    slot: OutputSlot::OriginDomain,
                    field: "OriginDomain",
                },
                CREATE_WEB_ACL,
            )
            .task(
                CREATE_WEB_ACL,
                TaskName::CreateWebAcl,
                OutputSlot::WebAclDetails,
                vec![
                    field("viewer_domain", ContextRef::ViewerDomain),
                    field("migration_id", ContextRef::MigrationId),
                ],
                Some(CREATE_CDN_DISTRIBUTION),
            )
            .task(
                CREATE_CDN_DISTRIBUTION,
                TaskName::CreateCdnDistribution,
                OutputSlot::DistributionDetails,
                vec![
                    field("CertificateArn", certificate_arn()),
                    field("DomainName", certificate_domain()),
                    field(
                        "OriginDomain",
                        ContextRef::output(OutputSlot::OriginDomain, "OriginDomain"),
                    ),
                    field(
                        "webAclArn",
                        ContextRef::output(OutputSlot::WebAclDetails, "webAclArn"),
                    ),
                    field("migration_id", ContextRef::MigrationId),
                ],
                Some(WAIT_FOR_CDN_DISTRIBUTION),
            )
            .wait(
                WAIT_FOR_CDN_DISTRIBUTION,
                DISTRIBUTION_POLL,
                CHECK_CDN_DISTRIBUTION_STATUS,
            )
            .task(
                CHECK_CDN_DISTRIBUTION_STATUS,
                TaskName::CheckCdnDistributionStatus,
                OutputSlot::DistributionStatus,
                vec![field(
                    "DistributionId",
                    ContextRef::output(OutputSlot::DistributionDetails, "DistributionId"),
                )],
                Some(IS_DISTRIBUTION_DEPLOYED),
            )
            .choice(
                IS_DISTRIBUTION_DEPLOYED,
                vec![(
                    Condition::string_equals(
                        ContextRef::output(OutputSlot::DistributionStatus, "Status"),
                        "Deployed",
                    ),
                    UPDATE_DNS_RECORD,
                )],
                WAIT_FOR_CDN_DISTRIBUTION,
            )
            .task(
                UPDATE_DNS_RECORD,
                TaskName::UpdateDnsRecord,
                OutputSlot::DnsRecordUpdate,
                vec![
                    field("viewer_domain", ContextRef::ViewerDomain),
                    field(
                        "CNAME",
                        ContextRef::output(OutputSlot::DistributionDetails, "DistributionCname"),
                    ),
                    field("ZoneID", ContextRef::DestinationZoneId),
                    field("migration_id", ContextRef::MigrationId),
                ],
                None,
            )
            .build()
    }
}

/// Collects steps and validates them into a [`WorkflowGraph`].
#[derive(Debug)]
pub struct GraphBuilder {
    entry: String,
    steps: Vec<Step>,
    catch: Option<TaskName>,
}

impl GraphBuilder {
    /// Route every task step's failures to `handler`.
    pub fn catch_all(mut self, handler: TaskName) -> Self {
        self.catch = Some(handler);
        self
    }

    pub fn task(
        mut self,
        name: &str,
        task: TaskName,
        output: OutputSlot,
        request: Vec<RequestField>,
        next: Option<&str>,
    ) -> Self {
        self.steps.push(Step {
            name: name.to_string(),
            kind: StepKind::Task(TaskStep {
                task,
                request,
                output,
                next: next.map(str::to_string),
                catch: None,
            }),
        });
        self
    }

    pub fn wait(mut self, name: &str, duration: Duration, next: &str) -> Self {
        self.steps.push(Step {
            name: name.to_string(),
            kind: StepKind::Wait(WaitStep {
                duration,
                next: next.to_string(),
            }),
        });
        self
    }

    pub fn choice(mut self, name: &str, rules: Vec<(Condition, &str)>, default: &str) -> Self {
        let rules = rules
            .into_iter()
            .map(|(condition, next)| ChoiceRule {
                condition,
                next: next.to_string(),
            })
            .collect();

        self.steps.push(Step {
            name: name.to_string(),
            kind: StepKind::Choice(ChoiceStep {
                rules,
                default: default.to_string(),
            }),
        });
        self
    }

    pub fn pass(mut self, name: &str, transform: PassTransform, next: &str) -> Self {
        self.steps.push(Step {
            name: name.to_string(),
            kind: StepKind::Pass(PassStep {
                transform,
                next: next.to_string(),
            }),
        });
        self
    }

    pub fn build(self) -> Result<WorkflowGraph, GraphError> {
        let catch = self.catch.map(|handler| CatchPolicy { handler });

        let mut steps: HashMap<String, Step> = HashMap::with_capacity(self.steps.len());
        let mut producers: BTreeMap<OutputSlot, Vec<String>> = BTreeMap::new();

        for mut step in self.steps {
            if steps.contains_key(&step.name) {
                return Err(GraphError::DuplicateStep(step.name));
            }

            if let Some(slot) = step.output_slot() {
                producers.entry(slot).or_default().push(step.name.clone());
            }

            if let StepKind::Task(task) = &mut step.kind {
                task.catch = catch;
            }

            steps.insert(step.name.clone(), step);
        }

        if !steps.contains_key(&self.entry) {
            return Err(GraphError::UnknownEntry(self.entry));
        }

        for step in steps.values() {
            for target in step.successors() {
                if !steps.contains_key(target) {
                    return Err(GraphError::UnknownSuccessor {
                        step: step.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        // Several producers of one slot are only allowed as alternative
        // branches of the same choice.
        for (slot, names) in &producers {
            if names.len() < 2 {
                continue;
            }

            let exclusive = steps.values().any(|step| {
                matches!(step.kind, StepKind::Choice(_)) && {
                    let targets = step.successors();
                    names.iter().all(|n| targets.contains(&n.as_str()))
                }
            });

            if !exclusive {
                return Err(GraphError::DuplicateProducer {
                    slot: *slot,
                    first: names[0].clone(),
                    second: names[1].clone(),
                });
            }
        }

        Ok(WorkflowGraph {
            entry: self.entry,
            steps,
        })
    }
}
