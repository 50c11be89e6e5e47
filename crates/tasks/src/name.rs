//! Task names understood by the external handlers.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// One external side effect of the migration pipeline.
///
/// The string form is part of the contract with the handlers and with
/// configuration (`create_certificate=https://...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskName {
    /// Request a DNS-validated certificate for the viewer domain.
    CreateCertificate,
    /// Publish the certificate validation record at the source provider.
    CreateValidationRecord,
    /// Read the certificate validation status.
    CheckValidationStatus,
    /// Create a dedicated origin hostname for an IP origin.
    CreateOriginRecord,
    /// Create the edge security policy.
    CreateWebAcl,
    /// Provision the CDN distribution.
    CreateCdnDistribution,
    /// Read the distribution deployment status.
    CheckCdnDistributionStatus,
    /// Point the viewer domain at the distribution.
    UpdateDnsRecord,
    /// Record a failed step.
    ReportError,
}

impl TaskName {
    /// Every task, in pipeline order with the error reporter last.
    pub const ALL: [TaskName; 9] = [
        TaskName::CreateCertificate,
        TaskName::CreateValidationRecord,
        TaskName::CheckValidationStatus,
        TaskName::CreateOriginRecord,
        TaskName::CreateWebAcl,
        TaskName::CreateCdnDistribution,
        TaskName::CheckCdnDistributionStatus,
        TaskName::UpdateDnsRecord,
        TaskName::ReportError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::CreateCertificate => "create_certificate",
            TaskName::CreateValidationRecord => "create_validation_record",
            TaskName::CheckValidationStatus => "check_validation_status",
            TaskName::CreateOriginRecord => "create_origin_record",
            TaskName::CreateWebAcl => "create_web_acl",
            TaskName::CreateCdnDistribution => "create_cdn_distribution",
            TaskName::CheckCdnDistributionStatus => "check_cdn_distribution_status",
            TaskName::UpdateDnsRecord => "update_dns_record",
            TaskName::ReportError => "report_error",
        }
    }
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskName::ALL
            .iter()
            .copied()
            .find(|task| task.as_str() == s.trim())
            .ok_or_else(|| TaskError::NotRegistered(s.to_string()))
    }
}
