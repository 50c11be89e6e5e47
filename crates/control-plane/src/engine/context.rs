//! Per-run migration context.
//!
//! A context is created once per run from the start request and threaded
//! through every step. Run inputs are immutable after creation. Step results
//! land in named output slots, each owned by exactly one producing step.

use cutover_tasks::TaskError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::error::{ContextError, InputError};

/// Kind of origin the CDN should front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginType {
    /// Origin is an IP address; a DNS record must be created for it.
    #[serde(rename = "A")]
    A,
    /// Origin is already a hostname.
    #[serde(rename = "CNAME")]
    Cname,
}

impl OriginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginType::A => "A",
            OriginType::Cname => "CNAME",
        }
    }
}

/// Origin description supplied at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginInfo {
    #[serde(rename = "type")]
    pub origin_type: OriginType,
    pub value: String,
}

/// Source DNS provider API credential. Never printed or serialized.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw credential, for request projection only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Start-migration input.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationInput {
    pub viewer_domain: String,
    pub source_zone_id: String,
    pub source_api_credential: Credential,
    pub destination_zone_id: String,
    pub origin_info: OriginInfo,
}

impl MigrationInput {
    /// Check that every field is present and non-blank.
    ///
    /// Reports the first offending field.
    pub fn validate(&self) -> Result<(), InputError> {
        let fields = [
            ("viewerDomain", self.viewer_domain.as_str()),
            ("sourceZoneId", self.source_zone_id.as_str()),
            ("destinationZoneId", self.destination_zone_id.as_str()),
            ("originInfo.value", self.origin_info.value.as_str()),
        ];

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(InputError::MissingField(name));
            }
        }

        if self.source_api_credential.is_empty() {
            return Err(InputError::MissingField("sourceApiCredential"));
        }

        Ok(())
    }
}

/// Named result slot in the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputSlot {
    CertificateDetails,
    ValidationDetails,
    ValidationStatus,
    OriginDomain,
    WebAclDetails,
    DistributionDetails,
    DistributionStatus,
    DnsRecordUpdate,
}

impl OutputSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSlot::CertificateDetails => "certificateDetails",
            OutputSlot::ValidationDetails => "validationDetails",
            OutputSlot::ValidationStatus => "validationStatus",
            OutputSlot::OriginDomain => "originDomain",
            OutputSlot::WebAclDetails => "webAclDetails",
            OutputSlot::DistributionDetails => "distributionDetails",
            OutputSlot::DistributionStatus => "distributionStatus",
            OutputSlot::DnsRecordUpdate => "dnsRecordUpdate",
        }
    }
}

impl fmt::Display for OutputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{Error, Cause}` pair reported for a failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "Error")]
    pub error: String,
    #[serde(rename = "Cause")]
    pub cause: String,
}

impl From<&TaskError> for ErrorInfo {
    fn from(err: &TaskError) -> Self {
        Self {
            error: err.error_type().to_string(),
            cause: err.cause(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.cause)
    }
}

/// Failure captured on the error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub step_name: String,
    pub error_info: ErrorInfo,
}

#[derive(Debug, Clone, Serialize)]
struct SlotValue {
    producer: String,
    value: serde_json::Value,
}

/// Read-only reference into the context, used by projections and predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextRef {
    MigrationId,
    ViewerDomain,
    SourceZoneId,
    SourceApiCredential,
    DestinationZoneId,
    OriginInfo,
    OriginType,
    OriginValue,
    /// A top-level field of a step output.
    Output {
        slot: OutputSlot,
        field: &'static str,
    },
}

impl ContextRef {
    /// Shorthand for an output field reference.
    pub fn output(slot: OutputSlot, field: &'static str) -> Self {
        ContextRef::Output { slot, field }
    }
}

impl fmt::Display for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextRef::MigrationId => f.write_str("migrationId"),
            ContextRef::ViewerDomain => f.write_str("viewerDomain"),
            ContextRef::SourceZoneId => f.write_str("sourceZoneId"),
            ContextRef::SourceApiCredential => f.write_str("sourceApiCredential"),
            ContextRef::DestinationZoneId => f.write_str("destinationZoneId"),
            ContextRef::OriginInfo => f.write_str("originInfo"),
            ContextRef::OriginType => f.write_str("originInfo.type"),
            ContextRef::OriginValue => f.write_str("originInfo.value"),
            ContextRef::Output { slot, field } => write!(f, "{}.{}", slot, field),
        }
    }
}

/// State of a single migration run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationContext {
    migration_id: String,
    start_time: i64,
    viewer_domain: String,
    source_zone_id: String,
    #[serde(skip)]
    source_api_credential: Credential,
    destination_zone_id: String,
    origin_info: OriginInfo,
    outputs: BTreeMap<OutputSlot, SlotValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<StepFailure>,
}

impl MigrationContext {
    /// Create the context for a new run.
    pub fn new(migration_id: impl Into<String>, start_time: i64, input: MigrationInput) -> Self {
        Self {
            migration_id: migration_id.into(),
            start_time,
            viewer_domain: input.viewer_domain,
            source_zone_id: input.source_zone_id,
            source_api_credential: input.source_api_credential,
            destination_zone_id: input.destination_zone_id,
            origin_info: input.origin_info,
            outputs: BTreeMap::new(),
            error: None,
        }
    }

    pub fn migration_id(&self) -> &str {
        &self.migration_id
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn viewer_domain(&self) -> &str {
        &self.viewer_domain
    }

    pub fn origin_info(&self) -> &OriginInfo {
        &self.origin_info
    }

    /// Result stored in a slot, if its producer has run.
    pub fn output(&self, slot: OutputSlot) -> Option<&serde_json::Value> {
        self.outputs.get(&slot).map(|s| &s.value)
    }

    /// Top-level field of a slot's result.
    pub fn output_field(&self, slot: OutputSlot, field: &str) -> Option<&serde_json::Value> {
        self.output(slot).and_then(|v| v.get(field))
    }

    /// Resolved origin host, once `originDomain` is written.
    pub fn origin_domain(&self) -> Option<&str> {
        self.output_field(OutputSlot::OriginDomain, "OriginDomain")
            .and_then(|v| v.as_str())
    }

    /// Store `value` in `slot` on behalf of `step`.
    ///
    /// The first writer becomes the slot's owner. The owner may overwrite
    /// its own slot (polling); any other step is rejected.
    pub fn merge_output(
        &mut self,
        step: &str,
        slot: OutputSlot,
        value: serde_json::Value,
    ) -> Result<(), ContextError> {
        if let Some(existing) = self.outputs.get_mut(&slot) {
            if existing.producer != step {
                return Err(ContextError::SlotOwned {
                    slot,
                    owner: existing.producer.clone(),
                    step: step.to_string(),
                });
            }
            existing.value = value;
            return Ok(());
        }

        self.outputs.insert(
            slot,
            SlotValue {
                producer: step.to_string(),
                value,
            },
        );
        Ok(())
    }

    /// Read a value referenced by a projection or predicate.
    pub fn resolve(&self, reference: &ContextRef) -> Option<serde_json::Value> {
        use serde_json::Value;

        match reference {
            ContextRef::MigrationId => Some(Value::String(self.migration_id.clone())),
            ContextRef::ViewerDomain => Some(Value::String(self.viewer_domain.clone())),
            ContextRef::SourceZoneId => Some(Value::String(self.source_zone_id.clone())),
            ContextRef::SourceApiCredential => Some(Value::String(
                self.source_api_credential.expose().to_string(),
            )),
            ContextRef::DestinationZoneId => {
                Some(Value::String(self.destination_zone_id.clone()))
            }
            ContextRef::OriginInfo => serde_json::to_value(&self.origin_info).ok(),
            ContextRef::OriginType => {
                Some(Value::String(self.origin_info.origin_type.as_str().to_string()))
            }
            ContextRef::OriginValue => Some(Value::String(self.origin_info.value.clone())),
            ContextRef::Output { slot, field } => self.output_field(*slot, field).cloned(),
        }
    }

    /// Failure recorded on the error path.
    pub fn error(&self) -> Option<&StepFailure> {
        self.error.as_ref()
    }

    pub(crate) fn set_error(&mut self, failure: StepFailure) {
        self.error = Some(failure);
    }

    /// Run inputs safe to persist (no credential).
    pub fn input_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "viewerDomain": self.viewer_domain,
            "sourceZoneId": self.source_zone_id,
            "destinationZoneId": self.destination_zone_id,
            "originInfo": self.origin_info,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_input(origin_type: OriginType, origin_value: &str) -> MigrationInput {
    MigrationInput {
        viewer_domain: "www.example.com".to_string(),
        source_zone_id: "cf-zone-123".to_string(),
        source_api_credential: Credential::new("cf-secret-token"),
        destination_zone_id: "Z0123456789".to_string(),
        origin_info: OriginInfo {
            origin_type,
            value: origin_value.to_string(),
        },
    }
}
