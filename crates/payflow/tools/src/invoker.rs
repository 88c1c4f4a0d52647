//! The ability invoker: a static, enum-tagged routing table from ability
//! name to provider group, and the uniform success/error envelope.

use crate::external::ExternalSystem;
use chrono::{DateTime, Utc};
use payflow_decision::{ApprovalPolicy, MatchPolicy};
use payflow_types::{
    InvoicePayload, ProviderGroup, PurchaseOrder, Stage, VendorProfile, WorkflowError,
    WorkflowResult,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

// ── Abilities ────────────────────────────────────────────────────────

/// The closed set of routable abilities.
///
/// `provider_group` is the routing table: an exhaustive match, so adding
/// an ability without routing it is a compile error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    // Local, deterministic computation.
    ValidateSchema,
    NormalizeVendor,
    ComputeFlags,
    ComputeMatchScore,
    BuildAccountingEntries,
    // External-system integration.
    OcrExtract,
    EnrichVendor,
    FetchPo,
    FetchGrn,
    FetchHistory,
    ApplyApprovalPolicy,
    PostToErp,
    SchedulePayment,
    NotifyVendor,
    NotifyFinanceTeam,
}

impl Ability {
    pub const ALL: [Ability; 15] = [
        Self::ValidateSchema,
        Self::NormalizeVendor,
        Self::ComputeFlags,
        Self::ComputeMatchScore,
        Self::BuildAccountingEntries,
        Self::OcrExtract,
        Self::EnrichVendor,
        Self::FetchPo,
        Self::FetchGrn,
        Self::FetchHistory,
        Self::ApplyApprovalPolicy,
        Self::PostToErp,
        Self::SchedulePayment,
        Self::NotifyVendor,
        Self::NotifyFinanceTeam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidateSchema => "validate_schema",
            Self::NormalizeVendor => "normalize_vendor",
            Self::ComputeFlags => "compute_flags",
            Self::ComputeMatchScore => "compute_match_score",
            Self::BuildAccountingEntries => "build_accounting_entries",
            Self::OcrExtract => "ocr_extract",
            Self::EnrichVendor => "enrich_vendor",
            Self::FetchPo => "fetch_po",
            Self::FetchGrn => "fetch_grn",
            Self::FetchHistory => "fetch_history",
            Self::ApplyApprovalPolicy => "apply_approval_policy",
            Self::PostToErp => "post_to_erp",
            Self::SchedulePayment => "schedule_payment",
            Self::NotifyVendor => "notify_vendor",
            Self::NotifyFinanceTeam => "notify_finance_team",
        }
    }

    /// Parse an ability name submitted through the uniform contract.
    pub fn parse(name: &str) -> Result<Self, WorkflowError> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == name)
            .ok_or_else(|| WorkflowError::UnknownAbility(name.to_string()))
    }

    /// Which provider group handles this ability.
    pub fn provider_group(&self) -> ProviderGroup {
        match self {
            Self::ValidateSchema
            | Self::NormalizeVendor
            | Self::ComputeFlags
            | Self::ComputeMatchScore
            | Self::BuildAccountingEntries => ProviderGroup::Deterministic,
            Self::OcrExtract
            | Self::EnrichVendor
            | Self::FetchPo
            | Self::FetchGrn
            | Self::FetchHistory
            | Self::ApplyApprovalPolicy
            | Self::PostToErp
            | Self::SchedulePayment
            | Self::NotifyVendor
            | Self::NotifyFinanceTeam => ProviderGroup::External,
        }
    }
}

impl std::fmt::Display for Ability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Contract Types ───────────────────────────────────────────────────

/// Caller context threaded through every ability invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbilityContext {
    pub workflow_id: String,
    pub stage: Stage,
}

impl AbilityContext {
    pub fn new(workflow_id: impl Into<String>, stage: Stage) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            stage,
        }
    }
}

/// Uniform success/error envelope returned for every ability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbilityOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AbilityOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    /// Unwrap the envelope, mapping a failure to `AbilityExecution`.
    pub fn into_data(self, ability: Ability) -> WorkflowResult<Value> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(WorkflowError::AbilityExecution {
                ability: ability.as_str().to_string(),
                message: self.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}

// ── Invoker ──────────────────────────────────────────────────────────

/// Single entry point for ability execution.
///
/// Deterministic abilities run in-process against the decision engine;
/// external abilities are delegated to the configured [`ExternalSystem`]
/// connector. A handler failure is carried in the envelope — the invoker
/// itself only errors on an unknown ability name.
#[derive(Clone)]
pub struct AbilityInvoker {
    external: Arc<dyn ExternalSystem>,
}

impl AbilityInvoker {
    pub fn new(external: Arc<dyn ExternalSystem>) -> Self {
        Self { external }
    }

    pub async fn execute(
        &self,
        ability_name: &str,
        payload: Value,
        context: &AbilityContext,
    ) -> WorkflowResult<AbilityOutcome> {
        let ability = Ability::parse(ability_name)?;

        tracing::info!(
            ability = %ability,
            group = %ability.provider_group(),
            workflow_id = %context.workflow_id,
            stage = %context.stage,
            "executing ability"
        );

        let outcome = match ability {
            Ability::ValidateSchema => wrap(validate_schema(&payload)),
            Ability::NormalizeVendor => wrap(normalize_vendor(&payload)),
            Ability::ComputeFlags => wrap(compute_flags(&payload)),
            Ability::ComputeMatchScore => wrap(compute_match_score(&payload)),
            Ability::BuildAccountingEntries => wrap(build_accounting_entries(&payload)),
            Ability::OcrExtract
            | Ability::EnrichVendor
            | Ability::FetchPo
            | Ability::FetchGrn
            | Ability::FetchHistory
            | Ability::ApplyApprovalPolicy
            | Ability::PostToErp
            | Ability::SchedulePayment
            | Ability::NotifyVendor
            | Ability::NotifyFinanceTeam => {
                match self.external.call(ability, payload, context).await {
                    Ok(data) => AbilityOutcome::ok(data),
                    Err(e) => {
                        tracing::error!(ability = %ability, error = %e, "external ability failed");
                        AbilityOutcome::err(e.to_string())
                    }
                }
            }
        };

        Ok(outcome)
    }
}

fn wrap(result: Result<Value, String>) -> AbilityOutcome {
    match result {
        Ok(data) => AbilityOutcome::ok(data),
        Err(message) => AbilityOutcome::err(message),
    }
}

// ── Deterministic Handlers ───────────────────────────────────────────

fn field<T: DeserializeOwned>(payload: &Value, key: &str) -> Result<T, String> {
    serde_json::from_value(payload.get(key).cloned().unwrap_or(Value::Null))
        .map_err(|e| format!("invalid '{key}' field: {e}"))
}

fn validate_schema(payload: &Value) -> Result<Value, String> {
    let invoice: InvoicePayload = field(payload, "invoice_payload")?;
    let violations = payflow_decision::validate_invoice(&invoice);
    Ok(json!({
        "validated": violations.is_empty(),
        "validation_errors": violations,
        "validated_at": Utc::now(),
    }))
}

fn normalize_vendor(payload: &Value) -> Result<Value, String> {
    let vendor_name: String = field(payload, "vendor_name")?;
    let normalized = payflow_decision::normalize_vendor_name(&vendor_name);
    serde_json::to_value(normalized).map_err(|e| e.to_string())
}

fn compute_flags(payload: &Value) -> Result<Value, String> {
    let invoice: InvoicePayload = field(payload, "invoice")?;
    let vendor: VendorProfile = field(payload, "vendor_profile")?;
    let flags = payflow_decision::compute_flags(&invoice, &vendor);
    serde_json::to_value(flags).map_err(|e| e.to_string())
}

fn compute_match_score(payload: &Value) -> Result<Value, String> {
    let invoice: InvoicePayload = field(payload, "invoice")?;
    let po: Option<PurchaseOrder> = field(payload, "po")?;
    let policy = MatchPolicy {
        match_threshold: field(payload, "match_threshold")?,
        tolerance_pct: field(payload, "tolerance_pct")?,
    };
    let matched = payflow_decision::score_two_way(&invoice, po.as_ref(), &policy);
    Ok(json!({
        "match_score": matched.score,
        "match_result": matched.result,
        "match_evidence": matched.evidence,
    }))
}

fn build_accounting_entries(payload: &Value) -> Result<Value, String> {
    let invoice: InvoicePayload = field(payload, "invoice")?;
    let vendor: VendorProfile = field(payload, "vendor_profile")?;
    let (entries, report) = payflow_decision::build_accounting_entries(&invoice, &vendor);
    Ok(json!({
        "accounting_entries": entries,
        "reconciliation_report": report,
    }))
}

// The simulated adapter's approval handler shares this policy shape.
pub(crate) fn approval_policy_from_payload(payload: &Value) -> ApprovalPolicy {
    ApprovalPolicy {
        auto_approve_threshold: payload
            .get("auto_approve_threshold")
            .and_then(Value::as_f64)
            .unwrap_or_else(|| ApprovalPolicy::default().auto_approve_threshold),
        ..ApprovalPolicy::default()
    }
}
