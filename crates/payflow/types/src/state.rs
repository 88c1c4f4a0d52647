//! Workflow state: the single mutable aggregate threaded through a run.
//!
//! Stages never mutate the state directly. Each stage function returns a
//! [`StageUpdate`] and [`WorkflowState::apply`] folds it in with
//! field-level replace-or-append semantics: scalar fields replace, the
//! stage-output and ability-call sequences append. One [`StageOutput`] is
//! appended per applied update, in execution order.

use crate::accounting::{AccountingEntry, ReconciliationReport};
use crate::checkpoint::{CheckpointId, HumanDecision};
use crate::invoice::{InvoicePayload, LineItem, PurchaseOrder, RiskFlags, VendorProfile};
use crate::matching::{MatchEvidence, MatchResult};
use crate::selection::{AbilityCall, ToolSelection};
use crate::stage::{Stage, StageOutput, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Short hex fragment for human-scannable identifiers.
pub(crate) fn short_hex(len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..len.min(hex.len())].to_string()
}

// ── Workflow Identifier ──────────────────────────────────────────────

/// Unique identifier for a workflow instance. Assigned once at creation,
/// never changed afterward.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn generate() -> Self {
        Self(format!("wf_{}", short_hex(12)))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Status Enums ─────────────────────────────────────────────────────

/// Lifecycle status of a workflow instance.
///
/// Transitions are monotonic except for the AWAITING_HUMAN ↔ IN_PROGRESS
/// pair around a checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    #[default]
    Initiated,
    InProgress,
    AwaitingHuman,
    Completed,
    Failed,
    ManualHandoff,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::ManualHandoff)
    }
}

/// Approval outcome for an invoice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    AutoApproved,
    RequiresApproval,
}

/// One row of the audit-log projection assembled at COMPLETE.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub stage: Stage,
    pub status: StageStatus,
    pub timestamp: DateTime<Utc>,
}

// ── Workflow State ───────────────────────────────────────────────────

/// Complete workflow state persisting across all stages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowState {
    // Workflow metadata.
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub status: WorkflowStatus,
    /// Name of the active/next stage.
    pub current_stage: Stage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Input data.
    pub invoice: InvoicePayload,

    // INTAKE outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validated: bool,

    // UNDERSTAND outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_text: Option<String>,
    #[serde(default)]
    pub parsed_line_items: Vec<LineItem>,
    #[serde(default)]
    pub detected_pos: Vec<String>,

    // PREPARE outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_profile: Option<VendorProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<RiskFlags>,

    // RETRIEVE outputs. GRNs and history are retained for reviewers even
    // though only the PO feeds the two-way match.
    #[serde(default)]
    pub matched_pos: Vec<PurchaseOrder>,
    #[serde(default)]
    pub matched_grns: Vec<serde_json::Value>,
    #[serde(default)]
    pub history: Vec<serde_json::Value>,

    // MATCH outputs.
    #[serde(default)]
    pub match_score: f64,
    #[serde(default)]
    pub match_result: MatchResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_evidence: Option<MatchEvidence>,
    #[serde(default)]
    pub requires_human_review: bool,

    // CHECKPOINT outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_reason: Option<String>,

    // HITL_DECISION outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_decision: Option<HumanDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<Stage>,

    // RECONCILE outputs.
    #[serde(default)]
    pub accounting_entries: Vec<AccountingEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation_report: Option<ReconciliationReport>,

    // APPROVE outputs.
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<String>,

    // POSTING outputs.
    #[serde(default)]
    pub posted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erp_txn_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_payment_id: Option<String>,

    // NOTIFY outputs.
    #[serde(default)]
    pub notified_parties: Vec<String>,

    // COMPLETE outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub audit_log: Vec<AuditLogEntry>,

    // Execution tracking. Append-only, one entry per executed stage.
    #[serde(default)]
    pub stage_outputs: Vec<StageOutput>,
    #[serde(default)]
    pub errors: Vec<String>,

    // Tool and ability audit trails.
    #[serde(default)]
    pub tool_selections: BTreeMap<String, String>,
    #[serde(default)]
    pub ability_calls: Vec<AbilityCall>,
}

impl WorkflowState {
    /// Build the initial state for a new workflow instance.
    pub fn new(invoice: InvoicePayload) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: WorkflowId::generate(),
            workflow_name: "invoice_to_pay_v1".to_string(),
            status: WorkflowStatus::Initiated,
            current_stage: Stage::Intake,
            created_at: now,
            updated_at: now,
            invoice,
            raw_id: None,
            ingest_ts: None,
            validated: false,
            invoice_text: None,
            parsed_line_items: Vec::new(),
            detected_pos: Vec::new(),
            vendor_profile: None,
            flags: None,
            matched_pos: Vec::new(),
            matched_grns: Vec::new(),
            history: Vec::new(),
            match_score: 0.0,
            match_result: MatchResult::Pending,
            match_evidence: None,
            requires_human_review: false,
            checkpoint_id: None,
            review_url: None,
            paused_reason: None,
            human_decision: None,
            reviewer_id: None,
            reviewer_notes: None,
            resume_token: None,
            next_stage: None,
            accounting_entries: Vec::new(),
            reconciliation_report: None,
            approval_status: ApprovalStatus::Pending,
            approver_id: None,
            posted: false,
            erp_txn_id: None,
            scheduled_payment_id: None,
            notified_parties: Vec::new(),
            final_payload: None,
            audit_log: Vec::new(),
            stage_outputs: Vec::new(),
            errors: Vec::new(),
            tool_selections: BTreeMap::new(),
            ability_calls: Vec::new(),
        }
    }

    /// Fold one stage's partial update into the state.
    ///
    /// Scalar fields replace; `stage_outputs`, `ability_calls`, `errors`
    /// and the tool-selection map only grow. Exactly one [`StageOutput`]
    /// is appended per call, stamped with the executing stage.
    pub fn apply(&mut self, stage: Stage, update: StageUpdate) {
        let StageUpdate {
            status,
            raw_id,
            ingest_ts,
            validated,
            invoice_text,
            parsed_line_items,
            detected_pos,
            vendor_profile,
            flags,
            matched_pos,
            matched_grns,
            history,
            match_score,
            match_result,
            match_evidence,
            requires_human_review,
            checkpoint_id,
            review_url,
            paused_reason,
            next_stage,
            accounting_entries,
            reconciliation_report,
            approval_status,
            approver_id,
            posted,
            erp_txn_id,
            scheduled_payment_id,
            notified_parties,
            final_payload,
            audit_log,
            output_status,
            output_data,
            tool_selections,
            ability_calls,
            errors,
        } = update;

        if let Some(v) = status {
            self.status = v;
        }
        if let Some(v) = raw_id {
            self.raw_id = Some(v);
        }
        if let Some(v) = ingest_ts {
            self.ingest_ts = Some(v);
        }
        if let Some(v) = validated {
            self.validated = v;
        }
        if let Some(v) = invoice_text {
            self.invoice_text = Some(v);
        }
        if let Some(v) = parsed_line_items {
            self.parsed_line_items = v;
        }
        if let Some(v) = detected_pos {
            self.detected_pos = v;
        }
        if let Some(v) = vendor_profile {
            self.vendor_profile = Some(v);
        }
        if let Some(v) = flags {
            self.flags = Some(v);
        }
        if let Some(v) = matched_pos {
            self.matched_pos = v;
        }
        if let Some(v) = matched_grns {
            self.matched_grns = v;
        }
        if let Some(v) = history {
            self.history = v;
        }
        if let Some(v) = match_score {
            self.match_score = v;
        }
        if let Some(v) = match_result {
            self.match_result = v;
        }
        if let Some(v) = match_evidence {
            self.match_evidence = Some(v);
        }
        if let Some(v) = requires_human_review {
            self.requires_human_review = v;
        }
        if let Some(v) = checkpoint_id {
            self.checkpoint_id = Some(v);
        }
        if let Some(v) = review_url {
            self.review_url = Some(v);
        }
        if let Some(v) = paused_reason {
            self.paused_reason = Some(v);
        }
        if let Some(v) = next_stage {
            self.next_stage = Some(v);
        }
        if let Some(v) = accounting_entries {
            self.accounting_entries = v;
        }
        if let Some(v) = reconciliation_report {
            self.reconciliation_report = Some(v);
        }
        if let Some(v) = approval_status {
            self.approval_status = v;
        }
        if let Some(v) = approver_id {
            self.approver_id = Some(v);
        }
        if let Some(v) = posted {
            self.posted = v;
        }
        if let Some(v) = erp_txn_id {
            self.erp_txn_id = Some(v);
        }
        if let Some(v) = scheduled_payment_id {
            self.scheduled_payment_id = Some(v);
        }
        if let Some(v) = notified_parties {
            self.notified_parties = v;
        }
        if let Some(v) = final_payload {
            self.final_payload = Some(v);
        }
        if let Some(v) = audit_log {
            self.audit_log = v;
        }

        let mut output_selections = BTreeMap::new();
        for (role, selection) in tool_selections {
            output_selections.insert(role.clone(), selection.selected.clone());
            self.tool_selections
                .insert(format!("{}_{}", stage, role), selection.selected);
        }
        self.ability_calls.extend(ability_calls);
        self.errors.extend(errors);

        self.stage_outputs.push(StageOutput {
            stage,
            status: output_status,
            data: output_data,
            tool_selections: output_selections,
            timestamp: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    /// Record a fatal stage error. The run is aborted by the executor.
    pub fn record_failure(&mut self, stage: Stage, message: impl Into<String>) {
        self.errors.push(format!("{} failed: {}", stage, message.into()));
        self.status = WorkflowStatus::Failed;
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// First matched PO, if RETRIEVE found any.
    pub fn primary_po(&self) -> Option<&PurchaseOrder> {
        self.matched_pos.first()
    }
}

// ── Stage Update ─────────────────────────────────────────────────────

/// A stage's partial update, folded into the state by the executor.
///
/// All scalar fields are optional: `None` leaves the state untouched.
/// The accumulator fields (`tool_selections`, `ability_calls`, `errors`)
/// are values the executor appends; a stage cannot replace history.
#[derive(Debug, Default)]
pub struct StageUpdate {
    pub status: Option<WorkflowStatus>,

    pub raw_id: Option<String>,
    pub ingest_ts: Option<DateTime<Utc>>,
    pub validated: Option<bool>,

    pub invoice_text: Option<String>,
    pub parsed_line_items: Option<Vec<LineItem>>,
    pub detected_pos: Option<Vec<String>>,

    pub vendor_profile: Option<VendorProfile>,
    pub flags: Option<RiskFlags>,

    pub matched_pos: Option<Vec<PurchaseOrder>>,
    pub matched_grns: Option<Vec<serde_json::Value>>,
    pub history: Option<Vec<serde_json::Value>>,

    pub match_score: Option<f64>,
    pub match_result: Option<MatchResult>,
    pub match_evidence: Option<MatchEvidence>,
    pub requires_human_review: Option<bool>,

    pub checkpoint_id: Option<CheckpointId>,
    pub review_url: Option<String>,
    pub paused_reason: Option<String>,
    pub next_stage: Option<Stage>,

    pub accounting_entries: Option<Vec<AccountingEntry>>,
    pub reconciliation_report: Option<ReconciliationReport>,

    pub approval_status: Option<ApprovalStatus>,
    pub approver_id: Option<String>,

    pub posted: Option<bool>,
    pub erp_txn_id: Option<String>,
    pub scheduled_payment_id: Option<String>,

    pub notified_parties: Option<Vec<String>>,

    pub final_payload: Option<serde_json::Value>,
    pub audit_log: Option<Vec<AuditLogEntry>>,

    /// Status recorded in this stage's [`StageOutput`].
    pub output_status: StageStatus,
    /// Result data recorded in this stage's [`StageOutput`].
    pub output_data: serde_json::Value,

    pub tool_selections: Vec<(String, ToolSelection)>,
    pub ability_calls: Vec<AbilityCall>,
    pub errors: Vec<String>,
}

impl StageUpdate {
    /// An update whose stage output is COMPLETED with the given data.
    pub fn completed(output_data: serde_json::Value) -> Self {
        Self {
            output_status: StageStatus::Completed,
            output_data,
            ..Self::default()
        }
    }
}
