//! Checkpoints: persisted state snapshots taken when execution pauses for
//! a human decision.
//!
//! A checkpoint is created exactly when the executor determines human
//! review is required. It carries a full serialized snapshot of the
//! workflow state, the review context a human needs to decide, and the
//! single-use resume token issued once a decision is recorded.

use crate::error::WorkflowError;
use crate::state::{short_hex, WorkflowState};
use crate::Stage;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ── Checkpoint Identifier ────────────────────────────────────────────

/// Unique identifier for a checkpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId(pub String);

impl CheckpointId {
    pub fn generate() -> Self {
        Self(format!("chk_{}", short_hex(12)))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Status and Decision ──────────────────────────────────────────────

/// Lifecycle of a checkpoint.
///
/// CREATED → AWAITING_REVIEW → REVIEWED → RESUMED, or EXPIRED. The
/// AWAITING_REVIEW → REVIEWED transition happens exactly once, by exactly
/// one decision submission; the store guards it with a compare-and-set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointStatus {
    Created,
    AwaitingReview,
    Reviewed,
    Resumed,
    Expired,
}

/// A human review decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HumanDecision {
    Accept,
    Reject,
    Escalate,
    RequestInfo,
}

impl HumanDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Reject => "REJECT",
            Self::Escalate => "ESCALATE",
            Self::RequestInfo => "REQUEST_INFO",
        }
    }

    /// Parse a decision submitted over the wire.
    pub fn parse(value: &str) -> Result<Self, WorkflowError> {
        match value {
            "ACCEPT" => Ok(Self::Accept),
            "REJECT" => Ok(Self::Reject),
            "ESCALATE" => Ok(Self::Escalate),
            "REQUEST_INFO" => Ok(Self::RequestInfo),
            other => Err(WorkflowError::InvalidDecision(other.to_string())),
        }
    }
}

impl std::fmt::Display for HumanDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HumanDecision {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ── Checkpoint ───────────────────────────────────────────────────────

/// A persisted workflow-state snapshot awaiting (or past) human review.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: CheckpointId,
    pub workflow_id: String,
    pub workflow_name: String,

    /// Full serialized [`WorkflowState`] at suspend time.
    pub state_blob: serde_json::Value,
    /// The stage at which execution suspended.
    pub stage_id: Stage,

    pub status: CheckpointStatus,
    pub reason_for_hold: String,
    /// Lower value = more urgent. Derived from match confidence.
    pub priority: u8,

    // Invoice context for the reviewer.
    pub invoice_id: String,
    pub vendor_name: String,
    pub amount: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discrepancy_details: Option<serde_json::Value>,

    // Human review.
    pub review_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<HumanDecision>,

    // Resume information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<Stage>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Snapshot a workflow state into a new checkpoint awaiting review.
    pub fn from_state(
        state: &WorkflowState,
        reason_for_hold: impl Into<String>,
        priority: u8,
        review_window: Duration,
        review_url_base: &str,
    ) -> Result<Self, serde_json::Error> {
        let checkpoint_id = CheckpointId::generate();
        let review_url = format!("{}/{}", review_url_base.trim_end_matches('/'), checkpoint_id);
        let now = Utc::now();

        let discrepancy_details = state
            .match_evidence
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        Ok(Self {
            checkpoint_id,
            workflow_id: state.workflow_id.to_string(),
            workflow_name: state.workflow_name.clone(),
            state_blob: serde_json::to_value(state)?,
            stage_id: state.current_stage,
            status: CheckpointStatus::AwaitingReview,
            reason_for_hold: reason_for_hold.into(),
            priority,
            invoice_id: state.invoice.invoice_id.clone(),
            vendor_name: state.invoice.vendor_name.clone(),
            amount: state.invoice.amount,
            currency: state.invoice.currency.clone(),
            match_score: Some(state.match_score),
            discrepancy_details,
            review_url,
            reviewed_at: None,
            reviewer_id: None,
            reviewer_notes: None,
            decision: None,
            resume_token: None,
            resumed_at: None,
            next_stage: None,
            created_at: now,
            updated_at: now,
            expires_at: now + review_window,
        })
    }

    /// Whether the review window has elapsed. Treating expiry as terminal
    /// is a policy decision left to the surrounding system.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// The denormalized queue projection for this checkpoint.
    pub fn queue_item(&self) -> ReviewQueueItem {
        ReviewQueueItem {
            checkpoint_id: self.checkpoint_id.clone(),
            workflow_id: self.workflow_id.clone(),
            invoice_id: self.invoice_id.clone(),
            vendor_name: self.vendor_name.clone(),
            amount: self.amount,
            currency: self.currency.clone(),
            created_at: self.created_at,
            reason_for_hold: self.reason_for_hold.clone(),
            review_url: self.review_url.clone(),
            priority: self.priority,
            status: self.status,
        }
    }
}

// ── Review Queue ─────────────────────────────────────────────────────

/// Denormalized projection of an awaiting-review checkpoint for listing.
///
/// Created alongside the checkpoint and updated in lockstep with it;
/// never independently mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub checkpoint_id: CheckpointId,
    pub workflow_id: String,
    pub invoice_id: String,
    pub vendor_name: String,
    pub amount: f64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub reason_for_hold: String,
    pub review_url: String,
    pub priority: u8,
    pub status: CheckpointStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InvoicePayload;

    fn make_state() -> WorkflowState {
        WorkflowState::new(InvoicePayload::new("INV-1", "Acme Corp", 5500.0))
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!(HumanDecision::parse("ACCEPT").unwrap(), HumanDecision::Accept);
        assert_eq!(
            HumanDecision::parse("REQUEST_INFO").unwrap(),
            HumanDecision::RequestInfo
        );
        assert!(matches!(
            HumanDecision::parse("MAYBE"),
            Err(WorkflowError::InvalidDecision(_))
        ));
    }

    #[test]
    fn test_from_state_snapshot() {
        let state = make_state();
        let checkpoint = Checkpoint::from_state(
            &state,
            "Match score below threshold",
            5,
            Duration::days(7),
            "/human-review/review",
        )
        .unwrap();

        assert_eq!(checkpoint.status, CheckpointStatus::AwaitingReview);
        assert_eq!(checkpoint.workflow_id, state.workflow_id.to_string());
        assert_eq!(checkpoint.invoice_id, "INV-1");
        assert!(checkpoint
            .review_url
            .ends_with(checkpoint.checkpoint_id.as_str()));
        assert!(checkpoint.expires_at > checkpoint.created_at);
        assert!(!checkpoint.is_expired());

        // The snapshot must reconstruct the state exactly.
        let restored: WorkflowState =
            serde_json::from_value(checkpoint.state_blob.clone()).unwrap();
        assert_eq!(restored.workflow_id, state.workflow_id);
        assert_eq!(restored.invoice.invoice_id, "INV-1");
    }

    #[test]
    fn test_queue_item_projection() {
        let state = make_state();
        let checkpoint =
            Checkpoint::from_state(&state, "hold", 3, Duration::days(7), "/human-review/review")
                .unwrap();
        let item = checkpoint.queue_item();

        assert_eq!(item.checkpoint_id, checkpoint.checkpoint_id);
        assert_eq!(item.priority, 3);
        assert_eq!(item.status, CheckpointStatus::AwaitingReview);
    }

    #[test]
    fn test_checkpoint_id_generate() {
        let id = CheckpointId::generate();
        assert!(id.as_str().starts_with("chk_"));
        assert_eq!(id.as_str().len(), "chk_".len() + 12);
    }
}
