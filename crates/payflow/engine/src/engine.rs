//! The workflow engine: graph routing, the run loop, and the
//! checkpoint/resume protocol.

use crate::config::EngineConfig;
use payflow_store::CheckpointStore;
use payflow_tools::{AbilityInvoker, ToolSelector};
use payflow_types::{
    Checkpoint, CheckpointId, HumanDecision, InvoicePayload, MatchResult, ReviewQueueItem, Stage,
    WorkflowError, WorkflowId, WorkflowResult, WorkflowState, WorkflowStatus,
};
use std::sync::Arc;

/// Result of `execute`: either a finished run or a suspension awaiting
/// human review.
#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub current_stage: Stage,
    pub requires_human_review: bool,
    pub checkpoint_id: Option<CheckpointId>,
    pub review_url: Option<String>,
    pub final_payload: Option<serde_json::Value>,
    /// The full state at the point control returned to the caller.
    pub state: WorkflowState,
}

/// Result of `resume`: the recorded decision's token and where the run
/// went from the suspension point.
#[derive(Clone, Debug)]
pub struct ResumeOutcome {
    pub checkpoint_id: CheckpointId,
    pub resume_token: String,
    pub next_stage: Stage,
    pub status: WorkflowStatus,
    pub state: WorkflowState,
}

enum RunEnd {
    Completed(Box<WorkflowState>),
    Suspended(Box<WorkflowState>),
}

/// The stage graph executor.
///
/// All collaborators are injected at construction and shared read-only
/// across instances; distinct workflow instances are fully independent.
#[derive(Clone)]
pub struct WorkflowEngine {
    pub(crate) selector: ToolSelector,
    pub(crate) invoker: AbilityInvoker,
    pub(crate) store: Arc<dyn CheckpointStore>,
    pub(crate) config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(
        selector: ToolSelector,
        invoker: AbilityInvoker,
        store: Arc<dyn CheckpointStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            selector,
            invoker,
            store,
            config,
        }
    }

    // ── Workflow Operations ──────────────────────────────────────────

    /// Start a new workflow instance and drive it until COMPLETE or a
    /// suspension point.
    pub async fn execute(&self, invoice: InvoicePayload) -> WorkflowResult<ExecutionOutcome> {
        let state = WorkflowState::new(invoice);
        let workflow_id = state.workflow_id.clone();
        tracing::info!(workflow_id = %workflow_id, "workflow execution started");

        match self.run(state).await? {
            RunEnd::Completed(state) => {
                tracing::info!(workflow_id = %workflow_id, status = ?state.status, "workflow completed");
                Ok(ExecutionOutcome {
                    workflow_id,
                    status: state.status,
                    current_stage: state.current_stage,
                    requires_human_review: false,
                    checkpoint_id: None,
                    review_url: None,
                    final_payload: state.final_payload.clone(),
                    state: *state,
                })
            }
            RunEnd::Suspended(state) => {
                tracing::info!(
                    workflow_id = %workflow_id,
                    checkpoint_id = ?state.checkpoint_id,
                    "workflow suspended for human review"
                );
                Ok(ExecutionOutcome {
                    workflow_id,
                    status: state.status,
                    current_stage: state.current_stage,
                    requires_human_review: true,
                    checkpoint_id: state.checkpoint_id.clone(),
                    review_url: state.review_url.clone(),
                    final_payload: None,
                    state: *state,
                })
            }
        }
    }

    /// Apply a human decision to a checkpoint and re-enter the graph at
    /// HITL_DECISION.
    ///
    /// The decision string is validated and the checkpoint's
    /// compare-and-set transition happens before any state is
    /// reconstructed; a missing checkpoint or invalid decision leaves
    /// everything untouched.
    pub async fn resume(
        &self,
        checkpoint_id: &CheckpointId,
        decision: &str,
        reviewer_id: &str,
        notes: Option<&str>,
    ) -> WorkflowResult<ResumeOutcome> {
        let decision = HumanDecision::parse(decision)?;
        tracing::info!(checkpoint_id = %checkpoint_id, decision = %decision, "workflow resume requested");

        let checkpoint = self
            .store
            .update_with_decision(checkpoint_id, decision, reviewer_id, notes)
            .await?;

        let mut state: WorkflowState = serde_json::from_value(checkpoint.state_blob.clone())?;
        state.checkpoint_id = Some(checkpoint.checkpoint_id.clone());
        state.review_url = Some(checkpoint.review_url.clone());
        state.human_decision = Some(decision);
        state.reviewer_id = Some(reviewer_id.to_string());
        state.reviewer_notes = notes.map(str::to_string);
        state.resume_token = checkpoint.resume_token.clone();
        state.current_stage = Stage::HitlDecision;

        match self.run(state).await? {
            RunEnd::Completed(state) => Ok(ResumeOutcome {
                checkpoint_id: checkpoint.checkpoint_id.clone(),
                resume_token: checkpoint.resume_token.clone().unwrap_or_default(),
                next_stage: checkpoint.next_stage.unwrap_or(Stage::Complete),
                status: state.status,
                state: *state,
            }),
            RunEnd::Suspended(_) => Err(WorkflowError::stage(
                Stage::HitlDecision,
                "resumed run suspended again without passing MATCH",
            )),
        }
    }

    /// AWAITING_REVIEW queue items, oldest-urgent first.
    pub async fn pending_reviews(&self) -> WorkflowResult<Vec<ReviewQueueItem>> {
        Ok(self.store.pending_reviews().await?)
    }

    /// Full checkpoint detail, or `CheckpointNotFound`.
    pub async fn get_checkpoint(&self, checkpoint_id: &CheckpointId) -> WorkflowResult<Checkpoint> {
        self.store
            .get(checkpoint_id)
            .await?
            .ok_or_else(|| WorkflowError::CheckpointNotFound(checkpoint_id.to_string()))
    }

    // ── Run Loop ─────────────────────────────────────────────────────

    /// Drive the graph from the state's current stage until COMPLETE or
    /// the CHECKPOINT suspension point. Stages run strictly in sequence;
    /// a stage error aborts the whole run.
    async fn run(&self, mut state: WorkflowState) -> WorkflowResult<RunEnd> {
        loop {
            let stage = state.current_stage;
            tracing::info!(workflow_id = %state.workflow_id, stage = %stage, "stage started");

            let update = match self.run_stage(stage, &state).await {
                Ok(update) => update,
                Err(e) => {
                    tracing::error!(workflow_id = %state.workflow_id, stage = %stage, error = %e, "stage failed");
                    state.record_failure(stage, e.to_string());
                    return Err(e);
                }
            };
            state.apply(stage, update);
            tracing::info!(workflow_id = %state.workflow_id, stage = %stage, "stage completed");

            if stage == Stage::Checkpoint {
                // Execution suspends here: the checkpoint is persisted
                // and control returns to the caller. HITL_DECISION only
                // runs when a decision has been attached via `resume`.
                state.current_stage = Stage::HitlDecision;
                return Ok(RunEnd::Suspended(Box::new(state)));
            }

            match Self::next_stage(stage, &state) {
                Some(next) => state.current_stage = next,
                None => return Ok(RunEnd::Completed(Box::new(state))),
            }
        }
    }

    /// The edge table: linear flow with conditional routing after MATCH
    /// and HITL_DECISION. `None` means the graph is done.
    fn next_stage(stage: Stage, state: &WorkflowState) -> Option<Stage> {
        match stage {
            Stage::Intake => Some(Stage::Understand),
            Stage::Understand => Some(Stage::Prepare),
            Stage::Prepare => Some(Stage::Retrieve),
            Stage::Retrieve => Some(Stage::Match),
            Stage::Match => Some(if state.match_result == MatchResult::Matched {
                Stage::Reconcile
            } else {
                Stage::Checkpoint
            }),
            Stage::Checkpoint => Some(Stage::HitlDecision),
            Stage::HitlDecision => Some(match state.human_decision {
                Some(HumanDecision::Accept) => Stage::Reconcile,
                _ => Stage::Complete,
            }),
            Stage::Reconcile => Some(Stage::Approve),
            Stage::Approve => Some(Stage::Posting),
            Stage::Posting => Some(Stage::Notify),
            Stage::Notify => Some(Stage::Complete),
            Stage::Complete => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payflow_store::MemoryCheckpointStore;
    use payflow_tools::{AbilityInvoker, SimulatedExternalSystem, ToolSelector};
    use payflow_types::{CheckpointStatus, LineItem, PurchaseOrder};

    fn purchase_order(amount: f64) -> PurchaseOrder {
        PurchaseOrder {
            po_number: "PO-2024-456".to_string(),
            vendor: "ACME CORP".to_string(),
            amount,
            currency: "USD".to_string(),
            status: "APPROVED".to_string(),
            line_items: vec![
                LineItem::new("Product A", 10.0, 100.0),
                LineItem::new("Product B", 5.0, 200.0),
                LineItem::new("Consulting Services", 1.0, 3000.0),
            ],
        }
    }

    fn invoice() -> InvoicePayload {
        InvoicePayload::new("INV-2024-001", "Acme Corporation", 5500.0)
            .with_dates("2024-12-15", "2025-01-15")
            .with_tax_id("12-3456789")
            .with_po_reference("PO-2024-456")
            .with_line_item(LineItem::new("Product A", 10.0, 100.0))
            .with_line_item(LineItem::new("Product B", 5.0, 200.0))
            .with_line_item(LineItem::new("Consulting Services", 1.0, 3000.0))
    }

    fn make_engine(external: SimulatedExternalSystem) -> WorkflowEngine {
        WorkflowEngine::new(
            ToolSelector::with_defaults(),
            AbilityInvoker::new(Arc::new(external)),
            Arc::new(MemoryCheckpointStore::with_defaults()),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_matched_invoice_runs_to_completion() {
        // PO amount equals invoice amount: MATCH routes straight to
        // RECONCILE, no checkpoint is created.
        let engine = make_engine(SimulatedExternalSystem::empty().with_po(purchase_order(5500.0)));
        let outcome = engine.execute(invoice()).await.unwrap();

        assert_eq!(outcome.status, WorkflowStatus::Completed);
        assert_eq!(outcome.current_stage, Stage::Complete);
        assert!(!outcome.requires_human_review);
        assert!(outcome.checkpoint_id.is_none());
        assert!(outcome.final_payload.is_some());
        assert!(outcome.state.posted);
        assert!(engine.pending_reviews().await.unwrap().is_empty());

        let stages: Vec<Stage> = outcome.state.stage_outputs.iter().map(|o| o.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Intake,
                Stage::Understand,
                Stage::Prepare,
                Stage::Retrieve,
                Stage::Match,
                Stage::Reconcile,
                Stage::Approve,
                Stage::Posting,
                Stage::Notify,
                Stage::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_discrepant_invoice_suspends_with_priority_five() {
        // 5500 vs 4800 scores ~0.854: failed match but above 0.5, so the
        // checkpoint gets the routine priority.
        let engine = make_engine(SimulatedExternalSystem::empty().with_po(purchase_order(4800.0)));
        let outcome = engine.execute(invoice()).await.unwrap();

        assert_eq!(outcome.status, WorkflowStatus::AwaitingHuman);
        assert_eq!(outcome.current_stage, Stage::HitlDecision);
        assert!(outcome.requires_human_review);
        assert!(outcome.final_payload.is_none());
        assert_eq!(outcome.state.match_score, 0.854);

        let checkpoint_id = outcome.checkpoint_id.expect("checkpoint expected");
        let checkpoint = engine.get_checkpoint(&checkpoint_id).await.unwrap();
        assert_eq!(checkpoint.priority, 5);
        assert_eq!(checkpoint.status, CheckpointStatus::AwaitingReview);
        assert!(checkpoint.reason_for_hold.contains("below threshold"));

        let pending = engine.pending_reviews().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].checkpoint_id, checkpoint_id);
    }

    #[tokio::test]
    async fn test_no_po_suspends_with_priority_three() {
        let engine = make_engine(SimulatedExternalSystem::empty());
        let outcome = engine.execute(invoice()).await.unwrap();

        assert!(outcome.requires_human_review);
        assert_eq!(outcome.state.match_score, 0.0);

        let checkpoint = engine
            .get_checkpoint(&outcome.checkpoint_id.unwrap())
            .await
            .unwrap();
        assert_eq!(checkpoint.priority, 3);
    }

    #[tokio::test]
    async fn test_resume_accept_runs_through_reconcile() {
        let engine = make_engine(SimulatedExternalSystem::empty().with_po(purchase_order(4800.0)));
        let suspended = engine.execute(invoice()).await.unwrap();
        let checkpoint_id = suspended.checkpoint_id.unwrap();

        let resumed = engine
            .resume(&checkpoint_id, "ACCEPT", "jane.doe@company.com", Some("verified with vendor"))
            .await
            .unwrap();

        assert_eq!(resumed.next_stage, Stage::Reconcile);
        assert_eq!(resumed.status, WorkflowStatus::Completed);
        assert!(resumed.resume_token.starts_with("resume_"));
        assert!(resumed.state.posted);
        assert_eq!(
            resumed.state.reviewer_id.as_deref(),
            Some("jane.doe@company.com")
        );

        // The resumed history picks up from the snapshot and runs the
        // back half of the graph.
        let stages: Vec<Stage> = resumed.state.stage_outputs.iter().map(|o| o.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Intake,
                Stage::Understand,
                Stage::Prepare,
                Stage::Retrieve,
                Stage::Match,
                Stage::HitlDecision,
                Stage::Reconcile,
                Stage::Approve,
                Stage::Posting,
                Stage::Notify,
                Stage::Complete,
            ]
        );

        let checkpoint = engine.get_checkpoint(&checkpoint_id).await.unwrap();
        assert_eq!(checkpoint.status, CheckpointStatus::Resumed);
        assert!(engine.pending_reviews().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_reject_is_manual_handoff() {
        let engine = make_engine(SimulatedExternalSystem::empty().with_po(purchase_order(4800.0)));
        let suspended = engine.execute(invoice()).await.unwrap();
        let checkpoint_id = suspended.checkpoint_id.unwrap();

        let resumed = engine
            .resume(&checkpoint_id, "REJECT", "jane.doe@company.com", None)
            .await
            .unwrap();

        assert_eq!(resumed.next_stage, Stage::Complete);
        assert_eq!(resumed.status, WorkflowStatus::ManualHandoff);
        // Never routed through reconciliation.
        assert!(resumed.state.accounting_entries.is_empty());
        assert!(!resumed.state.posted);

        let stages: Vec<Stage> = resumed.state.stage_outputs.iter().map(|o| o.stage).collect();
        assert_eq!(stages[5..], [Stage::HitlDecision, Stage::Complete]);
    }

    #[tokio::test]
    async fn test_resume_escalate_is_manual_handoff() {
        let engine = make_engine(SimulatedExternalSystem::empty());
        let suspended = engine.execute(invoice()).await.unwrap();

        let resumed = engine
            .resume(&suspended.checkpoint_id.unwrap(), "ESCALATE", "jane", None)
            .await
            .unwrap();
        assert_eq!(resumed.status, WorkflowStatus::ManualHandoff);
        assert_eq!(resumed.next_stage, Stage::Complete);
    }

    #[tokio::test]
    async fn test_resume_invalid_decision_leaves_checkpoint_untouched() {
        let engine = make_engine(SimulatedExternalSystem::empty().with_po(purchase_order(4800.0)));
        let suspended = engine.execute(invoice()).await.unwrap();
        let checkpoint_id = suspended.checkpoint_id.unwrap();

        let err = engine
            .resume(&checkpoint_id, "MAYBE", "jane", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidDecision(_)));

        let checkpoint = engine.get_checkpoint(&checkpoint_id).await.unwrap();
        assert_eq!(checkpoint.status, CheckpointStatus::AwaitingReview);
        assert!(checkpoint.resume_token.is_none());
    }

    #[tokio::test]
    async fn test_resume_unknown_checkpoint() {
        let engine = make_engine(SimulatedExternalSystem::new());
        let err = engine
            .resume(&CheckpointId::new("chk_missing"), "ACCEPT", "jane", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::CheckpointNotFound(_)));
    }

    #[tokio::test]
    async fn test_second_resume_is_rejected() {
        let engine = make_engine(SimulatedExternalSystem::empty().with_po(purchase_order(4800.0)));
        let suspended = engine.execute(invoice()).await.unwrap();
        let checkpoint_id = suspended.checkpoint_id.unwrap();

        engine
            .resume(&checkpoint_id, "ACCEPT", "jane", None)
            .await
            .unwrap();
        let err = engine
            .resume(&checkpoint_id, "REJECT", "john", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Store(_)));
    }

    #[tokio::test]
    async fn test_invalid_payload_fails_validation() {
        let engine = make_engine(SimulatedExternalSystem::new());
        let bad = InvoicePayload::new("", "Acme Corporation", 5500.0);

        let err = engine.execute(bad).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert!(err.to_string().contains("invoice_id"));
    }

    #[tokio::test]
    async fn test_suspended_state_round_trips_through_snapshot() {
        let engine = make_engine(SimulatedExternalSystem::empty().with_po(purchase_order(4800.0)));
        let suspended = engine.execute(invoice()).await.unwrap();

        let checkpoint = engine
            .get_checkpoint(&suspended.checkpoint_id.unwrap())
            .await
            .unwrap();
        let restored: WorkflowState =
            serde_json::from_value(checkpoint.state_blob.clone()).unwrap();

        assert_eq!(restored.workflow_id, suspended.workflow_id);
        assert_eq!(restored.match_score, suspended.state.match_score);
        // The snapshot was taken at suspension: INTAKE through MATCH.
        assert_eq!(restored.stage_outputs.len(), 5);
    }

    #[tokio::test]
    async fn test_distinct_instances_are_independent() {
        let engine = make_engine(SimulatedExternalSystem::empty().with_po(purchase_order(5500.0)));

        let a = engine.execute(invoice()).await.unwrap();
        let b = engine.execute(invoice()).await.unwrap();

        assert_ne!(a.workflow_id, b.workflow_id);
        assert_eq!(a.status, WorkflowStatus::Completed);
        assert_eq!(b.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_audit_trails_recorded() {
        let engine = make_engine(SimulatedExternalSystem::empty().with_po(purchase_order(5500.0)));
        let outcome = engine.execute(invoice()).await.unwrap();

        let state = &outcome.state;
        assert_eq!(
            state.tool_selections.get("INTAKE_storage").map(String::as_str),
            Some("sqlite")
        );
        assert_eq!(
            state.tool_selections.get("UNDERSTAND_ocr").map(String::as_str),
            Some("tesseract")
        );
        assert!(state
            .ability_calls
            .iter()
            .any(|c| c.ability == "compute_match_score" && c.stage == Stage::Match));
        assert!(state
            .ability_calls
            .iter()
            .any(|c| c.ability == "post_to_erp" && c.stage == Stage::Posting));
    }
}
