//! In-memory reference implementation of the checkpoint store.
//!
//! Both the checkpoint map and the queue projection live behind a single
//! write lock, so every operation that touches both is atomic. Status
//! transitions are guarded: AWAITING_REVIEW → REVIEWED happens exactly
//! once, and REVIEWED → RESUMED requires the decision to exist first.

use crate::traits::{CheckpointStore, StoreConfig};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use payflow_types::{
    Checkpoint, CheckpointId, CheckpointStatus, HumanDecision, ReviewQueueItem, Stage, WorkflowId,
    WorkflowState,
};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    checkpoints: HashMap<String, Checkpoint>,
    queue: HashMap<String, ReviewQueueItem>,
}

/// In-memory checkpoint store adapter.
pub struct MemoryCheckpointStore {
    config: StoreConfig,
    inner: RwLock<Inner>,
}

impl MemoryCheckpointStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn create(
        &self,
        state: &WorkflowState,
        reason_for_hold: &str,
        priority: u8,
    ) -> StoreResult<Checkpoint> {
        let checkpoint = Checkpoint::from_state(
            state,
            reason_for_hold,
            priority,
            self.config.review_window(),
            &self.config.review_url_base,
        )
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut guard = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("checkpoint lock poisoned".to_string()))?;

        let workflow_id = state.workflow_id.as_str();
        if guard.checkpoints.values().any(|c| {
            c.workflow_id == workflow_id && c.status == CheckpointStatus::AwaitingReview
        }) {
            return Err(StoreError::Conflict(format!(
                "workflow {} already has a checkpoint awaiting review",
                workflow_id
            )));
        }

        let key = checkpoint.checkpoint_id.as_str().to_string();
        guard.queue.insert(key.clone(), checkpoint.queue_item());
        guard.checkpoints.insert(key, checkpoint.clone());

        tracing::info!(
            checkpoint_id = %checkpoint.checkpoint_id,
            workflow_id,
            priority,
            "checkpoint created"
        );
        Ok(checkpoint)
    }

    async fn get(&self, checkpoint_id: &CheckpointId) -> StoreResult<Option<Checkpoint>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("checkpoint lock poisoned".to_string()))?;
        Ok(guard.checkpoints.get(checkpoint_id.as_str()).cloned())
    }

    async fn update_with_decision(
        &self,
        checkpoint_id: &CheckpointId,
        decision: HumanDecision,
        reviewer_id: &str,
        notes: Option<&str>,
    ) -> StoreResult<Checkpoint> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("checkpoint lock poisoned".to_string()))?;

        let checkpoint = guard
            .checkpoints
            .get_mut(checkpoint_id.as_str())
            .ok_or_else(|| StoreError::NotFound(checkpoint_id.to_string()))?;

        // Compare-and-set on status: a second decision against an
        // already-reviewed checkpoint must not issue another token.
        if checkpoint.status != CheckpointStatus::AwaitingReview {
            return Err(StoreError::Conflict(format!(
                "checkpoint {} is {:?}, not awaiting review",
                checkpoint_id, checkpoint.status
            )));
        }

        let now = Utc::now();
        checkpoint.status = CheckpointStatus::Reviewed;
        checkpoint.decision = Some(decision);
        checkpoint.reviewer_id = Some(reviewer_id.to_string());
        checkpoint.reviewer_notes = notes.map(str::to_string);
        checkpoint.reviewed_at = Some(now);
        checkpoint.resume_token = Some(generate_resume_token());
        checkpoint.next_stage = Some(if decision == HumanDecision::Accept {
            Stage::Reconcile
        } else {
            Stage::Complete
        });
        checkpoint.updated_at = now;

        let updated = checkpoint.clone();
        if let Some(item) = guard.queue.get_mut(checkpoint_id.as_str()) {
            item.status = CheckpointStatus::Reviewed;
        }

        tracing::info!(
            checkpoint_id = %checkpoint_id,
            decision = %decision,
            reviewer_id,
            "checkpoint reviewed"
        );
        Ok(updated)
    }

    async fn mark_resumed(&self, checkpoint_id: &CheckpointId) -> StoreResult<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("checkpoint lock poisoned".to_string()))?;

        let checkpoint = guard
            .checkpoints
            .get_mut(checkpoint_id.as_str())
            .ok_or_else(|| StoreError::NotFound(checkpoint_id.to_string()))?;

        if checkpoint.status != CheckpointStatus::Reviewed {
            return Err(StoreError::InvariantViolation(format!(
                "checkpoint {} cannot resume from {:?}",
                checkpoint_id, checkpoint.status
            )));
        }

        let now = Utc::now();
        checkpoint.status = CheckpointStatus::Resumed;
        checkpoint.resumed_at = Some(now);
        checkpoint.updated_at = now;

        if let Some(item) = guard.queue.get_mut(checkpoint_id.as_str()) {
            item.status = CheckpointStatus::Resumed;
        }
        Ok(())
    }

    async fn pending_reviews(&self) -> StoreResult<Vec<ReviewQueueItem>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("checkpoint lock poisoned".to_string()))?;
        let mut items: Vec<ReviewQueueItem> = guard
            .queue
            .values()
            .filter(|item| item.status == CheckpointStatus::AwaitingReview)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(items)
    }

    async fn checkpoints_for_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> StoreResult<Vec<Checkpoint>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("checkpoint lock poisoned".to_string()))?;
        let mut checkpoints: Vec<Checkpoint> = guard
            .checkpoints
            .values()
            .filter(|c| c.workflow_id == workflow_id.as_str())
            .cloned()
            .collect();
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(checkpoints)
    }
}

fn generate_resume_token() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("resume_{}", &hex[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use payflow_types::InvoicePayload;

    fn make_state(invoice_id: &str) -> WorkflowState {
        let mut state =
            WorkflowState::new(InvoicePayload::new(invoice_id, "Acme Corp", 5500.0));
        state.current_stage = Stage::Checkpoint;
        state.match_score = 0.854;
        state
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryCheckpointStore::with_defaults();
        let created = store.create(&make_state("INV-1"), "score hold", 5).await.unwrap();

        let fetched = store.get(&created.checkpoint_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, CheckpointStatus::AwaitingReview);
        assert_eq!(fetched.invoice_id, "INV-1");
        assert!(fetched.resume_token.is_none());
        assert!(fetched.expires_at > fetched.created_at);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryCheckpointStore::with_defaults();
        let result = store.get(&CheckpointId::new("chk_missing")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_one_awaiting_checkpoint_per_workflow() {
        let store = MemoryCheckpointStore::with_defaults();
        let state = make_state("INV-1");
        store.create(&state, "first hold", 5).await.unwrap();

        let err = store.create(&state, "second hold", 5).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_decision_issues_token_and_routes() {
        let store = MemoryCheckpointStore::with_defaults();
        let created = store.create(&make_state("INV-1"), "hold", 5).await.unwrap();

        let reviewed = store
            .update_with_decision(
                &created.checkpoint_id,
                HumanDecision::Accept,
                "jane.doe",
                Some("verified with vendor"),
            )
            .await
            .unwrap();

        assert_eq!(reviewed.status, CheckpointStatus::Reviewed);
        assert_eq!(reviewed.next_stage, Some(Stage::Reconcile));
        assert!(reviewed.resume_token.as_deref().unwrap_or("").starts_with("resume_"));
        assert_eq!(reviewed.reviewer_id.as_deref(), Some("jane.doe"));
    }

    #[tokio::test]
    async fn test_reject_routes_to_complete() {
        let store = MemoryCheckpointStore::with_defaults();
        let created = store.create(&make_state("INV-1"), "hold", 5).await.unwrap();

        let reviewed = store
            .update_with_decision(&created.checkpoint_id, HumanDecision::Reject, "jane", None)
            .await
            .unwrap();
        assert_eq!(reviewed.next_stage, Some(Stage::Complete));
    }

    #[tokio::test]
    async fn test_second_decision_is_rejected_without_new_token() {
        let store = MemoryCheckpointStore::with_defaults();
        let created = store.create(&make_state("INV-1"), "hold", 5).await.unwrap();

        let first = store
            .update_with_decision(&created.checkpoint_id, HumanDecision::Accept, "jane", None)
            .await
            .unwrap();
        let err = store
            .update_with_decision(&created.checkpoint_id, HumanDecision::Reject, "john", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // The stored token is still the one issued to the first reviewer.
        let current = store.get(&created.checkpoint_id).await.unwrap().unwrap();
        assert_eq!(current.resume_token, first.resume_token);
        assert_eq!(current.decision, Some(HumanDecision::Accept));
    }

    #[tokio::test]
    async fn test_resume_requires_review_first() {
        let store = MemoryCheckpointStore::with_defaults();
        let created = store.create(&make_state("INV-1"), "hold", 5).await.unwrap();

        let err = store.mark_resumed(&created.checkpoint_id).await.unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));

        store
            .update_with_decision(&created.checkpoint_id, HumanDecision::Accept, "jane", None)
            .await
            .unwrap();
        store.mark_resumed(&created.checkpoint_id).await.unwrap();

        let resumed = store.get(&created.checkpoint_id).await.unwrap().unwrap();
        assert_eq!(resumed.status, CheckpointStatus::Resumed);
        assert!(resumed.resumed_at.is_some());
    }

    #[tokio::test]
    async fn test_pending_reviews_ordering() {
        let store = MemoryCheckpointStore::with_defaults();
        // Interleave priorities; creation order breaks ties.
        let first_low = store.create(&make_state("INV-A"), "hold", 5).await.unwrap();
        let urgent = store.create(&make_state("INV-B"), "hold", 3).await.unwrap();
        let second_low = store.create(&make_state("INV-C"), "hold", 5).await.unwrap();

        let pending = store.pending_reviews().await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|i| i.checkpoint_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                urgent.checkpoint_id.as_str(),
                first_low.checkpoint_id.as_str(),
                second_low.checkpoint_id.as_str(),
            ]
        );
    }

    #[tokio::test]
    async fn test_reviewed_checkpoint_leaves_queue() {
        let store = MemoryCheckpointStore::with_defaults();
        let created = store.create(&make_state("INV-1"), "hold", 5).await.unwrap();
        assert_eq!(store.pending_reviews().await.unwrap().len(), 1);

        store
            .update_with_decision(&created.checkpoint_id, HumanDecision::Escalate, "jane", None)
            .await
            .unwrap();
        assert!(store.pending_reviews().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoints_for_workflow() {
        let store = MemoryCheckpointStore::with_defaults();
        let state = make_state("INV-1");
        let created = store.create(&state, "hold", 5).await.unwrap();

        let listed = store
            .checkpoints_for_workflow(&state.workflow_id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].checkpoint_id, created.checkpoint_id);

        let other = store
            .checkpoints_for_workflow(&WorkflowId::new("wf_other"))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_decision_not_found() {
        let store = MemoryCheckpointStore::with_defaults();
        let err = store
            .update_with_decision(
                &CheckpointId::new("chk_missing"),
                HumanDecision::Accept,
                "jane",
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
