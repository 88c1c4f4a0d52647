use crate::StoreResult;
use async_trait::async_trait;
use chrono::Duration;
use payflow_types::{
    Checkpoint, CheckpointId, HumanDecision, ReviewQueueItem, WorkflowId, WorkflowState,
};
use serde::{Deserialize, Serialize};

/// Store-level configuration: the review window and the URL base for
/// reviewer links.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Days a checkpoint stays reviewable before `expires_at`.
    pub review_window_days: i64,
    pub review_url_base: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            review_window_days: 7,
            review_url_base: "/human-review/review".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn review_window(&self) -> Duration {
        Duration::days(self.review_window_days)
    }
}

/// Storage interface for HITL checkpoints and their review-queue
/// projection.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Snapshot the workflow state into a new AWAITING_REVIEW checkpoint
    /// and its queue projection, atomically. Fails with `Conflict` if the
    /// workflow already has a checkpoint awaiting review.
    async fn create(
        &self,
        state: &WorkflowState,
        reason_for_hold: &str,
        priority: u8,
    ) -> StoreResult<Checkpoint>;

    /// Fetch one checkpoint by id.
    async fn get(&self, checkpoint_id: &CheckpointId) -> StoreResult<Option<Checkpoint>>;

    /// Record the human decision: AWAITING_REVIEW → REVIEWED exactly once
    /// (status-based compare-and-set), issuing a fresh single-use resume
    /// token and computing the next stage. The queue projection is
    /// updated in the same transaction. A second call on an
    /// already-REVIEWED checkpoint fails with `Conflict` and never issues
    /// a second token.
    async fn update_with_decision(
        &self,
        checkpoint_id: &CheckpointId,
        decision: HumanDecision,
        reviewer_id: &str,
        notes: Option<&str>,
    ) -> StoreResult<Checkpoint>;

    /// REVIEWED → RESUMED, once the executor has re-entered the graph.
    /// Resuming without a prior REVIEWED transition fails.
    async fn mark_resumed(&self, checkpoint_id: &CheckpointId) -> StoreResult<()>;

    /// AWAITING_REVIEW items ordered by ascending priority, then
    /// ascending creation time (oldest-urgent first).
    async fn pending_reviews(&self) -> StoreResult<Vec<ReviewQueueItem>>;

    /// All checkpoints for a workflow, newest first.
    async fn checkpoints_for_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> StoreResult<Vec<Checkpoint>>;
}
