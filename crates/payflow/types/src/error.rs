//! The shared error taxonomy for workflow execution.

use crate::Stage;
use thiserror::Error;

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors surfaced by the workflow core.
///
/// A stage failure aborts the whole run: the error is appended to the
/// state's error list and returned to the caller. Resume-time errors
/// (`CheckpointNotFound`, `InvalidDecision`) are rejected before any state
/// mutation occurs.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid invoice payload: {0}")]
    Validation(String),

    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("no providers configured for capability: {0}")]
    NoEligibleProvider(String),

    #[error("unknown ability: {0}")]
    UnknownAbility(String),

    #[error("ability '{ability}' failed: {message}")]
    AbilityExecution { ability: String, message: String },

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("invalid decision '{0}': expected one of ACCEPT, REJECT, ESCALATE, REQUEST_INFO")]
    InvalidDecision(String),

    #[error("stage {stage} failed: {message}")]
    StageExecution { stage: Stage, message: String },

    #[error("checkpoint store: {0}")]
    Store(String),

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Wrap any stage-internal failure, preserving the stage name.
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self::StageExecution {
            stage,
            message: message.into(),
        }
    }
}
