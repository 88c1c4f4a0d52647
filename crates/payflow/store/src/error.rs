use payflow_types::WorkflowError;
use thiserror::Error;

/// Result type for checkpoint-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("checkpoint not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => WorkflowError::CheckpointNotFound(id),
            other => WorkflowError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_checkpoint_not_found() {
        let err: WorkflowError = StoreError::NotFound("chk_1".to_string()).into();
        assert!(matches!(err, WorkflowError::CheckpointNotFound(id) if id == "chk_1"));
    }

    #[test]
    fn test_conflict_maps_to_store_error() {
        let err: WorkflowError = StoreError::Conflict("already reviewed".to_string()).into();
        assert!(matches!(err, WorkflowError::Store(_)));
    }
}
