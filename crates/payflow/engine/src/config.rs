//! Engine configuration.

use payflow_decision::{ApprovalPolicy, MatchPolicy};
use serde::{Deserialize, Serialize};

/// Run-time configuration for the stage graph executor.
///
/// Shared read-only across all workflow instances driven by one engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub match_policy: MatchPolicy,
    pub approval_policy: ApprovalPolicy,
    /// Deployment environment fed into tool-selection contexts.
    pub environment: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_policy: MatchPolicy::default(),
            approval_policy: ApprovalPolicy::default(),
            environment: "development".to_string(),
        }
    }
}
