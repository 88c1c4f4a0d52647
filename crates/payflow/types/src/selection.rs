//! Audit records for tool selections and ability invocations.

use crate::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which group of providers handles an ability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderGroup {
    /// Local, deterministic computation (no external system involved).
    Deterministic,
    /// Delegated to an external-system connector.
    External,
}

impl std::fmt::Display for ProviderGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deterministic => f.write_str("deterministic"),
            Self::External => f.write_str("external"),
        }
    }
}

/// Result of one tool selection.
///
/// Transient: not persisted beyond the audit trail embedded in the
/// workflow state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSelection {
    pub capability: String,
    pub selected: String,
    pub method: String,
    pub reason: String,
    pub alternatives: Vec<String>,
}

/// One entry in the ability-call audit trail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbilityCall {
    pub stage: Stage,
    pub ability: String,
    pub provider_group: ProviderGroup,
    pub timestamp: DateTime<Utc>,
}

impl AbilityCall {
    pub fn new(stage: Stage, ability: impl Into<String>, provider_group: ProviderGroup) -> Self {
        Self {
            stage,
            ability: ability.into(),
            provider_group,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_group_display() {
        assert_eq!(format!("{}", ProviderGroup::Deterministic), "deterministic");
        assert_eq!(format!("{}", ProviderGroup::External), "external");
    }

    #[test]
    fn test_ability_call() {
        let call = AbilityCall::new(Stage::Match, "compute_match_score", ProviderGroup::Deterministic);
        assert_eq!(call.stage, Stage::Match);
        assert_eq!(call.ability, "compute_match_score");
    }
}
