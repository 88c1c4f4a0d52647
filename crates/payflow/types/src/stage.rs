//! The stage vocabulary: twelve named stages and the per-stage output record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One named unit of work in the workflow graph.
///
/// The edges between stages belong to the executor; this enum is only the
/// vocabulary. COMPLETE is the single terminal, absorbing stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Intake,
    Understand,
    Prepare,
    Retrieve,
    Match,
    Checkpoint,
    HitlDecision,
    Reconcile,
    Approve,
    Posting,
    Notify,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "INTAKE",
            Self::Understand => "UNDERSTAND",
            Self::Prepare => "PREPARE",
            Self::Retrieve => "RETRIEVE",
            Self::Match => "MATCH",
            Self::Checkpoint => "CHECKPOINT",
            Self::HitlDecision => "HITL_DECISION",
            Self::Reconcile => "RECONCILE",
            Self::Approve => "APPROVE",
            Self::Posting => "POSTING",
            Self::Notify => "NOTIFY",
            Self::Complete => "COMPLETE",
        }
    }

    /// Check if this is the terminal stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status of a single stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// Immutable record of one stage execution.
///
/// Created exactly once per executed stage, appended to the state's
/// `stage_outputs` sequence in execution order, and never mutated afterward.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage: Stage,
    pub status: StageStatus,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tool_selections: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Intake.as_str(), "INTAKE");
        assert_eq!(Stage::HitlDecision.as_str(), "HITL_DECISION");
        assert_eq!(format!("{}", Stage::Match), "MATCH");
    }

    #[test]
    fn test_stage_serde_round_trip() {
        let serialized = serde_json::to_string(&Stage::HitlDecision).unwrap();
        assert_eq!(serialized, "\"HITL_DECISION\"");
        let stage: Stage = serde_json::from_str(&serialized).unwrap();
        assert_eq!(stage, Stage::HitlDecision);
    }

    #[test]
    fn test_only_complete_is_terminal() {
        assert!(Stage::Complete.is_terminal());
        assert!(!Stage::Notify.is_terminal());
        assert!(!Stage::Checkpoint.is_terminal());
    }
}
