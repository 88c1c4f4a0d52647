//! Amount-based approval policy.

use payflow_types::ApprovalStatus;
use serde::{Deserialize, Serialize};

/// Run-time approval configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Invoices at or below this amount are approved automatically.
    pub auto_approve_threshold: f64,
    /// Role that must approve anything above the threshold.
    pub approver_role: String,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 10_000.0,
            approver_role: "finance_manager".to_string(),
        }
    }
}

/// Outcome of applying the approval policy to an invoice amount.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub status: ApprovalStatus,
    pub approver_id: String,
    pub threshold: f64,
}

/// Apply the amount-based approval policy.
pub fn evaluate_approval(amount: f64, policy: &ApprovalPolicy) -> ApprovalOutcome {
    if amount <= policy.auto_approve_threshold {
        ApprovalOutcome {
            status: ApprovalStatus::AutoApproved,
            approver_id: "system".to_string(),
            threshold: policy.auto_approve_threshold,
        }
    } else {
        ApprovalOutcome {
            status: ApprovalStatus::RequiresApproval,
            approver_id: policy.approver_role.clone(),
            threshold: policy.auto_approve_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_approval_at_or_below_threshold() {
        let policy = ApprovalPolicy::default();
        let outcome = evaluate_approval(5500.0, &policy);
        assert_eq!(outcome.status, ApprovalStatus::AutoApproved);
        assert_eq!(outcome.approver_id, "system");

        let boundary = evaluate_approval(10_000.0, &policy);
        assert_eq!(boundary.status, ApprovalStatus::AutoApproved);
    }

    #[test]
    fn test_requires_approval_above_threshold() {
        let outcome = evaluate_approval(10_000.01, &ApprovalPolicy::default());
        assert_eq!(outcome.status, ApprovalStatus::RequiresApproval);
        assert_eq!(outcome.approver_id, "finance_manager");
    }

    #[test]
    fn test_configured_threshold() {
        let policy = ApprovalPolicy {
            auto_approve_threshold: 100.0,
            approver_role: "controller".to_string(),
        };
        let outcome = evaluate_approval(500.0, &policy);
        assert_eq!(outcome.status, ApprovalStatus::RequiresApproval);
        assert_eq!(outcome.approver_id, "controller");
    }
}
