//! Two-way match outcomes and their evidence.

use serde::{Deserialize, Serialize};

/// Outcome of the invoice-to-PO two-way match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchResult {
    #[default]
    Pending,
    Matched,
    Failed,
}

/// Evidence produced by one match attempt.
///
/// `po_amount` and `po_number` are absent when no purchase order was found;
/// in that case the full invoice amount is recorded as the discrepancy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchEvidence {
    pub invoice_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_amount: Option<f64>,
    pub discrepancy: f64,
    pub discrepancy_pct: f64,
    #[serde(default)]
    pub discrepancy_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_number: Option<String>,
}

impl MatchEvidence {
    /// Evidence for the no-PO case: everything is discrepant.
    pub fn no_po(invoice_amount: f64) -> Self {
        Self {
            invoice_amount,
            po_amount: None,
            discrepancy: invoice_amount,
            discrepancy_pct: 100.0,
            discrepancy_items: vec!["No PO found".to_string()],
            po_number: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_po_evidence() {
        let evidence = MatchEvidence::no_po(5500.0);
        assert_eq!(evidence.discrepancy, 5500.0);
        assert!(evidence.po_amount.is_none());
        assert!(evidence.po_number.is_none());
    }

    #[test]
    fn test_match_result_serde() {
        assert_eq!(
            serde_json::to_string(&MatchResult::Matched).unwrap(),
            "\"MATCHED\""
        );
        assert_eq!(MatchResult::default(), MatchResult::Pending);
    }
}
