//! Two-way match scoring between an invoice and a purchase order.
//!
//! No goods-receipt step: the score is a function of the amount
//! discrepancy alone. Line-item count mismatches are recorded as evidence
//! but do not change the score.

use payflow_types::{InvoicePayload, MatchEvidence, MatchResult, PurchaseOrder};
use serde::{Deserialize, Serialize};

/// Run-time thresholds for the two-way match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// Minimum score for a MATCHED result.
    pub match_threshold: f64,
    /// Discrepancy percentage considered within tolerance.
    pub tolerance_pct: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            match_threshold: 0.90,
            tolerance_pct: 5.0,
        }
    }
}

/// Result of one two-way match attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TwoWayMatch {
    pub score: f64,
    pub result: MatchResult,
    pub evidence: MatchEvidence,
}

/// Score an invoice against its purchase order.
///
/// No PO at all scores 0.0 and FAILS, with the full invoice amount
/// recorded as the discrepancy. Otherwise, with
/// `pct = |invoice - po| / po * 100` (100 when the PO amount is zero):
///
/// - within tolerance: `score = 1 - pct / (2 * tolerance_pct)`
/// - outside tolerance: `score = max(0, 1 - pct / 100)`
///
/// The result is MATCHED iff the score reaches `match_threshold`.
pub fn score_two_way(
    invoice: &InvoicePayload,
    po: Option<&PurchaseOrder>,
    policy: &MatchPolicy,
) -> TwoWayMatch {
    let Some(po) = po else {
        tracing::debug!(invoice_id = %invoice.invoice_id, "no PO found, match fails");
        return TwoWayMatch {
            score: 0.0,
            result: MatchResult::Failed,
            evidence: MatchEvidence::no_po(invoice.amount),
        };
    };

    let discrepancy = (invoice.amount - po.amount).abs();
    let discrepancy_pct = if po.amount > 0.0 {
        discrepancy / po.amount * 100.0
    } else {
        100.0
    };

    let score = if discrepancy_pct <= policy.tolerance_pct {
        1.0 - discrepancy_pct / (policy.tolerance_pct * 2.0)
    } else {
        (1.0 - discrepancy_pct / 100.0).max(0.0)
    };

    let result = if score >= policy.match_threshold {
        MatchResult::Matched
    } else {
        MatchResult::Failed
    };

    let mut discrepancy_items = Vec::new();
    if invoice.line_items.len() != po.line_items.len() {
        discrepancy_items.push(format!(
            "Line item count mismatch: invoice has {}, PO has {}",
            invoice.line_items.len(),
            po.line_items.len()
        ));
    }

    tracing::debug!(
        invoice_id = %invoice.invoice_id,
        po_number = %po.po_number,
        score = round3(score),
        ?result,
        "two-way match scored"
    );

    TwoWayMatch {
        score: round3(score),
        result,
        evidence: MatchEvidence {
            invoice_amount: invoice.amount,
            po_amount: Some(po.amount),
            discrepancy: round2(discrepancy),
            discrepancy_pct: round2(discrepancy_pct),
            discrepancy_items,
            po_number: Some(po.po_number.clone()),
        },
    }
}

/// Review priority derived from match confidence: low-confidence holds
/// jump the queue (lower number = reviewed first).
pub fn checkpoint_priority(match_score: f64) -> u8 {
    if match_score < 0.5 {
        3
    } else {
        5
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
