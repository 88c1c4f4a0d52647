//! Validation and risk flags computed during PREPARE.

use payflow_types::{InvoicePayload, RiskFlags, VendorProfile};

/// Amount above which an invoice is flagged as high value.
const HIGH_VALUE_THRESHOLD: f64 = 50_000.0;

/// Compute missing-information and risk flags for an invoice and its
/// enriched vendor profile. The risk score is additive, capped at 1.0.
pub fn compute_flags(invoice: &InvoicePayload, vendor: &VendorProfile) -> RiskFlags {
    let mut flags = RiskFlags::default();

    if invoice.po_reference.is_none() {
        flags.missing_info.push("po_reference".to_string());
    }

    if vendor.tax_id.is_none() {
        flags.missing_info.push("vendor_tax_id".to_string());
        flags.risk_score += 0.2;
    }

    if invoice.amount > HIGH_VALUE_THRESHOLD {
        flags.warnings.push("high_value_transaction".to_string());
        flags.risk_score += 0.3;
    }

    if !is_enriched(vendor) {
        flags.warnings.push("vendor_not_enriched".to_string());
        flags.risk_score += 0.1;
    }

    flags.risk_score = flags.risk_score.min(1.0);
    flags
}

fn is_enriched(vendor: &VendorProfile) -> bool {
    match &vendor.enrichment_meta {
        serde_json::Value::Null => false,
        serde_json::Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}
