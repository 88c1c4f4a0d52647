//! Invoice payload schema validation for INTAKE.

use chrono::{DateTime, NaiveDate};
use payflow_types::InvoicePayload;

/// Validate an invoice payload. Returns the list of violations; an empty
/// list means the payload is acceptable.
pub fn validate_invoice(invoice: &InvoicePayload) -> Vec<String> {
    let mut violations = Vec::new();

    let mut missing = Vec::new();
    if invoice.invoice_id.trim().is_empty() {
        missing.push("invoice_id");
    }
    if invoice.vendor_name.trim().is_empty() {
        missing.push("vendor_name");
    }
    if invoice.currency.trim().is_empty() {
        missing.push("currency");
    }
    if invoice.invoice_date.trim().is_empty() {
        missing.push("invoice_date");
    }
    if !missing.is_empty() {
        violations.push(format!("Missing required fields: {}", missing.join(", ")));
    }

    if invoice.amount <= 0.0 {
        violations.push("Amount must be positive".to_string());
    }

    if !invoice.invoice_date.trim().is_empty() && !is_iso_date(&invoice.invoice_date) {
        violations.push("Invalid invoice_date format".to_string());
    }

    violations
}

fn is_iso_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
}
