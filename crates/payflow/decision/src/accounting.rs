//! Accounting journal entry construction for RECONCILE.

use chrono::Utc;
use payflow_types::{AccountingEntry, EntryKind, InvoicePayload, ReconciliationReport, VendorProfile};

/// Build the balanced debit/credit pair for an approved invoice, plus the
/// reconciliation report summarizing it.
pub fn build_accounting_entries(
    invoice: &InvoicePayload,
    vendor: &VendorProfile,
) -> (Vec<AccountingEntry>, ReconciliationReport) {
    let entries = vec![
        AccountingEntry {
            kind: EntryKind::Debit,
            account: "Accounts Payable".to_string(),
            account_code: "2000".to_string(),
            amount: invoice.amount,
            currency: invoice.currency.clone(),
            description: format!(
                "Invoice {} - {}",
                invoice.invoice_id, vendor.normalized_name
            ),
        },
        AccountingEntry {
            kind: EntryKind::Credit,
            account: "Cash".to_string(),
            account_code: "1000".to_string(),
            amount: invoice.amount,
            currency: invoice.currency.clone(),
            description: format!("Payment for Invoice {}", invoice.invoice_id),
        },
    ];

    let report = ReconciliationReport {
        invoice_id: invoice.invoice_id.clone(),
        vendor: vendor.normalized_name.clone(),
        total_amount: invoice.amount,
        currency: invoice.currency.clone(),
        entry_count: entries.len(),
        balanced: true,
        created_at: Utc::now(),
    };

    (entries, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_balanced() {
        let invoice = InvoicePayload::new("INV-1", "Acme Corporation", 5500.0);
        let vendor = VendorProfile {
            normalized_name: "ACME CORP".to_string(),
            tax_id: None,
            risk_score: 0.1,
            credit_score: None,
            enrichment_meta: serde_json::Value::Null,
        };

        let (entries, report) = build_accounting_entries(&invoice, &vendor);

        assert_eq!(entries.len(), 2);
        let debit: f64 = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Debit)
            .map(|e| e.amount)
            .sum();
        let credit: f64 = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Credit)
            .map(|e| e.amount)
            .sum();
        assert_eq!(debit, credit);

        assert!(report.balanced);
        assert_eq!(report.entry_count, 2);
        assert!(entries[0].description.contains("ACME CORP"));
    }
}
