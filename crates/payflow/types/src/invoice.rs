//! Invoice input payloads and the vendor/PO shapes derived from them.

use serde::{Deserialize, Serialize};

/// One line of an invoice or purchase order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total: f64,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: f64, unit_price: f64) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            total: quantity * unit_price,
        }
    }
}

/// Raw invoice input accepted at INTAKE.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvoicePayload {
    pub invoice_id: String,
    pub vendor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_tax_id: Option<String>,
    pub invoice_date: String,
    pub due_date: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_reference: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl InvoicePayload {
    pub fn new(
        invoice_id: impl Into<String>,
        vendor_name: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            vendor_name: vendor_name.into(),
            vendor_tax_id: None,
            invoice_date: String::new(),
            due_date: String::new(),
            amount,
            currency: default_currency(),
            line_items: Vec::new(),
            attachments: Vec::new(),
            po_reference: None,
        }
    }

    pub fn with_dates(
        mut self,
        invoice_date: impl Into<String>,
        due_date: impl Into<String>,
    ) -> Self {
        self.invoice_date = invoice_date.into();
        self.due_date = due_date.into();
        self
    }

    pub fn with_tax_id(mut self, tax_id: impl Into<String>) -> Self {
        self.vendor_tax_id = Some(tax_id.into());
        self
    }

    pub fn with_po_reference(mut self, reference: impl Into<String>) -> Self {
        self.po_reference = Some(reference.into());
        self
    }

    pub fn with_line_item(mut self, item: LineItem) -> Self {
        self.line_items.push(item);
        self
    }

    pub fn with_attachment(mut self, attachment: impl Into<String>) -> Self {
        self.attachments.push(attachment.into());
        self
    }
}

/// A purchase order fetched from the ERP during RETRIEVE.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub po_number: String,
    pub vendor: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

/// Enriched vendor information assembled during PREPARE.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VendorProfile {
    pub normalized_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    pub risk_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_score: Option<f64>,
    #[serde(default)]
    pub enrichment_meta: serde_json::Value,
}

/// Validation and risk flags computed during PREPARE.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RiskFlags {
    pub missing_info: Vec<String>,
    pub risk_score: f64,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_total() {
        let item = LineItem::new("Product A", 10.0, 100.0);
        assert_eq!(item.total, 1000.0);
    }

    #[test]
    fn test_payload_builder() {
        let payload = InvoicePayload::new("INV-2024-001", "Acme Corporation", 5500.0)
            .with_dates("2024-12-15", "2025-01-15")
            .with_po_reference("PO-2024-456")
            .with_line_item(LineItem::new("Consulting Services", 1.0, 3000.0));

        assert_eq!(payload.currency, "USD");
        assert_eq!(payload.po_reference.as_deref(), Some("PO-2024-456"));
        assert_eq!(payload.line_items.len(), 1);
    }

    #[test]
    fn test_payload_deserialize_defaults() {
        let payload: InvoicePayload = serde_json::from_str(
            r#"{
                "invoice_id": "INV-1",
                "vendor_name": "Acme",
                "invoice_date": "2024-12-15",
                "due_date": "2025-01-15",
                "amount": 100.0
            }"#,
        )
        .unwrap();

        assert_eq!(payload.currency, "USD");
        assert!(payload.line_items.is_empty());
        assert!(payload.po_reference.is_none());
    }
}
