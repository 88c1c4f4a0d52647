//! The external-system side of the ability contract.
//!
//! Real deployments implement [`ExternalSystem`] with connectors to OCR,
//! vendor-data, ERP, payment, and notification services. The
//! [`SimulatedExternalSystem`] is the deterministic reference adapter used
//! by tests and demos: fixture responses with the same shapes the real
//! integrations produce, and a configurable PO catalog to drive both
//! match outcomes.

use crate::invoker::{approval_policy_from_payload, Ability, AbilityContext};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use payflow_decision::evaluate_approval;
use payflow_types::{LineItem, PurchaseOrder};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by an external-system connector.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ExternalError(String);

impl ExternalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The external-system provider group behind the Ability Invoker.
///
/// Implementations own their retry/backoff behavior; the workflow core
/// never retries a failed ability.
#[async_trait]
pub trait ExternalSystem: Send + Sync {
    async fn call(
        &self,
        ability: Ability,
        payload: Value,
        context: &AbilityContext,
    ) -> Result<Value, ExternalError>;
}

// ── Simulated Adapter ────────────────────────────────────────────────

/// Deterministic reference implementation of [`ExternalSystem`].
#[derive(Clone, Debug)]
pub struct SimulatedExternalSystem {
    po_catalog: BTreeMap<String, PurchaseOrder>,
}

impl SimulatedExternalSystem {
    /// Adapter with the standard fixture PO (PO-2024-456 at 5500.00).
    pub fn new() -> Self {
        Self::empty().with_po(PurchaseOrder {
            po_number: "PO-2024-456".to_string(),
            vendor: "ACME CORP".to_string(),
            amount: 5500.0,
            currency: "USD".to_string(),
            status: "APPROVED".to_string(),
            line_items: vec![
                LineItem::new("Product A", 10.0, 100.0),
                LineItem::new("Product B", 5.0, 200.0),
                LineItem::new("Consulting Services", 1.0, 3000.0),
            ],
        })
    }

    /// Adapter with no purchase orders: every fetch misses.
    pub fn empty() -> Self {
        Self {
            po_catalog: BTreeMap::new(),
        }
    }

    /// Register a purchase order under its PO number.
    pub fn with_po(mut self, po: PurchaseOrder) -> Self {
        self.po_catalog.insert(po.po_number.clone(), po);
        self
    }

    fn ocr_extract(&self, payload: &Value) -> Value {
        let tool = str_field(payload, "ocr_tool", "tesseract");
        let line_items = vec![
            LineItem::new("Product A", 10.0, 100.0),
            LineItem::new("Product B", 5.0, 200.0),
            LineItem::new("Consulting Services", 1.0, 3000.0),
        ];
        json!({
            "invoice_text": "INVOICE\n\nBill To: Your Company Inc\nFrom: Acme Corporation\nSubtotal: $5,000.00\nTax (10%): $500.00\nTOTAL: $5,500.00\nPayment Terms: Net 30",
            "parsed_line_items": line_items,
            "detected_pos": [],
            "currency": "USD",
            "ocr_confidence": 0.95,
            "ocr_tool_used": tool,
            "extracted_at": Utc::now(),
        })
    }

    fn enrich_vendor(&self, payload: &Value) -> Value {
        let tool = str_field(payload, "enrichment_tool", "vendor_db");
        let tax_id = payload
            .get("vendor_tax_id")
            .and_then(Value::as_str)
            .unwrap_or("12-3456789");
        json!({
            "tax_id": tax_id,
            "credit_score": 750.0,
            "risk_score": 0.1,
            "enrichment_meta": {
                "company_size": "Medium",
                "industry": "Technology",
                "country": "United States",
                "credit_rating": "A",
                "payment_history_score": 0.92,
                "enrichment_source": tool,
                "enriched_at": Utc::now(),
            },
        })
    }

    fn fetch_po(&self, payload: &Value) -> Value {
        let matched: Vec<&PurchaseOrder> = payload
            .get("po_reference")
            .and_then(Value::as_str)
            .and_then(|reference| self.po_catalog.get(reference))
            .into_iter()
            .collect();
        json!({
            "matched_pos": matched,
            "erp_system": str_field(payload, "erp_tool", "mock_erp"),
            "fetched_at": Utc::now(),
        })
    }

    fn fetch_grn(&self, payload: &Value) -> Value {
        let grns = match payload.get("po_reference").and_then(Value::as_str) {
            Some(reference) => json!([{
                "grn_number": format!("GRN-{reference}"),
                "po_reference": reference,
                "received_date": "2024-12-01",
                "received_qty": 15,
                "status": "COMPLETED",
            }]),
            None => json!([]),
        };
        json!({
            "matched_grns": grns,
            "erp_system": str_field(payload, "erp_tool", "mock_erp"),
            "fetched_at": Utc::now(),
        })
    }

    fn fetch_history(&self, payload: &Value) -> Value {
        json!({
            "history": [
                {"invoice_id": "INV-2024-000", "date": "2024-10-15", "amount": 4500.0, "status": "PAID", "payment_date": "2024-11-10"},
                {"invoice_id": "INV-2024-002", "date": "2024-09-20", "amount": 3200.0, "status": "PAID", "payment_date": "2024-10-15"},
            ],
            "vendor_name": str_field(payload, "vendor_name", ""),
            "erp_system": str_field(payload, "erp_tool", "mock_erp"),
            "fetched_at": Utc::now(),
        })
    }

    fn apply_approval_policy(&self, payload: &Value) -> Value {
        let amount = payload.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
        let policy = approval_policy_from_payload(payload);
        let outcome = evaluate_approval(amount, &policy);
        json!({
            "approval_status": outcome.status,
            "approver_id": outcome.approver_id,
            "approval_threshold": outcome.threshold,
            "invoice_amount": amount,
            "policy_applied": "amount_based_approval",
            "applied_at": Utc::now(),
        })
    }

    fn post_to_erp(&self, payload: &Value) -> Value {
        let entry_count = payload
            .get("accounting_entries")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        json!({
            "posted": true,
            "erp_txn_id": format!("ERP-TXN-{}", short_hex(8)),
            "entry_count": entry_count,
            "erp_system": str_field(payload, "erp_tool", "mock_erp"),
            "posted_at": Utc::now(),
        })
    }

    fn schedule_payment(&self, payload: &Value) -> Value {
        let due_date = payload
            .get("due_date")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| (Utc::now() + Duration::days(30)).to_rfc3339());
        json!({
            "scheduled_payment_id": format!("PAY-{}", short_hex(8)),
            "amount": payload.get("amount").and_then(Value::as_f64).unwrap_or(0.0),
            "scheduled_date": due_date,
            "payment_method": "ACH",
            "status": "SCHEDULED",
            "scheduled_at": Utc::now(),
        })
    }

    fn notify_vendor(&self, payload: &Value) -> Value {
        json!({
            "notification_id": format!("NOTIF-{}", short_hex(8)),
            "recipient": str_field(payload, "vendor_name", ""),
            "channel": "email",
            "status": "SENT",
            "subject": format!("Invoice {} Processed", str_field(payload, "invoice_id", "")),
            "notification_tool": str_field(payload, "notification_tool", "ses"),
            "sent_at": Utc::now(),
        })
    }

    fn notify_finance_team(&self, payload: &Value) -> Value {
        json!({
            "notification_id": format!("NOTIF-{}", short_hex(8)),
            "recipients": ["finance@company.com", "ap@company.com"],
            "channel": "email",
            "status": "SENT",
            "subject": format!(
                "Invoice {} - Status: {}",
                str_field(payload, "invoice_id", ""),
                str_field(payload, "status", "COMPLETED"),
            ),
            "notification_tool": str_field(payload, "notification_tool", "ses"),
            "sent_at": Utc::now(),
        })
    }
}

impl Default for SimulatedExternalSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExternalSystem for SimulatedExternalSystem {
    async fn call(
        &self,
        ability: Ability,
        payload: Value,
        _context: &AbilityContext,
    ) -> Result<Value, ExternalError> {
        let response = match ability {
            Ability::OcrExtract => self.ocr_extract(&payload),
            Ability::EnrichVendor => self.enrich_vendor(&payload),
            Ability::FetchPo => self.fetch_po(&payload),
            Ability::FetchGrn => self.fetch_grn(&payload),
            Ability::FetchHistory => self.fetch_history(&payload),
            Ability::ApplyApprovalPolicy => self.apply_approval_policy(&payload),
            Ability::PostToErp => self.post_to_erp(&payload),
            Ability::SchedulePayment => self.schedule_payment(&payload),
            Ability::NotifyVendor => self.notify_vendor(&payload),
            Ability::NotifyFinanceTeam => self.notify_finance_team(&payload),
            Ability::ValidateSchema
            | Ability::NormalizeVendor
            | Ability::ComputeFlags
            | Ability::ComputeMatchScore
            | Ability::BuildAccountingEntries => {
                return Err(ExternalError::new(format!(
                    "ability '{ability}' is not an external-system ability"
                )))
            }
        };
        Ok(response)
    }
}

fn str_field<'a>(payload: &'a Value, key: &str, default: &'a str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn short_hex(len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..len.min(hex.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use payflow_types::Stage;

    fn context() -> AbilityContext {
        AbilityContext::new("wf_test", Stage::Retrieve)
    }

    #[tokio::test]
    async fn test_fetch_po_hits_catalog() {
        let system = SimulatedExternalSystem::new();
        let data = system
            .call(
                Ability::FetchPo,
                json!({"po_reference": "PO-2024-456"}),
                &context(),
            )
            .await
            .unwrap();

        let pos = data["matched_pos"].as_array().unwrap();
        assert_eq!(pos.len(), 1);
        assert_eq!(pos[0]["amount"], json!(5500.0));
    }

    #[tokio::test]
    async fn test_fetch_po_miss_returns_empty() {
        let system = SimulatedExternalSystem::empty();
        let data = system
            .call(
                Ability::FetchPo,
                json!({"po_reference": "PO-UNKNOWN"}),
                &context(),
            )
            .await
            .unwrap();
        assert!(data["matched_pos"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_with_po_overrides_amount() {
        let system = SimulatedExternalSystem::empty().with_po(PurchaseOrder {
            po_number: "PO-77".to_string(),
            vendor: "GLOBEX".to_string(),
            amount: 4800.0,
            currency: "USD".to_string(),
            status: "APPROVED".to_string(),
            line_items: Vec::new(),
        });
        let data = system
            .call(Ability::FetchPo, json!({"po_reference": "PO-77"}), &context())
            .await
            .unwrap();
        assert_eq!(data["matched_pos"][0]["amount"], json!(4800.0));
    }

    #[tokio::test]
    async fn test_deterministic_ability_rejected() {
        let system = SimulatedExternalSystem::new();
        let err = system
            .call(Ability::ComputeMatchScore, json!({}), &context())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("compute_match_score"));
    }

    #[tokio::test]
    async fn test_apply_approval_policy_uses_threshold() {
        let system = SimulatedExternalSystem::new();
        let data = system
            .call(
                Ability::ApplyApprovalPolicy,
                json!({"amount": 5500.0, "auto_approve_threshold": 10000.0}),
                &context(),
            )
            .await
            .unwrap();
        assert_eq!(data["approval_status"], json!("AUTO_APPROVED"));
        assert_eq!(data["approver_id"], json!("system"));
    }

    #[tokio::test]
    async fn test_grn_requires_reference() {
        let system = SimulatedExternalSystem::new();
        let data = system
            .call(Ability::FetchGrn, json!({}), &context())
            .await
            .unwrap();
        assert!(data["matched_grns"].as_array().unwrap().is_empty());
    }
}
