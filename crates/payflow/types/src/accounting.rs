//! Accounting entries built during RECONCILE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a journal entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Debit,
    Credit,
}

/// One accounting journal entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountingEntry {
    pub kind: EntryKind,
    pub account: String,
    pub account_code: String,
    pub amount: f64,
    pub currency: String,
    pub description: String,
}

/// Summary report produced alongside the journal entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub invoice_id: String,
    pub vendor: String,
    pub total_amount: f64,
    pub currency: String,
    pub entry_count: usize,
    pub balanced: bool,
    pub created_at: DateTime<Utc>,
}
