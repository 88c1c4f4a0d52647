//! Payflow domain types
//!
//! The shared vocabulary for the invoice-to-pay workflow engine:
//! the stage graph names, the single mutable [`WorkflowState`] aggregate
//! threaded through a run, the [`Checkpoint`] snapshot taken when execution
//! pauses for a human decision, and the error taxonomy.
//!
//! Invariants enforced here rather than trusted to callers:
//!
//! - `workflow_id` is assigned once at creation and never changes.
//! - `stage_outputs` and `ability_calls` are append-only: stages hand the
//!   executor a [`StageUpdate`] and [`WorkflowState::apply`] is the only
//!   mutation path, so history lists cannot be replaced wholesale.

#![deny(unsafe_code)]

pub mod accounting;
pub mod checkpoint;
pub mod error;
pub mod invoice;
pub mod matching;
pub mod selection;
pub mod stage;
pub mod state;

pub use accounting::{AccountingEntry, EntryKind, ReconciliationReport};
pub use checkpoint::{
    Checkpoint, CheckpointId, CheckpointStatus, HumanDecision, ReviewQueueItem,
};
pub use error::{WorkflowError, WorkflowResult};
pub use invoice::{InvoicePayload, LineItem, PurchaseOrder, RiskFlags, VendorProfile};
pub use matching::{MatchEvidence, MatchResult};
pub use selection::{AbilityCall, ProviderGroup, ToolSelection};
pub use stage::{Stage, StageOutput, StageStatus};
pub use state::{
    ApprovalStatus, AuditLogEntry, StageUpdate, WorkflowId, WorkflowState, WorkflowStatus,
};
