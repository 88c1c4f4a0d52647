//! Payflow decision engine
//!
//! Pure computation, no I/O: two-way match scoring between an invoice and
//! a purchase order, checkpoint priority, approval-policy evaluation,
//! vendor-name normalization, risk-flag computation, accounting-entry
//! construction, and invoice schema validation.
//!
//! Everything here consumes plain values and produces plain values; the
//! executor decides what to do with them. Thresholds are run-time
//! configuration ([`MatchPolicy`], [`ApprovalPolicy`]), not constants.

#![deny(unsafe_code)]

pub mod accounting;
pub mod approval;
pub mod flags;
pub mod matching;
pub mod validate;
pub mod vendor;

pub use accounting::build_accounting_entries;
pub use approval::{evaluate_approval, ApprovalOutcome, ApprovalPolicy};
pub use flags::compute_flags;
pub use matching::{checkpoint_priority, score_two_way, MatchPolicy, TwoWayMatch};
pub use validate::validate_invoice;
pub use vendor::{normalize_vendor_name, NormalizedVendor};
