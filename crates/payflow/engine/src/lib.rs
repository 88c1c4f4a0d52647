//! Payflow stage graph executor
//!
//! The [`WorkflowEngine`] owns the invoice-to-pay state machine: twelve
//! named stages executed strictly in sequence, conditional routing after
//! MATCH and HITL_DECISION, and the checkpoint/resume protocol around the
//! human-in-the-loop suspension point.
//!
//! # Key principle
//!
//! **The engine coordinates; it never talks to external systems
//! directly.** Every side effect goes through the ability contract, every
//! provider choice through the tool selector, every snapshot through the
//! checkpoint store — all injected at construction. No global state is
//! shared between workflow instances except the read-only configuration.
//!
//! # Example
//!
//! ```rust
//! use payflow_engine::{EngineConfig, WorkflowEngine};
//! use payflow_store::MemoryCheckpointStore;
//! use payflow_tools::{AbilityInvoker, SimulatedExternalSystem, ToolSelector};
//! use payflow_types::{InvoicePayload, WorkflowStatus};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let engine = WorkflowEngine::new(
//!     ToolSelector::with_defaults(),
//!     AbilityInvoker::new(Arc::new(SimulatedExternalSystem::new())),
//!     Arc::new(MemoryCheckpointStore::with_defaults()),
//!     EngineConfig::default(),
//! );
//!
//! let invoice = InvoicePayload::new("INV-2024-001", "Acme Corporation", 5500.0)
//!     .with_dates("2024-12-15", "2025-01-15")
//!     .with_po_reference("PO-2024-456");
//!
//! let outcome = engine.execute(invoice).await.unwrap();
//! assert_eq!(outcome.status, WorkflowStatus::Completed);
//! # });
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
mod stages;

pub use config::EngineConfig;
pub use engine::{ExecutionOutcome, ResumeOutcome, WorkflowEngine};
