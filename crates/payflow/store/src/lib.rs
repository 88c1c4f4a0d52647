//! Payflow checkpoint store
//!
//! Persistence contract for HITL checkpoints: create a snapshot when the
//! executor suspends, record exactly one human decision per checkpoint,
//! and serve the priority-ordered review queue.
//!
//! The in-memory adapter is deterministic and test-friendly. Production
//! deployments put a transactional backend behind the same
//! [`CheckpointStore`] trait; the invariants (one AWAITING_REVIEW
//! checkpoint per workflow, compare-and-set on the decision transition,
//! checkpoint and queue projection updated atomically) are part of the
//! contract, not the adapter.

#![deny(unsafe_code)]

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryCheckpointStore;
pub use traits::{CheckpointStore, StoreConfig};
