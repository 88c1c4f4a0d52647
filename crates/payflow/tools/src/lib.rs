//! Payflow tool selection and ability routing
//!
//! Two collaborators the stage executor leans on:
//!
//! - The [`ToolSelector`] resolves a *capability* (a category of
//!   interchangeable providers, e.g. `"ocr"`) to one provider from a
//!   configured, prioritized pool, by evaluating typed eligibility
//!   conditions against a context map. Selection fails open: when no
//!   provider's conditions pass, the full pool is reconsidered.
//! - The [`AbilityInvoker`] routes a named *ability* (one externally
//!   routable operation, e.g. `"compute_match_score"`) to its provider
//!   group — local deterministic computation or the external-system
//!   connector — and wraps every result in the uniform
//!   [`AbilityOutcome`] envelope.

#![deny(unsafe_code)]

pub mod config;
pub mod external;
pub mod invoker;
pub mod selector;

pub use config::{Condition, ProviderSpec, SelectionMethod, ToolPool, ToolPoolConfig};
pub use external::{ExternalError, ExternalSystem, SimulatedExternalSystem};
pub use invoker::{Ability, AbilityContext, AbilityInvoker, AbilityOutcome};
pub use selector::ToolSelector;
