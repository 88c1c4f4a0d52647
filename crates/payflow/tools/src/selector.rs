//! Rule-based tool selection over configured capability pools.

use crate::config::{SelectionMethod, ToolPoolConfig};
use payflow_types::{ToolSelection, WorkflowError, WorkflowResult};
use serde_json::Value;
use std::collections::BTreeMap;

/// Selects one provider per capability from the configured pools.
///
/// Constructed once and shared read-only across workflow instances.
#[derive(Clone, Debug)]
pub struct ToolSelector {
    config: ToolPoolConfig,
}

impl ToolSelector {
    pub fn new(config: ToolPoolConfig) -> Self {
        Self { config }
    }

    /// Selector over the built-in pool table.
    pub fn with_defaults() -> Self {
        Self::new(ToolPoolConfig::default())
    }

    /// Select the best provider for `capability` given the context.
    ///
    /// Eligibility misses are non-fatal: when no provider's conditions
    /// pass, the full pool is reconsidered (fail-open). An unknown
    /// capability or an empty configured pool is an error.
    pub fn select(
        &self,
        capability: &str,
        context: &BTreeMap<String, Value>,
    ) -> WorkflowResult<ToolSelection> {
        let pool = self
            .config
            .pool(capability)
            .ok_or_else(|| WorkflowError::UnknownCapability(capability.to_string()))?;

        if pool.providers.is_empty() {
            return Err(WorkflowError::NoEligibleProvider(capability.to_string()));
        }

        let method = self.config.default_method;
        if method != SelectionMethod::RuleBased {
            // llm_based / hybrid are configuration placeholders; both
            // resolve to the rule-based path.
            tracing::debug!(capability, method = method.as_str(), "falling back to rule_based");
        }

        let mut eligible: Vec<_> = pool
            .providers
            .iter()
            .filter(|p| p.eligible(context))
            .collect();

        let fell_back = eligible.is_empty();
        if fell_back {
            if !self.config.fail_open {
                return Err(WorkflowError::NoEligibleProvider(capability.to_string()));
            }
            tracing::warn!(capability, "no eligible providers, falling back to full pool");
            eligible = pool.providers.iter().collect();
        }

        eligible.sort_by_key(|p| p.priority);

        let selected = eligible[0];
        let alternatives: Vec<String> =
            eligible[1..].iter().map(|p| p.name.clone()).collect();
        let reason = if fell_back {
            format!(
                "no provider conditions matched; fell back to full pool and selected '{}' by priority {}",
                selected.name, selected.priority
            )
        } else {
            format!(
                "selected '{}' by priority {} ({} of {} providers eligible)",
                selected.name,
                selected.priority,
                eligible.len(),
                pool.providers.len()
            )
        };

        tracing::info!(capability, selected = %selected.name, "tool selected");

        Ok(ToolSelection {
            capability: capability.to_string(),
            selected: selected.name.clone(),
            method: SelectionMethod::RuleBased.as_str().to_string(),
            reason,
            alternatives,
        })
    }

    /// All configured provider names for a capability, in pool order.
    pub fn providers_for(&self, capability: &str) -> Vec<String> {
        self.config
            .pool(capability)
            .map(|pool| pool.providers.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }
}
