//! Tool-pool configuration: capability pools, provider specs, and the
//! closed eligibility-condition grammar.
//!
//! Conditions are compiled from configuration into typed predicates —
//! equality, set membership, and numeric comparison against context keys.
//! Arbitrary expressions are not evaluated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// How a provider is chosen from a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    #[default]
    RuleBased,
    /// Reserved in configuration; resolves to the rule-based path.
    LlmBased,
    /// Reserved in configuration; resolves to the rule-based path.
    Hybrid,
}

impl SelectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleBased => "rule_based",
            Self::LlmBased => "llm_based",
            Self::Hybrid => "hybrid",
        }
    }
}

/// One eligibility condition evaluated against the selection context.
///
/// A condition on a key absent from the context evaluates false; the
/// pool-level fail-open fallback decides what happens when nothing is
/// eligible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Equals { key: String, value: Value },
    OneOf { key: String, values: Vec<Value> },
    AtLeast { key: String, value: f64 },
    GreaterThan { key: String, value: f64 },
    AtMost { key: String, value: f64 },
    LessThan { key: String, value: f64 },
}

impl Condition {
    pub fn evaluate(&self, context: &BTreeMap<String, Value>) -> bool {
        match self {
            Self::Equals { key, value } => context.get(key) == Some(value),
            Self::OneOf { key, values } => context
                .get(key)
                .map(|actual| values.contains(actual))
                .unwrap_or(false),
            Self::AtLeast { key, value } => Self::numeric(context, key, |n| n >= *value),
            Self::GreaterThan { key, value } => Self::numeric(context, key, |n| n > *value),
            Self::AtMost { key, value } => Self::numeric(context, key, |n| n <= *value),
            Self::LessThan { key, value } => Self::numeric(context, key, |n| n < *value),
        }
    }

    fn numeric(context: &BTreeMap<String, Value>, key: &str, check: impl Fn(f64) -> bool) -> bool {
        context
            .get(key)
            .and_then(Value::as_f64)
            .map(check)
            .unwrap_or(false)
    }
}

/// Configuration for one provider in a capability pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    /// Lower value = preferred.
    pub priority: u32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<String>,
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            conditions: Vec::new(),
            cost: None,
            latency: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn eligible(&self, context: &BTreeMap<String, Value>) -> bool {
        self.conditions.iter().all(|c| c.evaluate(context))
    }
}

/// An ordered provider pool for one capability.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolPool {
    pub providers: Vec<ProviderSpec>,
}

/// Full tool-pool configuration consumed by the selector. Read-only at
/// run time; shared across workflow instances.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolPoolConfig {
    pub pools: BTreeMap<String, ToolPool>,
    #[serde(default)]
    pub default_method: SelectionMethod,
    /// When true, an empty eligible set falls back to the full pool
    /// instead of failing the stage.
    #[serde(default = "default_true")]
    pub fail_open: bool,
}

fn default_true() -> bool {
    true
}

impl ToolPoolConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn pool(&self, capability: &str) -> Option<&ToolPool> {
        self.pools.get(capability)
    }
}

impl Default for ToolPoolConfig {
    /// The built-in pool table covering the five capabilities the
    /// invoice-to-pay stages request.
    fn default() -> Self {
        let mut pools = BTreeMap::new();
        pools.insert(
            "ocr".to_string(),
            ToolPool {
                providers: vec![
                    ProviderSpec::new("tesseract", 1).with_condition(Condition::Equals {
                        key: "environment".to_string(),
                        value: Value::String("development".to_string()),
                    }),
                    ProviderSpec::new("aws_textract", 2),
                ],
            },
        );
        pools.insert(
            "enrichment".to_string(),
            ToolPool {
                providers: vec![
                    ProviderSpec::new("vendor_db", 1),
                    ProviderSpec::new("clearbit", 2),
                ],
            },
        );
        pools.insert(
            "erp_connector".to_string(),
            ToolPool {
                providers: vec![
                    ProviderSpec::new("mock_erp", 1).with_condition(Condition::OneOf {
                        key: "environment".to_string(),
                        values: vec![
                            Value::String("development".to_string()),
                            Value::String("staging".to_string()),
                        ],
                    }),
                    ProviderSpec::new("sap", 2),
                ],
            },
        );
        pools.insert(
            "db".to_string(),
            ToolPool {
                providers: vec![
                    ProviderSpec::new("sqlite", 1),
                    ProviderSpec::new("postgres", 2),
                ],
            },
        );
        pools.insert(
            "email".to_string(),
            ToolPool {
                providers: vec![
                    ProviderSpec::new("ses", 1),
                    ProviderSpec::new("sendgrid", 2),
                ],
            },
        );

        Self {
            pools,
            default_method: SelectionMethod::RuleBased,
            fail_open: true,
        }
    }
}
