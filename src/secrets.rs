//! Runtime secret sources for `type` steps recorded as `__SECRET__`

use crate::model::Step;
use std::collections::HashMap;

/// Supplies the real value for a redacted `type` step.
pub trait SecretSource: Send + Sync {
    fn secret_for(&self, step: &Step) -> Option<String>;

    /// Operator hint shown when no secret is available
    fn describe(&self, step: &Step) -> String;
}

/// Reads `MACRO_SECRET_<order_index>`, then `MACRO_SECRET`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretSource;

impl EnvSecretSource {
    pub const VAR: &'static str = "MACRO_SECRET";

    fn step_var(step: &Step) -> String {
        format!("{}_{}", Self::VAR, step.order_index)
    }
}

impl SecretSource for EnvSecretSource {
    fn secret_for(&self, step: &Step) -> Option<String> {
        std::env::var(Self::step_var(step))
            .or_else(|_| std::env::var(Self::VAR))
            .ok()
            .filter(|v| !v.is_empty())
    }

    fn describe(&self, step: &Step) -> String {
        format!(
            "secret value not provided (set {} or {})",
            Self::step_var(step),
            Self::VAR
        )
    }
}

/// Fixed secrets keyed by step order, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    by_order: HashMap<u32, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, order_index: u32, value: impl Into<String>) -> Self {
        self.by_order.insert(order_index, value.into());
        self
    }
}

impl SecretSource for StaticSecrets {
    fn secret_for(&self, step: &Step) -> Option<String> {
        self.by_order.get(&step.order_index).cloned()
    }

    fn describe(&self, step: &Step) -> String {
        format!("secret value not provided for step {}", step.order_index)
    }
}
