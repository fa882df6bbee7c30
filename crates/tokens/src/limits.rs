//! Built-in context and output limits for common LLM models.
//!
//! The table is populated at initialization and immutable afterwards;
//! share it freely behind an `Arc`. Lookup tries exact match, then
//! case-insensitive exact match, then the longest case-insensitive prefix
//! (model responses often carry a version suffix, e.g.
//! "gpt-4o-2024-11-20" matches "gpt-4o").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use windlass_core::error::Error;

/// Default context limit: 131,072 tokens (128K).
pub const DEFAULT_CONTEXT_LIMIT: usize = 131_072;

/// Default output limit: 65,536 tokens (64K).
pub const DEFAULT_OUTPUT_LIMIT: usize = 65_536;

/// Per-model token budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    /// Maximum input token budget.
    pub context: usize,
    /// Maximum output tokens per response.
    pub output: usize,
}

impl ModelLimits {
    pub fn new(context: usize, output: usize) -> Self {
        Self { context, output }
    }
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LIMIT, DEFAULT_OUTPUT_LIMIT)
    }
}

/// Per-model limit table with built-in defaults and a configurable fallback.
pub struct LimitTable {
    entries: HashMap<String, ModelLimits>,
    fallback: ModelLimits,
}

impl LimitTable {
    /// Create a table with built-in model limits and the standard fallback.
    pub fn with_defaults() -> Self {
        Self::with_fallback(ModelLimits::default())
    }

    /// Create a table whose fallback comes from the runtime configuration.
    pub fn from_runtime(config: &windlass_config::RuntimeConfig) -> Self {
        Self::with_fallback(ModelLimits::new(
            config.default_context_limit,
            config.default_output_limit,
        ))
    }

    /// Create a table with built-in model limits and a custom fallback for
    /// unknown models.
    pub fn with_fallback(fallback: ModelLimits) -> Self {
        let mut entries = HashMap::new();

        // ── Qwen ───────────────────────────────────────────────────
        entries.insert("qwen3-coder-plus".into(), ModelLimits::new(1_048_576, 65_536));
        entries.insert("qwen3-coder-flash".into(), ModelLimits::new(1_048_576, 65_536));

        // ── Gemini ─────────────────────────────────────────────────
        entries.insert("gemini-1.5-pro".into(), ModelLimits::new(2_097_152, 8_192));
        entries.insert("gemini-1.5-flash".into(), ModelLimits::new(1_048_576, 8_192));

        // ── OpenAI ─────────────────────────────────────────────────
        entries.insert("gpt-4o".into(), ModelLimits::new(131_072, 16_384));
        entries.insert("gpt-4-turbo".into(), ModelLimits::new(128_000, 4_096));
        entries.insert("gpt-4".into(), ModelLimits::new(8_192, 8_192));
        entries.insert("gpt-3.5-turbo".into(), ModelLimits::new(16_385, 4_096));

        Self { entries, fallback }
    }

    /// Add or override an entry. Intended for initialization only; the
    /// table is shared immutably afterwards.
    pub fn set(&mut self, model: impl Into<String>, limits: ModelLimits) {
        self.entries.insert(model.into(), limits);
    }

    /// Look up the limits for a model.
    ///
    /// Matching order: exact, case-insensitive exact, longest
    /// case-insensitive prefix. Unknown, empty, or blank names fall back
    /// to the configured default without error.
    pub fn limits_for(&self, model: &str) -> ModelLimits {
        if model.trim().is_empty() {
            debug!("Model name is empty, using default limits");
            return self.fallback;
        }

        // Exact match
        if let Some(limits) = self.entries.get(model) {
            return *limits;
        }

        let model_lower = model.to_lowercase();

        // Case-insensitive exact match
        for (key, limits) in &self.entries {
            if key.to_lowercase() == model_lower {
                return *limits;
            }
        }

        // Longest case-insensitive prefix match
        let mut best: Option<(&str, &ModelLimits)> = None;
        for (key, limits) in &self.entries {
            if model_lower.starts_with(&key.to_lowercase())
                && best.map_or(true, |(k, _)| key.len() > k.len())
            {
                best = Some((key, limits));
            }
        }
        if let Some((key, limits)) = best {
            debug!(model, prefix = key, "Using limits for model prefix");
            return *limits;
        }

        debug!(model, "Model not found in limit table, using defaults");
        self.fallback
    }

    /// Context token limit for a model.
    pub fn context_limit(&self, model: &str) -> usize {
        self.limits_for(model).context
    }

    /// Maximum output tokens for a model.
    pub fn output_limit(&self, model: &str) -> usize {
        self.limits_for(model).output
    }

    /// Pre-dispatch guard: error if a sized request exceeds the model's
    /// context limit.
    pub fn check_context(&self, model: &str, current_tokens: usize) -> Result<(), Error> {
        let limit = self.context_limit(model);
        if current_tokens > limit {
            return Err(Error::TokenLimitExceeded {
                current_tokens,
                limit,
                model: model.to_string(),
            });
        }
        Ok(())
    }

    /// Number of models in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LimitTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let table = LimitTable::with_defaults();
        let limits = table.limits_for("gemini-1.5-pro");
        assert_eq!(limits.context, 2_097_152);
        assert_eq!(limits.output, 8_192);
    }

    #[test]
    fn case_insensitive_match() {
        let table = LimitTable::with_defaults();
        assert_eq!(table.context_limit("GPT-4o"), 131_072);
    }

    #[test]
    fn prefix_match_with_version_suffix() {
        let table = LimitTable::with_defaults();
        let limits = table.limits_for("gpt-4o-2024-11-20");
        assert_eq!(limits.context, 131_072);
        assert_eq!(limits.output, 16_384);
    }

    #[test]
    fn prefix_match_unlisted_variant() {
        let table = LimitTable::with_defaults();
        // No gpt-4o-mini entry; falls back to the gpt-4o prefix
        let limits = table.limits_for("gpt-4o-mini");
        assert_eq!(limits.context, 131_072);
        assert_eq!(limits.output, 16_384);
    }

    #[test]
    fn longest_prefix_wins() {
        let table = LimitTable::with_defaults();
        // Both "gpt-4" and "gpt-4-turbo" are prefixes; the longer one wins
        assert_eq!(table.context_limit("gpt-4-turbo-2024-04-09"), 128_000);
    }

    #[test]
    fn empty_name_uses_defaults() {
        let table = LimitTable::with_defaults();
        assert_eq!(table.context_limit(""), DEFAULT_CONTEXT_LIMIT);
        assert_eq!(table.output_limit("   "), DEFAULT_OUTPUT_LIMIT);
    }

    #[test]
    fn unknown_name_uses_defaults() {
        let table = LimitTable::with_defaults();
        let limits = table.limits_for("totally-unknown-model");
        assert_eq!(limits.context, DEFAULT_CONTEXT_LIMIT);
        assert_eq!(limits.output, DEFAULT_OUTPUT_LIMIT);
    }

    #[test]
    fn custom_fallback() {
        let table = LimitTable::with_fallback(ModelLimits::new(1_000, 500));
        assert_eq!(table.context_limit("unknown"), 1_000);
        assert_eq!(table.output_limit("unknown"), 500);
        // Built-in entries still resolve
        assert_eq!(table.context_limit("gpt-4"), 8_192);
    }

    #[test]
    fn from_runtime_uses_configured_fallback() {
        let config = windlass_config::RuntimeConfig {
            default_context_limit: 2_048,
            default_output_limit: 512,
            ..Default::default()
        };
        let table = LimitTable::from_runtime(&config);
        assert_eq!(table.context_limit("unknown"), 2_048);
        assert_eq!(table.output_limit("unknown"), 512);
    }

    #[test]
    fn check_context_within_limit() {
        let table = LimitTable::with_defaults();
        assert!(table.check_context("gpt-4", 8_000).is_ok());
    }

    #[test]
    fn check_context_over_limit() {
        let table = LimitTable::with_defaults();
        let err = table.check_context("gpt-4", 9_000).unwrap_err();
        match err {
            Error::TokenLimitExceeded {
                current_tokens,
                limit,
                model,
            } => {
                assert_eq!(current_tokens, 9_000);
                assert_eq!(limit, 8_192);
                assert_eq!(model, "gpt-4");
            }
            other => panic!("Expected TokenLimitExceeded, got {other}"),
        }
    }

    #[test]
    fn set_overrides_entry() {
        let mut table = LimitTable::with_defaults();
        table.set("gpt-4", ModelLimits::new(32_768, 8_192));
        assert_eq!(table.context_limit("gpt-4"), 32_768);
    }
}
