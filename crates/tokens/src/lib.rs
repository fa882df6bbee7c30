//! Token accounting for the Windlass runtime.
//!
//! Two pieces: [`TokenCounter`] counts tokens in text and message lists
//! with the cl100k_base encoding (character estimation as a fallback), and
//! [`LimitTable`] serves per-model context and output budgets with
//! prefix-aware lookup. Both are immutable after construction and freely
//! shared.

pub mod counter;
pub mod limits;

pub use counter::TokenCounter;
pub use limits::{LimitTable, ModelLimits, DEFAULT_CONTEXT_LIMIT, DEFAULT_OUTPUT_LIMIT};
