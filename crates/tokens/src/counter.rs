//! Token counting for text and message lists.
//!
//! Uses the cl100k_base byte-pair encoding (GPT-4 / GPT-3.5-turbo family).
//! When the encoder cannot be constructed, counting degrades to a
//! character-based estimate of ~4 characters per token, accurate within
//! ~10% for BPE tokenizers on English text.

use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::{debug, warn};

use windlass_core::message::Message;

/// Fallback: approximate characters per token.
const FALLBACK_CHARS_PER_TOKEN: usize = 4;

/// Structural overhead per message when counting without serialization
/// (role name, delimiters, and formatting markers in the wire format).
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Counts tokens in text and structured message lists.
///
/// Stateless after construction; safe to share behind an `Arc` and call
/// concurrently.
pub struct TokenCounter {
    encoder: Option<CoreBPE>,
}

impl TokenCounter {
    /// Create a counter with the cl100k_base encoding. Falls back to
    /// character estimation if the encoder cannot be built.
    pub fn new() -> Self {
        let encoder = match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!("Failed to build cl100k_base encoder, using character estimation: {e}");
                None
            }
        };
        Self { encoder }
    }

    /// Create a counter that always uses the ⌈len/4⌉ character estimate.
    pub fn estimating() -> Self {
        Self { encoder: None }
    }

    /// Count tokens in a text string. Empty or blank text counts as 0.
    pub fn count_text(&self, text: &str) -> usize {
        if text.trim().is_empty() {
            return 0;
        }

        match &self.encoder {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => estimate_tokens(text),
        }
    }

    /// Count tokens in an ordered message list.
    ///
    /// Serializes the list to canonical JSON and counts that, which tracks
    /// the actual payload sent to the model. If serialization fails, falls
    /// back to per-message text counts plus a structural overhead of
    /// [`MESSAGE_OVERHEAD_TOKENS`] per message.
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        if messages.is_empty() {
            return 0;
        }

        match serde_json::to_string(messages) {
            Ok(json) => self.count_text(&json),
            Err(e) => {
                debug!("Failed to serialize messages for token counting: {e}");
                let text_tokens: usize =
                    messages.iter().map(|m| self.count_text(&m.content)).sum();
                text_tokens + messages.len() * MESSAGE_OVERHEAD_TOKENS
            }
        }
    }

    /// Whether the real BPE encoder is available (vs. character estimation).
    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Character-based estimate: 1 token ≈ 4 characters, rounded up.
fn estimate_tokens(text: &str) -> usize {
    (text.len() + FALLBACK_CHARS_PER_TOKEN - 1) / FALLBACK_CHARS_PER_TOKEN
}
