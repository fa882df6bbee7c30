//! Model provider trait — the abstraction over LLM backends.
//!
//! A provider knows how to send a message list to a model and hand back a
//! finite, ordered sequence of partial responses over a channel. The
//! aggregator in `windlass_stream` is the single consumer of that channel;
//! no transport is mandated here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};

/// A request submitted to a model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "qwen3-coder-plus", "gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// Token usage information. Streaming providers typically report cumulative
/// values, with the authoritative reading arriving in the final partial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Rate-limit information reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_remaining: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_remaining: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_after_secs: Option<u64>,
}

/// One element of a streaming response sequence.
///
/// Deltas are additive: `content` appends to the accumulated text and
/// `tool_calls` extend the running list. Scalar fields supersede earlier
/// empty readings; usage is folded by taking the maximum positive values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialResponse {
    /// Partial text delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls appended by this partial
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Message-level metadata to merge into the final assistant message
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Per-generation metadata; `None` readings are ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_metadata: Option<serde_json::Value>,

    /// Aggregate usage reported so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Response id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Model that produced this partial
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,

    /// Prompt-level metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_metadata: Option<serde_json::Value>,

    /// Rate-limit info; the first non-empty reading is retained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
}

impl PartialResponse {
    /// A partial carrying only a text delta.
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            content: Some(delta.into()),
            ..Default::default()
        }
    }
}

/// The fixed point of aggregation: a single assistant message plus final
/// usage and response metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedResponse {
    /// Merged assistant message (concatenated text, interleaved tool calls,
    /// merged metadata map)
    pub message: Message,

    /// Last non-`None` per-generation metadata seen on the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_metadata: Option<serde_json::Value>,

    /// Final usage figures
    pub usage: Usage,

    /// Last non-empty response id seen on the stream
    pub id: String,

    /// Last non-empty model name seen on the stream
    pub model: String,

    /// Last non-empty prompt metadata seen on the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_metadata: Option<serde_json::Value>,

    /// First non-empty rate limit seen on the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
}

/// Result of folding a partial-response stream.
#[derive(Debug, Clone)]
pub struct StreamingResult {
    /// The merged response
    pub response: MergedResponse,

    /// Whether consumption stopped before the producer finished
    pub early_terminated: bool,

    /// Tokens in the request, as accounted before dispatch
    pub input_token_count: usize,

    /// Tokens in the merged response text
    pub output_token_count: usize,
}

impl StreamingResult {
    /// Merged text content.
    pub fn text(&self) -> &str {
        &self.response.message.content
    }

    /// Merged tool calls in arrival order.
    pub fn tool_calls(&self) -> &[MessageToolCall] {
        &self.response.message.tool_calls
    }
}

/// A finite stream of partial responses, as handed out by a provider.
pub type PartialStream = tokio::sync::mpsc::Receiver<Result<PartialResponse, ProviderError>>;

/// The core provider trait.
///
/// Every model backend implements this; the runtime calls `stream()` without
/// knowing which provider is behind it.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "dashscope", "openai").
    fn name(&self) -> &str;

    /// Send a request and get a stream of partial responses.
    async fn stream(&self, request: ChatRequest) -> Result<PartialStream, ProviderError>;
}
