//! Error types for the Windlass runtime.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error type; the top-level `Error` wraps them.
//!
//! Propagation policy: token-limit and stream-producer errors surface to the
//! caller; telemetry serialization failures and store-rebuild failures are
//! contained where they occur and never escape.

use thiserror::Error;

/// The top-level error type for all Windlass operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The sized request exceeds the model's context limit despite compression.
    #[error("Token limit exceeded: current={current_tokens}, limit={limit}, model={model}")]
    TokenLimitExceeded {
        current_tokens: usize,
        limit: usize,
        model: String,
    },

    /// A failure surfaced by the model producer during streaming.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The summarization model did not return usable text.
    #[error("Summarization failed: {0}")]
    Summarization(String),

    /// Conversation store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a model producer.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// An HTTP-level API error with response details.
    #[error("API request failed: status={status_code}, url={url}")]
    ApiError {
        status_code: u16,
        body: String,
        url: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Errors surfaced by a conversation store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),
}
