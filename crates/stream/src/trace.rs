//! Per-request trace recording.
//!
//! A [`TraceRecorder`] tracks one request/response cycle: the serialized
//! request, the merged response, token counts, and any error. Records go to
//! the dedicated `llm_requests` log target, separate from the progress log.
//! Serialization failures are logged to the application log and never
//! interrupt the caller.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use windlass_core::error::ProviderError;
use windlass_core::provider::MergedResponse;
use windlass_tokens::TokenCounter;

const TRACE_TARGET: &str = "llm_requests";

/// Request-scoped recorder for LLM requests and responses.
///
/// Each instance tracks one request/response cycle under a fresh unique id.
pub struct TraceRecorder {
    request_id: String,
    counter: Arc<TokenCounter>,
    input_token_count: usize,
    output_token_count: usize,
}

impl TraceRecorder {
    /// Create a recorder for a new request.
    pub fn new(counter: Arc<TokenCounter>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            counter,
            input_token_count: 0,
            output_token_count: 0,
        }
    }

    /// The unique id for this request.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Record the outgoing request.
    ///
    /// Serializes the request to the trace log and, when no input count was
    /// preset by the caller, derives one from the request JSON.
    pub fn record_request<T: Serialize>(&mut self, request: &T) {
        match serde_json::to_string(request) {
            Ok(json) => {
                info!(target: TRACE_TARGET, "Request[{}]: {}", self.request_id, json);
                if self.input_token_count == 0 {
                    self.input_token_count = self.counter.count_text(&json);
                }
                info!(
                    target: TRACE_TARGET,
                    "Request[{}] InputTokenCount: {}",
                    self.request_id,
                    self.input_token_count
                );
            }
            Err(e) => {
                error!("Failed to serialize chat request for tracing: {e}");
            }
        }
    }

    /// Record the merged response.
    ///
    /// The output token count is computed over the merged response text with
    /// the same encoding used for inputs.
    pub fn record_response(&mut self, response: &MergedResponse) {
        match serde_json::to_string(response) {
            Ok(json) => {
                info!(target: TRACE_TARGET, "Response[{}]: {}", self.request_id, json);
            }
            Err(e) => {
                error!("Failed to serialize chat response for tracing: {e}");
            }
        }

        self.output_token_count = self.counter.count_text(&response.message.content);
        info!(
            target: TRACE_TARGET,
            "Response[{}] OutputTokenCount: {}",
            self.request_id,
            self.output_token_count
        );
    }

    /// Record an error from the producer. HTTP response errors are logged
    /// with status, body, and URL; everything else with its display form.
    pub fn record_error(&self, err: &ProviderError) {
        match err {
            ProviderError::ApiError {
                status_code,
                body,
                url,
            } => {
                let body = if body.is_empty() { "(empty)" } else { body };
                error!(
                    target: TRACE_TARGET,
                    "Error[{}]: Status={}, ResponseBody={}, URL={}",
                    self.request_id,
                    status_code,
                    body,
                    url
                );
            }
            other => {
                error!(target: TRACE_TARGET, "Error[{}]: {}", self.request_id, other);
            }
        }
    }

    /// Set the input token count (when calculated by the caller from the
    /// message list before dispatch).
    pub fn set_input_token_count(&mut self, count: usize) {
        self.input_token_count = count;
    }

    /// Input token count for this request.
    pub fn input_token_count(&self) -> usize {
        self.input_token_count
    }

    /// Output token count for this request.
    pub fn output_token_count(&self) -> usize {
        self.output_token_count
    }
}
