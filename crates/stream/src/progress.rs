//! Periodic progress telemetry for long-running streams.
//!
//! Progress updates keep operators from thinking a slow model has hung.
//! They are evaluated on partial arrival, not on a timer thread, and flow
//! through a [`ProgressSink`] so tests and embedders can intercept them.
//! The default sink logs to the `streaming_progress` target, kept separate
//! from the request-trace log.

use tracing::info;

use windlass_core::message::MessageToolCall;
use windlass_core::provider::Usage;

/// A periodic progress snapshot of an in-flight stream.
#[derive(Debug, Clone)]
pub struct StreamProgress {
    /// Wall-clock elapsed since consumption started.
    pub elapsed_ms: u64,
    /// Partial responses seen so far.
    pub partials_seen: usize,
    /// Accumulated text length in characters.
    pub text_len: usize,
    /// Characters per second since consumption started.
    pub chars_per_sec: f64,
    /// Tool calls accumulated so far.
    pub tool_call_count: usize,
    /// Compact `[id]name(args)` descriptors for accumulated tool calls.
    pub tool_calls: String,
    /// Last 100 characters of accumulated text.
    pub tail: String,
}

/// Final summary emitted when a stream completes.
#[derive(Debug, Clone)]
pub struct StreamCompletion {
    pub elapsed_ms: u64,
    pub partials_seen: usize,
    pub text_len: usize,
    pub tool_call_count: usize,
    pub usage: Usage,
    /// First 200 characters of the merged text.
    pub preview: String,
}

/// Receiver for progress and completion telemetry.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, context: &str, update: &StreamProgress);
    fn completed(&self, context: &str, summary: &StreamCompletion);
}

/// Default sink: progress lines to the `streaming_progress` log target,
/// completion lines to the application log.
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn progress(&self, context: &str, update: &StreamProgress) {
        info!(
            target: "streaming_progress",
            "{} - Progress[{}ms]: {} responses received, {} characters ({:.1} chars/sec), {} tool calls. {}. Last 100 chars: '{}'",
            context,
            update.elapsed_ms,
            update.partials_seen,
            update.text_len,
            update.chars_per_sec,
            update.tool_call_count,
            update.tool_calls,
            update.tail,
        );
    }

    fn completed(&self, context: &str, summary: &StreamCompletion) {
        info!(
            "{} - Completed[{}ms]: {} responses processed, {} characters, {} tool calls, \
             {} prompt tokens, {} completion tokens, {} total tokens. Preview: '{}'",
            context,
            summary.elapsed_ms,
            summary.partials_seen,
            summary.text_len,
            summary.tool_call_count,
            summary.usage.prompt_tokens,
            summary.usage.completion_tokens,
            summary.usage.total_tokens,
            summary.preview,
        );
    }
}

/// Format accumulated tool calls for a progress line.
pub(crate) fn describe_tool_calls(tool_calls: &[MessageToolCall]) -> String {
    if tool_calls.is_empty() {
        return "No tool calls".into();
    }
    let descriptors: Vec<String> = tool_calls.iter().map(|tc| tc.descriptor()).collect();
    format!("Tool calls: {}", descriptors.join(", "))
}

/// Last `max_len` characters of the text, ellipsis-prefixed when truncated.
pub(crate) fn tail_preview(text: &str, max_len: usize) -> String {
    if text.is_empty() {
        return "(empty)".into();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return text.to_string();
    }
    let tail: String = chars[chars.len() - max_len..].iter().collect();
    format!("...{tail}")
}

/// First `max_len` characters of the text, ellipsis-suffixed when truncated.
pub(crate) fn head_preview(text: &str, max_len: usize) -> String {
    if text.is_empty() {
        return "(empty)".into();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return text.to_string();
    }
    let head: String = chars[..max_len].iter().collect();
    format!("{head}...")
}
