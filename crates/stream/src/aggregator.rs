//! Folding a stream of partial responses into one merged response.
//!
//! A single consumer owns all merge buffers; the mpsc channel is the only
//! boundary with the producer, so no further locking is needed. Progress
//! telemetry is evaluated on each partial arrival against wall-clock time;
//! there is no separate timer task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use windlass_core::error::{ProviderError, Result};
use windlass_core::event::{EventBus, RuntimeEvent};
use windlass_core::message::Message;
use windlass_core::provider::{
    MergedResponse, PartialStream, RateLimit, StreamingResult, Usage,
};
use windlass_tokens::TokenCounter;

use crate::progress::{
    describe_tool_calls, head_preview, tail_preview, ProgressSink, StreamCompletion,
    StreamProgress, TracingProgressSink,
};
use crate::trace::TraceRecorder;

/// Wall-clock interval between progress emissions.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Per-call options for stream aggregation.
#[derive(Clone)]
pub struct StreamOptions {
    /// Descriptive name for logging context (e.g., "Agent thinking",
    /// "Plan creation").
    pub context_name: String,

    /// Plan id carried on `PlanException` events when aggregation fails.
    pub plan_id: String,

    /// Input token count calculated by the caller from the request
    /// messages; zero means "derive from the recorded request".
    pub input_token_count: usize,

    /// Cooperative cancellation. When triggered, consumption stops and the
    /// partial merge is returned with `early_terminated = true`.
    pub cancel: Option<CancellationToken>,

    /// Early termination for thinking-only responses (assistant text with
    /// no tool calls). Accepted for API stability but gated off: no code
    /// path acts on it, and it must never fire in text-only aggregation.
    pub allow_early_termination: bool,
}

impl StreamOptions {
    pub fn new(context_name: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            context_name: context_name.into(),
            plan_id: plan_id.into(),
            input_token_count: 0,
            cancel: None,
            allow_early_termination: false,
        }
    }

    pub fn with_input_token_count(mut self, count: usize) -> Self {
        self.input_token_count = count;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Folds a lazy finite sequence of partial responses into one
/// [`MergedResponse`], with periodic progress telemetry and trace
/// recording.
pub struct StreamAggregator {
    counter: Arc<TokenCounter>,
    events: Arc<EventBus>,
    progress_sink: Arc<dyn ProgressSink>,
    progress_interval: Duration,
}

impl StreamAggregator {
    pub fn new(counter: Arc<TokenCounter>, events: Arc<EventBus>) -> Self {
        Self {
            counter,
            events,
            progress_sink: Arc::new(TracingProgressSink),
            progress_interval: PROGRESS_INTERVAL,
        }
    }

    /// Replace the progress sink (tests, custom telemetry pipelines).
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = sink;
        self
    }

    /// Override the progress emission interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Consume a partial-response stream and produce the merged result.
    ///
    /// Producer errors are recorded in the trace, published as
    /// `PlanException(plan_id, cause)`, and re-raised. Cancellation is
    /// normal termination: the partial merge is returned with
    /// `early_terminated = true` and token counts reflecting what was
    /// merged at that point.
    pub async fn aggregate(
        &self,
        mut stream: PartialStream,
        recorder: &mut TraceRecorder,
        options: &StreamOptions,
    ) -> Result<StreamingResult> {
        if options.input_token_count > 0 {
            recorder.set_input_token_count(options.input_token_count);
        }

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut metadata = serde_json::Map::new();
        let mut generation_metadata: Option<serde_json::Value> = None;
        let mut usage = Usage::default();
        let mut id = String::new();
        let mut model = String::new();
        let mut prompt_metadata: Option<serde_json::Value> = None;
        let mut rate_limit: Option<RateLimit> = None;

        let start = Instant::now();
        let mut last_progress = Instant::now();
        let mut partials_seen = 0usize;
        let mut early_terminated = false;

        loop {
            let next = match &options.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(context = %options.context_name, "Stream cancelled");
                            early_terminated = true;
                            break;
                        }
                        item = stream.recv() => item,
                    }
                }
                None => stream.recv().await,
            };

            let Some(item) = next else {
                break;
            };

            let partial = match item {
                Ok(partial) => partial,
                Err(e) => {
                    recorder.record_error(&e);
                    self.log_producer_error(&e);
                    self.events
                        .publish(RuntimeEvent::plan_exception(options.plan_id.as_str(), &e));
                    return Err(e.into());
                }
            };

            partials_seen += 1;

            if let Some(delta) = &partial.content {
                text.push_str(delta);
            }
            tool_calls.extend(partial.tool_calls);
            for (key, value) in partial.metadata {
                metadata.insert(key, value);
            }
            if partial.generation_metadata.is_some() {
                generation_metadata = partial.generation_metadata;
            }
            if let Some(reading) = partial.usage {
                if reading.prompt_tokens > 0 {
                    usage.prompt_tokens = usage.prompt_tokens.max(reading.prompt_tokens);
                }
                if reading.completion_tokens > 0 {
                    usage.completion_tokens =
                        usage.completion_tokens.max(reading.completion_tokens);
                }
                if reading.total_tokens > 0 {
                    usage.total_tokens = usage.total_tokens.max(reading.total_tokens);
                }
            }
            if !partial.id.is_empty() {
                id = partial.id;
            }
            if !partial.model.is_empty() {
                model = partial.model;
            }
            if partial.prompt_metadata.is_some() {
                prompt_metadata = partial.prompt_metadata;
            }
            if rate_limit.is_none() && partial.rate_limit.is_some() {
                rate_limit = partial.rate_limit;
            }

            if last_progress.elapsed() >= self.progress_interval {
                self.progress_sink.progress(
                    &options.context_name,
                    &progress_snapshot(&text, &tool_calls, partials_seen, start),
                );
                last_progress = Instant::now();
            }
        }

        self.progress_sink.completed(
            &options.context_name,
            &StreamCompletion {
                elapsed_ms: start.elapsed().as_millis() as u64,
                partials_seen,
                text_len: text.chars().count(),
                tool_call_count: tool_calls.len(),
                usage,
                preview: head_preview(&text, 200),
            },
        );

        let mut message = Message::assistant_with_tool_calls(text, tool_calls);
        message.metadata = metadata;

        let response = MergedResponse {
            message,
            generation_metadata,
            usage,
            id,
            model,
            prompt_metadata,
            rate_limit,
        };

        let output_token_count = self.counter.count_text(&response.message.content);
        recorder.record_response(&response);

        Ok(StreamingResult {
            response,
            early_terminated,
            input_token_count: recorder.input_token_count(),
            output_token_count,
        })
    }

    /// Text-only variant for generation tasks that carry no tool calls
    /// (e.g., summaries). Semantically identical to [`aggregate`], but
    /// returns only the merged text. Thinking-only early termination never
    /// applies here.
    ///
    /// [`aggregate`]: Self::aggregate
    pub async fn aggregate_text(
        &self,
        stream: PartialStream,
        recorder: &mut TraceRecorder,
        options: &StreamOptions,
    ) -> Result<String> {
        let result = self.aggregate(stream, recorder, options).await?;
        Ok(result.response.message.content)
    }

    fn log_producer_error(&self, err: &ProviderError) {
        match err {
            ProviderError::ApiError {
                status_code,
                body,
                url,
            } => {
                let body = if body.is_empty() { "(empty)" } else { body };
                error!(
                    status = status_code,
                    url = %url,
                    body = %body,
                    "API error during stream aggregation; full request details in the llm_requests log"
                );
            }
            other => {
                error!("Stream aggregation error: {other}");
            }
        }
    }
}

fn progress_snapshot(
    text: &str,
    tool_calls: &[windlass_core::message::MessageToolCall],
    partials_seen: usize,
    start: Instant,
) -> StreamProgress {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let text_len = text.chars().count();
    let chars_per_sec = if elapsed_ms > 0 {
        text_len as f64 * 1000.0 / elapsed_ms as f64
    } else {
        0.0
    };
    StreamProgress {
        elapsed_ms,
        partials_seen,
        text_len,
        chars_per_sec,
        tool_call_count: tool_calls.len(),
        tool_calls: describe_tool_calls(tool_calls),
        tail: tail_preview(text, 100),
    }
}
