//! Conversation-memory compression.
//!
//! When a conversation approaches the model's context window, older dialog
//! rounds are summarized via the model into a structured snapshot and the
//! store is rebuilt as: summary user message, synthetic assistant
//! acknowledgement, then the preserved rounds in chronological order.
//!
//! Compaction is not concurrency-safe across overlapping callers on the
//! same conversation id; callers serialize per id.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use windlass_core::error::{Error, Result};
use windlass_core::event::{EventBus, RuntimeEvent};
use windlass_core::message::{Message, COMPRESSION_SUMMARY_KEY};
use windlass_core::provider::{ChatRequest, ModelProvider};
use windlass_core::store::ConversationStore;
use windlass_stream::{StreamAggregator, StreamOptions, TraceRecorder};
use windlass_tokens::{LimitTable, TokenCounter};

use crate::rounds::{group_into_rounds, DialogRound};
use crate::summary::{build_summary_prompt, SUMMARY_ACK, SUMMARY_PREFIX, SUMMARY_SYSTEM_PROMPT};

/// Compaction tuning knobs.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Fraction of the context limit at which proactive compaction fires.
    pub threshold: f64,

    /// Fraction of accumulated tokens retained after compaction.
    pub retention_ratio: f64,

    /// Model used both for limit lookup and for the summarization call.
    pub model: String,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            retention_ratio: 0.3,
            model: "qwen3-coder-plus".into(),
        }
    }
}

impl CompactionConfig {
    /// Derive compaction knobs from the runtime configuration.
    pub fn from_runtime(config: &windlass_config::RuntimeConfig) -> Self {
        Self {
            threshold: config.chat_compression_threshold,
            retention_ratio: config.chat_compression_retention_ratio,
            model: config.default_model.clone(),
        }
    }
}

/// Which rounds survive a compaction and which get folded into a summary.
struct CompactionPlan {
    to_keep: Vec<DialogRound>,
    to_summarize: Vec<DialogRound>,
    kept_tokens: usize,
    total_tokens: usize,
}

impl CompactionPlan {
    fn retention_pct(&self) -> f64 {
        if self.total_tokens == 0 {
            return 0.0;
        }
        self.kept_tokens as f64 * 100.0 / self.total_tokens as f64
    }
}

/// Compresses conversation memory by summarizing older dialog rounds.
pub struct MemoryCompactor {
    provider: Arc<dyn ModelProvider>,
    aggregator: StreamAggregator,
    counter: Arc<TokenCounter>,
    limits: Arc<LimitTable>,
    events: Arc<EventBus>,
    config: CompactionConfig,
}

impl MemoryCompactor {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        counter: Arc<TokenCounter>,
        limits: Arc<LimitTable>,
        events: Arc<EventBus>,
        config: CompactionConfig,
    ) -> Self {
        let aggregator = StreamAggregator::new(counter.clone(), events.clone());
        Self {
            provider,
            aggregator,
            counter,
            limits,
            events,
            config,
        }
    }

    /// Check a conversation against the compression threshold and compact
    /// it when exceeded. Failures are logged; the store is left untouched.
    pub async fn maybe_compact(&self, store: &dyn ConversationStore, conversation_id: &str) {
        if conversation_id.trim().is_empty() {
            return;
        }

        if let Err(e) = self.check_and_compact(store, conversation_id).await {
            warn!(
                conversation_id,
                "Failed to check and limit conversation memory: {e}"
            );
        }
    }

    async fn check_and_compact(
        &self,
        store: &dyn ConversationStore,
        conversation_id: &str,
    ) -> Result<()> {
        let messages = store.get(conversation_id).await?;
        if messages.is_empty() {
            return Ok(());
        }

        let total_tokens = self.counter.count_messages(&messages);
        let context_limit = self.limits.context_limit(&self.config.model);
        let threshold_tokens = (context_limit as f64 * self.config.threshold) as usize;

        if total_tokens <= threshold_tokens {
            debug!(
                conversation_id,
                total_tokens, threshold_tokens, "Conversation within compression threshold"
            );
            return Ok(());
        }

        info!(
            conversation_id,
            total_tokens,
            threshold_tokens,
            context_limit,
            "Conversation exceeds compression threshold, summarizing older rounds"
        );
        self.compact_into_store(store, conversation_id, messages)
            .await
    }

    /// Compact a conversation regardless of its size. Failures are logged;
    /// the store is left untouched.
    pub async fn force_compact(&self, store: &dyn ConversationStore, conversation_id: &str) {
        if conversation_id.trim().is_empty() {
            return;
        }

        let messages = match store.get(conversation_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(conversation_id, "Failed to read conversation: {e}");
                return;
            }
        };
        if messages.is_empty() {
            debug!(conversation_id, "No messages, skipping forced compaction");
            return;
        }

        info!(
            conversation_id,
            message_count = messages.len(),
            "Force compacting conversation memory"
        );
        if let Err(e) = self.compact_into_store(store, conversation_id, messages).await {
            warn!(conversation_id, "Failed to force compact conversation: {e}");
        }
    }

    /// Check the combined size of the stored conversation plus a scratch
    /// message list against the model's context limit. When it exceeds the
    /// limit, force-compact the store first, then compact and return the
    /// scratch list. Otherwise the list is returned unchanged.
    pub async fn compact_if_combined_exceeds(
        &self,
        store: &dyn ConversationStore,
        conversation_id: &str,
        agent_messages: Vec<Message>,
    ) -> Result<Vec<Message>> {
        let store_messages = if conversation_id.trim().is_empty() {
            Vec::new()
        } else {
            match store.get(conversation_id).await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(conversation_id, "Failed to read conversation: {e}");
                    Vec::new()
                }
            }
        };

        let mut combined = store_messages.clone();
        combined.extend(agent_messages.iter().cloned());

        let total_tokens = self.counter.count_messages(&combined);
        let context_limit = self.limits.context_limit(&self.config.model);

        if total_tokens <= context_limit {
            debug!(
                total_tokens,
                context_limit, "Combined memory within limit, no compression needed"
            );
            return Ok(agent_messages);
        }

        info!(
            total_tokens,
            context_limit, "Combined memory exceeds limit, force compacting both sides"
        );

        if !store_messages.is_empty() {
            self.force_compact(store, conversation_id).await;
        }

        if agent_messages.is_empty() {
            return Ok(agent_messages);
        }
        self.force_compact_agent(agent_messages).await
    }

    /// Compact a free-standing message list (the agent's scratch memory).
    ///
    /// Unlike the store-mutating paths, summarization failures propagate
    /// here so the caller can choose to retry without compression.
    pub async fn force_compact_agent(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        if messages.is_empty() {
            debug!("No messages, skipping forced agent compaction");
            return Ok(messages);
        }

        info!(
            message_count = messages.len(),
            "Force compacting agent memory"
        );

        let Some(plan) = self.plan_compaction(&messages) else {
            return Ok(messages);
        };
        if plan.to_summarize.is_empty() {
            debug!("No older rounds to summarize, keeping agent memory as-is");
            return Ok(messages);
        }

        let Some(summary) = self.summarize_rounds(&plan.to_summarize, "agent-memory").await?
        else {
            return Ok(messages);
        };

        info!(
            kept_rounds = plan.to_keep.len(),
            summarized_rounds = plan.to_summarize.len(),
            kept_tokens = plan.kept_tokens,
            retention_pct = format!("{:.1}", plan.retention_pct()),
            "Agent memory compaction completed"
        );

        let mut compressed = Vec::with_capacity(plan.to_keep.len() * 3 + 2);
        compressed.push(summary);
        compressed.push(Message::assistant(SUMMARY_ACK));
        for round in plan.to_keep {
            compressed.extend(round.into_messages());
        }

        Ok(compressed)
    }

    /// Summarize, then rebuild the store. The summary is produced before
    /// the first mutation so a failed summarization leaves the
    /// conversation untouched.
    async fn compact_into_store(
        &self,
        store: &dyn ConversationStore,
        conversation_id: &str,
        messages: Vec<Message>,
    ) -> Result<()> {
        let Some(plan) = self.plan_compaction(&messages) else {
            return Ok(());
        };
        if plan.to_summarize.is_empty() {
            debug!(
                conversation_id,
                "No older rounds to summarize, leaving conversation as-is"
            );
            return Ok(());
        }

        let Some(summary) = self
            .summarize_rounds(&plan.to_summarize, conversation_id)
            .await?
        else {
            return Ok(());
        };

        store.clear(conversation_id).await?;
        store.append(conversation_id, summary).await?;
        store
            .append(conversation_id, Message::assistant(SUMMARY_ACK))
            .await?;
        for round in &plan.to_keep {
            for message in round.messages() {
                store.append(conversation_id, message.clone()).await?;
            }
        }

        self.events.publish(RuntimeEvent::MemoryCompacted {
            conversation_id: conversation_id.to_string(),
            rounds_kept: plan.to_keep.len(),
            rounds_summarized: plan.to_summarize.len(),
            at: chrono::Utc::now(),
        });
        info!(
            conversation_id,
            kept_rounds = plan.to_keep.len(),
            summarized_rounds = plan.to_summarize.len(),
            kept_tokens = plan.kept_tokens,
            retention_pct = format!("{:.1}", plan.retention_pct()),
            "Compaction completed"
        );
        Ok(())
    }

    /// Split rounds into a keep set and a summarize set.
    ///
    /// Rounds are walked newest to oldest, greedily kept while the
    /// cumulative size stays within `retention_ratio × total`. The newest
    /// round is always kept regardless of size, and kept rounds come back
    /// in chronological order. Returns `None` when everything should be
    /// kept (no rounds, or totals too small to matter).
    fn plan_compaction(&self, messages: &[Message]) -> Option<CompactionPlan> {
        let mut rounds = group_into_rounds(messages);
        if rounds.is_empty() {
            warn!("No dialog rounds found");
            return None;
        }

        let sizes: Vec<usize> = rounds
            .iter()
            .map(|round| round.token_size(&self.counter))
            .collect();
        let total_tokens: usize = sizes.iter().sum();
        let target = (total_tokens as f64 * self.config.retention_ratio) as usize;

        if total_tokens == 0 || target == 0 {
            debug!(total_tokens, "Total too small, keeping all rounds");
            return None;
        }

        // Newest round is always kept; older rounds join while they fit.
        let newest = rounds.len() - 1;
        let mut first_kept = newest;
        let mut kept_tokens = sizes[newest];
        for i in (0..newest).rev() {
            if kept_tokens + sizes[i] <= target {
                kept_tokens += sizes[i];
                first_kept = i;
            } else {
                break;
            }
        }

        let to_keep = rounds.split_off(first_kept);
        Some(CompactionPlan {
            to_keep,
            to_summarize: rounds,
            kept_tokens,
            total_tokens,
        })
    }

    /// Summarize the given rounds into a single user message carrying the
    /// `compression_summary` metadata marker.
    ///
    /// Returns `Ok(None)` when the rounds cannot be serialized for the
    /// summarization prompt; that failure is logged and contained, never
    /// surfaced to callers.
    async fn summarize_rounds(
        &self,
        rounds: &[DialogRound],
        plan_id: &str,
    ) -> Result<Option<Message>> {
        let all_messages: Vec<Message> = rounds
            .iter()
            .flat_map(|round| round.messages().iter().cloned())
            .collect();
        let conversation_history = match serde_json::to_string(&all_messages) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize dialog rounds for summarization: {e}");
                return Ok(None);
            }
        };

        let request = ChatRequest::new(
            &self.config.model,
            vec![
                Message::system(SUMMARY_SYSTEM_PROMPT),
                Message::user(build_summary_prompt(&conversation_history)),
            ],
        );
        let input_tokens = self.counter.count_messages(&request.messages);

        let mut recorder = TraceRecorder::new(self.counter.clone());
        recorder.record_request(&request);

        let stream = self.provider.stream(request).await?;
        let options = StreamOptions::new("Memory compression", plan_id)
            .with_input_token_count(input_tokens);
        let summary = self
            .aggregator
            .aggregate_text(stream, &mut recorder, &options)
            .await?;

        if summary.trim().is_empty() {
            return Err(Error::Summarization(
                "model returned no usable summary text".into(),
            ));
        }

        Ok(Some(
            Message::user(format!("{SUMMARY_PREFIX}{summary}"))
                .with_metadata(COMPRESSION_SUMMARY_KEY, json!(true)),
        ))
    }
}
