//! End-to-end compaction tests: threshold dispatch, retention selection,
//! store rebuild, and failure containment, driven through a scripted
//! model provider.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use windlass_compactor::{CompactionConfig, InMemoryStore, MemoryCompactor, SUMMARY_ACK};
use windlass_core::error::ProviderError;
use windlass_core::event::{EventBus, RuntimeEvent};
use windlass_core::message::{Message, Role};
use windlass_core::provider::{ChatRequest, ModelProvider, PartialResponse, PartialStream};
use windlass_core::store::ConversationStore;
use windlass_tokens::{LimitTable, ModelLimits, TokenCounter};

const SNAPSHOT: &str = "<state_snapshot>\n<key_knowledge>repo uses cargo</key_knowledge>\n\
<previous_actions_summary>explored the workspace</previous_actions_summary>\n\
<recent_actions>ran the test suite</recent_actions>\n\
<current_plan>1. [DONE] explore 2. [IN PROGRESS] fix tests</current_plan>\n\
</state_snapshot>";

/// Provider that streams a fixed summary for every request.
struct ScriptedProvider {
    summary: String,
}

impl ScriptedProvider {
    fn snapshot() -> Arc<Self> {
        Arc::new(Self {
            summary: SNAPSHOT.into(),
        })
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, _request: ChatRequest) -> Result<PartialStream, ProviderError> {
        let (tx, rx) = mpsc::channel(4);
        let summary = self.summary.clone();
        tokio::spawn(async move {
            let _ = tx.send(Ok(PartialResponse::text(summary))).await;
        });
        Ok(rx)
    }
}

/// Provider whose stream call always fails.
struct FailingProvider;

#[async_trait]
impl ModelProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn stream(&self, _request: ChatRequest) -> Result<PartialStream, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

fn compactor(
    provider: Arc<dyn ModelProvider>,
    context_limit: usize,
    threshold: f64,
    retention_ratio: f64,
) -> (MemoryCompactor, Arc<EventBus>) {
    let counter = Arc::new(TokenCounter::new());
    let limits = Arc::new(LimitTable::with_fallback(ModelLimits::new(
        context_limit,
        context_limit / 2,
    )));
    let events = Arc::new(EventBus::default());
    let config = CompactionConfig {
        threshold,
        retention_ratio,
        // Unknown name resolves to the fallback limits above
        model: "test-model".into(),
    };
    let compactor = MemoryCompactor::new(provider, counter, limits, events.clone(), config);
    (compactor, events)
}

/// Fill a store with `rounds` user/assistant rounds of roughly equal size.
async fn seed_rounds(store: &InMemoryStore, cid: &str, rounds: usize, content_len: usize) {
    for i in 0..rounds {
        store
            .append(cid, Message::user(format!("question {i}: {}", "x".repeat(content_len))))
            .await
            .unwrap();
        store
            .append(
                cid,
                Message::assistant(format!("answer {i}: {}", "y".repeat(content_len))),
            )
            .await
            .unwrap();
    }
}

async fn total_tokens(store: &InMemoryStore, cid: &str) -> usize {
    let counter = TokenCounter::new();
    counter.count_messages(&store.get(cid).await.unwrap())
}

#[tokio::test]
async fn below_threshold_is_a_noop() {
    let store = InMemoryStore::new();
    seed_rounds(&store, "c1", 2, 100).await;
    let before = store.get("c1").await.unwrap();

    let (compactor, _) = compactor(ScriptedProvider::snapshot(), 1_000_000, 0.7, 0.3);
    compactor.maybe_compact(&store, "c1").await;

    assert_eq!(store.get("c1").await.unwrap(), before);
}

#[tokio::test]
async fn compaction_rebuilds_store_with_summary_and_ack() {
    let store = InMemoryStore::new();
    seed_rounds(&store, "c1", 10, 400).await;
    let before = store.get("c1").await.unwrap();
    let total = total_tokens(&store, "c1").await;

    // Threshold 0.7 of the total means the conversation is over budget
    let (compactor, _) = compactor(ScriptedProvider::snapshot(), total, 0.7, 0.35);
    compactor.maybe_compact(&store, "c1").await;

    let after = store.get("c1").await.unwrap();
    assert!(after.len() < before.len());

    // Summary user message first, marked as a compression summary
    assert_eq!(after[0].role, Role::User);
    assert!(after[0].is_compression_summary());
    assert!(after[0].content.contains("<state_snapshot>"));
    assert!(after[0].content.starts_with("The following content is a brief summary"));

    // Synthetic acknowledgement second
    assert_eq!(after[1].role, Role::Assistant);
    assert_eq!(after[1].content, SUMMARY_ACK);

    // With 10 equal rounds and 35% retention, the 3 newest survive
    let preserved = &after[2..];
    assert_eq!(preserved.len(), 6);
    let expected: Vec<&str> = before[before.len() - 6..]
        .iter()
        .map(|m| m.id.as_str())
        .collect();
    let actual: Vec<&str> = preserved.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(actual, expected, "preserved rounds must be the newest, in order");
}

#[tokio::test]
async fn retention_bound_holds_after_compaction() {
    let store = InMemoryStore::new();
    seed_rounds(&store, "c1", 10, 400).await;
    let total_before = total_tokens(&store, "c1").await;

    let (compactor, _) = compactor(ScriptedProvider::snapshot(), total_before, 0.7, 0.35);
    compactor.maybe_compact(&store, "c1").await;

    let after = store.get("c1").await.unwrap();
    let counter = TokenCounter::new();
    let preserved_tokens = counter.count_messages(&after[2..]);
    let bound = (0.35 * total_before as f64).ceil() as usize;
    assert!(
        preserved_tokens <= bound,
        "preserved {preserved_tokens} tokens exceeds bound {bound}"
    );
}

#[tokio::test]
async fn single_oversized_round_is_kept_without_summary() {
    let store = InMemoryStore::new();
    seed_rounds(&store, "c1", 1, 20_000).await;
    let before = store.get("c1").await.unwrap();

    // Way over the limit, but there is only one round and nothing older
    let (compactor, _) = compactor(ScriptedProvider::snapshot(), 1_000, 0.7, 0.3);
    compactor.maybe_compact(&store, "c1").await;

    let after = store.get("c1").await.unwrap();
    assert_eq!(after, before);
    assert!(!after.iter().any(|m| m.is_compression_summary()));
}

#[tokio::test]
async fn summarization_failure_leaves_store_untouched() {
    let store = InMemoryStore::new();
    seed_rounds(&store, "c1", 10, 400).await;
    let before = store.get("c1").await.unwrap();

    let (compactor, _) = compactor(Arc::new(FailingProvider), 1_000, 0.7, 0.3);
    compactor.maybe_compact(&store, "c1").await;
    compactor.force_compact(&store, "c1").await;

    assert_eq!(store.get("c1").await.unwrap(), before);
}

#[tokio::test]
async fn blank_summary_counts_as_failure() {
    let store = InMemoryStore::new();
    seed_rounds(&store, "c1", 10, 400).await;
    let before = store.get("c1").await.unwrap();

    let blank = Arc::new(ScriptedProvider {
        summary: "   \n".into(),
    });
    let (compactor, _) = compactor(blank, 1_000, 0.7, 0.3);
    compactor.force_compact(&store, "c1").await;

    assert_eq!(store.get("c1").await.unwrap(), before);
}

#[tokio::test]
async fn force_compact_fires_regardless_of_size() {
    let store = InMemoryStore::new();
    seed_rounds(&store, "c1", 6, 300).await;

    // Huge limit: maybe_compact would be a no-op, force_compact is not
    let (compactor, _) = compactor(ScriptedProvider::snapshot(), 100_000_000, 0.7, 0.3);
    compactor.force_compact(&store, "c1").await;

    let after = store.get("c1").await.unwrap();
    assert!(after[0].is_compression_summary());
    assert_eq!(after[1].content, SUMMARY_ACK);
}

#[tokio::test]
async fn compaction_publishes_memory_compacted_event() {
    let store = InMemoryStore::new();
    seed_rounds(&store, "c9", 8, 800).await;

    let (compactor, events) = compactor(ScriptedProvider::snapshot(), 1_000, 0.7, 0.3);
    let mut rx = events.subscribe();
    compactor.maybe_compact(&store, "c9").await;

    let event = rx.recv().await.unwrap();
    match event.as_ref() {
        RuntimeEvent::MemoryCompacted {
            conversation_id,
            rounds_kept,
            rounds_summarized,
            ..
        } => {
            assert_eq!(conversation_id, "c9");
            assert!(*rounds_kept >= 1);
            assert!(*rounds_summarized >= 1);
        }
        other => panic!("Expected MemoryCompacted, got {other:?}"),
    }
}

#[tokio::test]
async fn combined_within_limit_returns_agent_messages_unchanged() {
    let store = InMemoryStore::new();
    seed_rounds(&store, "c1", 2, 100).await;

    let agent_messages = vec![
        Message::assistant("working on it"),
        Message::tool_response("tool output"),
    ];
    let ids: Vec<String> = agent_messages.iter().map(|m| m.id.clone()).collect();

    let (compactor, _) = compactor(ScriptedProvider::snapshot(), 1_000_000, 0.7, 0.3);
    let result = compactor
        .compact_if_combined_exceeds(&store, "c1", agent_messages)
        .await
        .unwrap();

    let result_ids: Vec<String> = result.iter().map(|m| m.id.clone()).collect();
    assert_eq!(result_ids, ids);
    // Store untouched as well
    assert_eq!(store.get("c1").await.unwrap().len(), 4);
}

#[tokio::test]
async fn combined_over_limit_compacts_store_and_agent_memory() {
    let store = InMemoryStore::new();
    seed_rounds(&store, "c1", 8, 400).await;

    // Agent scratch memory: assistant → tool rounds
    let mut agent_messages = Vec::new();
    for i in 0..8 {
        agent_messages.push(Message::assistant(format!(
            "step {i}: {}",
            "z".repeat(400)
        )));
        agent_messages.push(Message::tool_response(format!(
            "result {i}: {}",
            "w".repeat(400)
        )));
    }

    let (compactor, _) = compactor(ScriptedProvider::snapshot(), 1_000, 0.7, 0.3);
    let result = compactor
        .compact_if_combined_exceeds(&store, "c1", agent_messages)
        .await
        .unwrap();

    // Agent list compacted: summary + ack + newest round(s)
    assert!(result[0].is_compression_summary());
    assert_eq!(result[1].content, SUMMARY_ACK);
    assert!(result.len() < 16);

    // Store compacted too
    let stored = store.get("c1").await.unwrap();
    assert!(stored[0].is_compression_summary());
    assert_eq!(stored[1].content, SUMMARY_ACK);
}

#[tokio::test]
async fn force_compact_agent_propagates_summarization_failure() {
    let mut agent_messages = Vec::new();
    for i in 0..8 {
        agent_messages.push(Message::assistant(format!("step {i}: {}", "z".repeat(400))));
        agent_messages.push(Message::tool_response(format!("result {i}")));
    }

    let (compactor, _) = compactor(Arc::new(FailingProvider), 1_000, 0.7, 0.3);
    let result = compactor.force_compact_agent(agent_messages).await;
    assert!(result.is_err());
}

#[test]
fn compaction_config_follows_runtime_config() {
    let runtime = windlass_config::RuntimeConfig {
        chat_compression_threshold: 0.6,
        chat_compression_retention_ratio: 0.25,
        default_model: "gpt-4o".into(),
        ..Default::default()
    };
    let config = CompactionConfig::from_runtime(&runtime);
    assert!((config.threshold - 0.6).abs() < f64::EPSILON);
    assert!((config.retention_ratio - 0.25).abs() < f64::EPSILON);
    assert_eq!(config.model, "gpt-4o");
}

#[tokio::test]
async fn empty_conversation_id_is_ignored() {
    let store = InMemoryStore::new();
    let (compactor, _) = compactor(ScriptedProvider::snapshot(), 1_000, 0.7, 0.3);
    // Must not panic or touch anything
    compactor.maybe_compact(&store, "").await;
    compactor.force_compact(&store, "  ").await;
}
