//! In-memory conversation store — useful for testing and ephemeral
//! sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use windlass_core::error::StoreError;
use windlass_core::message::Message;
use windlass_core::store::ConversationStore;

/// A conversation store backed by a map in process memory. Conversations
/// live until cleared or the process exits.
pub struct InMemoryStore {
    conversations: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn append(&self, conversation_id: &str, message: Message) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        conversations.remove(conversation_id);
        Ok(())
    }
}
