//! Conversation store trait — an ordered message list per conversation id.
//!
//! Insertion order is preserved and semantically significant: the compactor
//! rebuilds conversations by clearing and re-appending, and chat APIs
//! require the user/assistant alternation to survive that rebuild.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::Message;

/// Mapping from conversation id to an ordered sequence of messages.
///
/// Implementations may be in-memory or persistent. Ownership is per
/// conversation id; callers that compact a conversation must serialize
/// those calls per id themselves.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Get all messages for a conversation, in insertion order.
    /// Unknown ids yield an empty list.
    async fn get(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Append a message to a conversation, creating it if absent.
    async fn append(&self, conversation_id: &str, message: Message) -> Result<(), StoreError>;

    /// Remove all messages for a conversation.
    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError>;
}
