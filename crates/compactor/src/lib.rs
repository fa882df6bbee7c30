//! Conversation-memory compression for the Windlass runtime.
//!
//! The compactor watches a conversation's token footprint against the
//! model's context window. When it crosses the configured threshold, older
//! dialog rounds are summarized by the model into a structured
//! `<state_snapshot>` and the store is rebuilt around that summary, keeping
//! the newest rounds intact and the user/assistant alternation valid.
//!
//! - [`MemoryCompactor`] — threshold dispatch, retention selection,
//!   summarization, store rebuild
//! - [`rounds`] — grouping messages into dialog rounds
//! - [`InMemoryStore`] — the map-backed store implementation

pub mod compactor;
pub mod in_memory;
pub mod rounds;
pub mod summary;

pub use compactor::{CompactionConfig, MemoryCompactor};
pub use in_memory::InMemoryStore;
pub use rounds::{group_into_rounds, DialogRound};
pub use summary::{SUMMARY_ACK, SUMMARY_PREFIX};
