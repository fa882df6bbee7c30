//! Grouping messages into dialog rounds.
//!
//! A dialog round is a contiguous group of messages forming one
//! request/response cycle. Three admissible shapes:
//!
//! 1. `User → Assistant → Tool` (complete round with tool call)
//! 2. `User → Assistant` (round without tool call)
//! 3. `Assistant → Tool` (agent-internal round with no user turn)
//!
//! A round terminates on a tool response or on the next message that
//! cannot extend it. Rounds exist only for the duration of a compaction
//! call; they are never persisted.

use windlass_core::message::{Message, Role};
use windlass_tokens::TokenCounter;

/// A contiguous group of messages forming one request/response cycle.
#[derive(Debug, Clone)]
pub struct DialogRound {
    messages: Vec<Message>,
}

impl DialogRound {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn has_user(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    /// Messages of this round, in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consume the round, yielding its messages.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Size of the round: token count of its serialized JSON.
    pub fn token_size(&self, counter: &TokenCounter) -> usize {
        counter.count_messages(&self.messages)
    }
}

/// Walk a message list front to back and group it into dialog rounds.
///
/// `User` finalizes any open round and starts a new one. `Assistant`
/// extends a round that already holds a user turn, otherwise starts its
/// own. A tool response completes the current round (creating one if
/// absent). Other kinds extend an open round and are dropped when none
/// exists. A trailing open round is finalized.
pub fn group_into_rounds(messages: &[Message]) -> Vec<DialogRound> {
    let mut rounds = Vec::new();
    let mut current: Option<DialogRound> = None;

    for message in messages {
        match message.role {
            Role::User => {
                if let Some(round) = current.take() {
                    rounds.push(round);
                }
                let mut round = DialogRound::new();
                round.push(message.clone());
                current = Some(round);
            }
            Role::Assistant => {
                if let Some(round) = current.as_mut().filter(|round| round.has_user()) {
                    // May complete here or stay open awaiting a tool response
                    round.push(message.clone());
                } else {
                    if let Some(round) = current.take() {
                        rounds.push(round);
                    }
                    let mut round = DialogRound::new();
                    round.push(message.clone());
                    current = Some(round);
                }
            }
            Role::Tool => {
                let mut round = current.take().unwrap_or_else(DialogRound::new);
                round.push(message.clone());
                rounds.push(round);
            }
            _ => {
                if let Some(round) = current.as_mut() {
                    round.push(message.clone());
                }
            }
        }
    }

    if let Some(round) = current.take() {
        rounds.push(round);
    }

    rounds
}
