//! Runtime event system — decoupled notification of streaming and
//! compression outcomes.
//!
//! Events are published when something interesting happens; other components
//! subscribe and react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All runtime events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuntimeEvent {
    /// Stream aggregation failed for a plan.
    PlanException {
        plan_id: String,
        error: String,
        at: DateTime<Utc>,
    },

    /// A conversation was compacted.
    MemoryCompacted {
        conversation_id: String,
        rounds_kept: usize,
        rounds_summarized: usize,
        at: DateTime<Utc>,
    },
}

impl RuntimeEvent {
    /// Build a `PlanException` from any displayable cause.
    pub fn plan_exception(plan_id: impl Into<String>, cause: &dyn std::fmt::Display) -> Self {
        Self::PlanException {
            plan_id: plan_id.into(),
            error: cause.to_string(),
            at: Utc::now(),
        }
    }
}

/// A broadcast-based event bus for runtime events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Components
/// subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<RuntimeEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: RuntimeEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RuntimeEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
