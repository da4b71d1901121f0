//! Fire-and-forget run observability.
//!
//! The agent loop publishes an event at run start, after every provider
//! round-trip, after every tool invocation and at run end. Subscribers
//! (tracing exporters, evaluation harnesses, UIs) react without the loop
//! knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A run was seeded and is about to call the provider
    RunStarted {
        run_id: String,
        model: String,
        max_iterations: u32,
        tool_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One provider call completed (successfully or not)
    ProviderRoundTrip {
        run_id: String,
        round: u32,
        attempt: u32,
        transcript_len: usize,
        /// "final_answer", "tool_calls" or "error"
        outcome: String,
        tool_calls: usize,
        tokens_used: Option<u32>,
        error: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        run_id: String,
        round: u32,
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
        success: bool,
        message: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A run reached a terminal state
    RunFinished {
        run_id: String,
        /// "done" or the failure label
        status: String,
        iterations: u32,
        transcript_len: usize,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::ProviderRoundTrip { run_id, .. }
            | Self::ToolExecuted { run_id, .. }
            | Self::RunFinished { run_id, .. } => run_id,
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Publishing never blocks and never fails the publisher; slow subscribers
/// lag and lose events instead.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
