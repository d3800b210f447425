//! Domain event system — observe tasks and sessions without coupling to them.
//!
//! The agent loop and the dispatcher publish events as they work; the CLI
//! (or anything else) may subscribe and render them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use crate::memory::MemorySource;
use crate::task::TerminalState;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A task started running
    TaskStarted {
        task_id: String,
        request_preview: String,
        step_budget: u32,
        timestamp: DateTime<Utc>,
    },

    /// One loop iteration finished and wrote a memory item
    StepCompleted {
        task_id: String,
        step: u32,
        source: MemorySource,
        timestamp: DateTime<Utc>,
    },

    /// A tool call was dispatched to a session
    ToolDispatched {
        tool_name: String,
        session: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A session left the registry
    SessionClosed {
        session: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A task reached a terminal state
    TaskFinished {
        task_id: String,
        state: TerminalState,
        steps: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolDispatched {
            tool_name: "add".into(),
            session: "math".into(),
            success: true,
            duration_ms: 3,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolDispatched { tool_name, session, .. } => {
                assert_eq!(tool_name, "add");
                assert_eq!(session, "math");
            }
            _ => panic!("Expected ToolDispatched event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::SessionClosed {
            session: "gmail".into(),
            reason: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
