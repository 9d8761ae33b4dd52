//! Agent event bus.
//!
//! A `tokio::sync::broadcast` channel carrying [`AgentEvent`] values. The
//! host (or the CLI) subscribes to see manual request results and poll
//! completions. With no subscribers, events are dropped.

use crate::executor::RequestResult;
use crate::response::OutcomeState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Name under which manual request results are published to the host.
pub const RESPONSE_EVENT: &str = "http_agent_response";

/// Every event the agent emits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// A manually triggered request finished.
    Response {
        service: String,
        data: Map<String, Value>,
        result: RequestResult,
    },
    /// A scheduled poll finished.
    PollCompleted {
        endpoint: String,
        state: OutcomeState,
        status_code: Option<u16>,
        elapsed_ms: u64,
    },
}

impl AgentEvent {
    /// Host-facing event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Response { .. } => RESPONSE_EVENT,
            Self::PollCompleted { .. } => "http_agent_poll_completed",
        }
    }
}

/// Broadcast bus shared by one endpoint instance.
pub struct EventBus {
    sender: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: AgentEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
