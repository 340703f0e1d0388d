//! Per-session event bus — in-process fan-out of agent events to any
//! number of live subscribers (SSE streams, test harnesses).
//!
//! No backlog retention: an event emitted while nobody is subscribed is
//! lost, and a late joiner never sees prior events. The emitter never
//! blocks; a subscriber that falls behind the channel capacity observes
//! a lag and resumes at the oldest retained event.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Events published during an agent turn. Payloads are opaque to the bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// A turn has opened.
    #[serde(rename = "start")]
    Start,

    /// Incremental assistant text.
    #[serde(rename = "delta")]
    Delta { content: String },

    /// Tool invocations scheduled this step.
    #[serde(rename = "tool_calls")]
    ToolCalls { tool_calls: Vec<ToolCallInfo> },

    /// Their results.
    #[serde(rename = "tool_results")]
    ToolResults { tool_results: Vec<ToolResultInfo> },

    /// The final full assistant text.
    #[serde(rename = "done")]
    Done { content: String },

    /// Subscriber hello, emitted by the transport layer.
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallInfo {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResultInfo {
    pub id: String,
    pub name: String,
    pub result: String,
}

/// Fan-out keyed by session id.
#[derive(Default)]
pub struct EventBus {
    channels: RwLock<HashMap<String, broadcast::Sender<AgentEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a session's events. The channel is created on demand.
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<AgentEvent> {
        let mut channels = self.channels.write();
        let tx = channels
            .entry(session_id.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        tx.subscribe()
    }

    /// Deliver an event to every current subscriber of the session.
    /// Never blocks; with no subscribers the event is dropped.
    pub fn emit(&self, session_id: &str, event: AgentEvent) {
        let channels = self.channels.read();
        if let Some(tx) = channels.get(session_id) {
            // A send error just means nobody is listening right now.
            let _ = tx.send(event);
        }
    }

    /// Number of live subscribers for a session (diagnostics and tests).
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.channels
            .read()
            .get(session_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}
