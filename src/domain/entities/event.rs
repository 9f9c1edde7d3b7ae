use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ChatMessage;

/// Sender id used for events coming from the remote event source
pub const ROOT_SENDER: &str = "_root";

/// Kind of an event on the inbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Opaque event from the chat service or a plugin
    Domain,
    /// Load the destination plugin
    Start,
    /// Stop the runtime, or unload the destination plugin
    Stop,
    /// Stop the runtime and ask the host to re-exec
    Restart,
    /// Reconstruct the destination plugin, or all plugins
    Reload,
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Domain => "domain",
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::Restart => "restart",
            EventKind::Reload => "reload",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of work consumed by the dispatch loop
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Event {
    pub id: String,
    pub sender: String,
    pub kind: EventKind,
    pub payload: Value,
    /// `None` broadcasts to every responsible plugin
    pub destination: Option<String>,
    pub reply_to: String,
    /// Pending exchange this event answers, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(sender: impl Into<String>, kind: EventKind, payload: Value) -> Self {
        let sender = sender.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reply_to: sender.clone(),
            sender,
            kind,
            payload,
            destination: None,
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn domain(sender: impl Into<String>, payload: Value) -> Self {
        Self::new(sender, EventKind::Domain, payload)
    }

    /// A `message` domain event; replies go to the message author
    pub fn message(sender: impl Into<String>, message: &ChatMessage) -> Self {
        let payload = json!({
            "type": "message",
            "message": message,
        });
        Self::domain(sender, payload).with_reply_to(message.sender.id.clone())
    }

    pub fn stop(sender: impl Into<String>) -> Self {
        Self::new(sender, EventKind::Stop, Value::Null)
    }

    pub fn restart(sender: impl Into<String>) -> Self {
        Self::new(sender, EventKind::Restart, Value::Null)
    }

    pub fn reload(sender: impl Into<String>) -> Self {
        Self::new(sender, EventKind::Reload, Value::Null)
    }

    pub fn start(sender: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self::new(sender, EventKind::Start, Value::Null).with_destination(plugin)
    }

    pub fn with_destination(mut self, plugin: impl Into<String>) -> Self {
        self.destination = Some(plugin.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = reply_to.into();
        self
    }

    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// The `type` field of a domain payload, e.g. `message`
    pub fn domain_type(&self) -> Option<&str> {
        if self.kind != EventKind::Domain {
            return None;
        }
        self.payload.get("type").and_then(Value::as_str)
    }

    pub fn message_payload(&self) -> Option<&Value> {
        self.payload.get("message")
    }

    /// Typed view of a `message` payload
    pub fn chat_message(&self) -> Option<ChatMessage> {
        if self.domain_type() != Some("message") {
            return None;
        }
        self.message_payload()
            .and_then(|m| serde_json::from_value(m.clone()).ok())
    }

    /// Command name set by command detection
    pub fn command_name(&self) -> Option<&str> {
        self.message_payload()
            .and_then(|m| m.get("command_name"))
            .and_then(Value::as_str)
    }

    pub fn command_text(&self) -> Option<&str> {
        self.message_payload()
            .and_then(|m| m.get("command"))
            .and_then(Value::as_str)
    }

    /// Whether the destination allows delivery to `plugin`
    pub fn is_addressed_to(&self, plugin: &str) -> bool {
        self.destination.as_deref().map_or(true, |d| d == plugin)
    }
}
