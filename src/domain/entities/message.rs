use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;

/// Where a chat message was posted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Private,
    Stream,
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Private => "private",
            MessageType::Stream => "stream",
        }
    }
}

/// A chat message as carried in the payload of a `message` domain event
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: User,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub content: String,
    /// Set by command detection: the addressed command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_name: Option<String>,
    /// Set by command detection: the command line after the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: User, message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            message_type,
            channel: None,
            topic: None,
            content: content.into(),
            command_name: None,
            command: None,
            timestamp: Utc::now(),
        }
    }

    pub fn private(sender: User, content: impl Into<String>) -> Self {
        Self::new(sender, MessageType::Private, content)
    }

    pub fn stream(
        sender: User,
        channel: impl Into<String>,
        topic: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(sender, MessageType::Stream, content);
        msg.channel = Some(channel.into());
        msg.topic = Some(topic.into());
        msg
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_private(&self) -> bool {
        self.message_type == MessageType::Private
    }

    pub fn is_command(&self) -> bool {
        self.command_name.is_some()
    }
}
