use serde::{Deserialize, Serialize};

use super::{ChatMessage, Event, MessageType};

/// Target of an outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Recipient {
    Private { to: String },
    Stream { channel: String, topic: String },
}

/// Something a handler wants the chat service to do
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Response {
    Message { to: Recipient, content: String },
    Reaction { message_id: String, emoji: String },
}

impl Response {
    pub fn direct(to: impl Into<String>, content: impl Into<String>) -> Self {
        Response::Message {
            to: Recipient::Private { to: to.into() },
            content: content.into(),
        }
    }

    /// Answer in the same conversation as `message`
    pub fn reply(message: &ChatMessage, content: impl Into<String>) -> Self {
        let to = match (message.message_type, &message.channel) {
            (MessageType::Stream, Some(channel)) => Recipient::Stream {
                channel: channel.clone(),
                topic: message.topic.clone().unwrap_or_default(),
            },
            _ => Recipient::Private {
                to: message.sender.id.clone(),
            },
        };
        Response::Message {
            to,
            content: content.into(),
        }
    }

    /// Reply to the chat message carried by `event`, else to its `reply_to`
    pub fn reply_to_event(event: &Event, content: impl Into<String>) -> Self {
        match event.chat_message() {
            Some(msg) => Self::reply(&msg, content),
            None => Self::direct(event.reply_to.clone(), content),
        }
    }

    pub fn reaction(message: &ChatMessage, emoji: impl Into<String>) -> Self {
        Response::Reaction {
            message_id: message.id.clone(),
            emoji: emoji.into(),
        }
    }

    pub fn ok(message: &ChatMessage) -> Self {
        Self::reaction(message, "ok")
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Response::Message { content, .. } => Some(content),
            Response::Reaction { .. } => None,
        }
    }
}

/// Item yielded by a command handler before it is turned into responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Answer in the conversation of the command
    Reply(String),
    /// Private message to someone else
    Direct { to: String, content: String },
    /// React to the command message
    React(String),
    /// One step of a batch succeeded
    PartialSuccess(String),
    /// One step of a batch failed
    PartialError(String),
    Raw(Response),
}
