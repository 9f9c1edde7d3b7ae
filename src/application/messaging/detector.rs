//! Command detection - Marks message events that address the bot
//!
//! A message is a command when it was not sent by the bot itself and is
//! either a private message or starts with the bot mention or the
//! command prefix. The detector writes `command_name` (first word) and
//! `command` (rest of the line) into the message payload.

use serde_json::Value;
use tracing::debug;

use crate::domain::entities::{Event, MessageType};

/// Claims message events as commands
#[derive(Debug, Clone)]
pub struct CommandDetector {
    bot_id: String,
    mention: String,
    prefix: String,
}

impl CommandDetector {
    pub fn new(bot_id: impl Into<String>, bot_name: &str, prefix: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            mention: format!("@**{}**", bot_name),
            prefix: prefix.into(),
        }
    }

    /// Strip the addressing marker, if any
    fn addressed<'a>(&self, content: &'a str) -> Option<&'a str> {
        let content = content.trim_start();
        if let Some(rest) = content.strip_prefix(&self.mention) {
            return Some(rest);
        }
        if !self.prefix.is_empty() {
            if let Some(rest) = content.strip_prefix(&self.prefix) {
                return Some(rest);
            }
        }
        None
    }

    /// Annotate `event` in place; returns whether it is a command
    pub fn detect(&self, event: &mut Event) -> bool {
        let Some(message) = event.chat_message() else {
            return false;
        };
        if message.sender.id == self.bot_id {
            return false;
        }

        let line = match (self.addressed(&message.content), message.message_type) {
            (Some(rest), _) => rest,
            (None, MessageType::Private) => message.content.as_str(),
            (None, MessageType::Stream) => return false,
        };

        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim_start()),
            None => (line, ""),
        };
        debug!("Received command line: {:?} {:?}", name, rest);

        let Some(Value::Object(payload)) = event.payload.get_mut("message") else {
            return false;
        };
        payload.insert("command_name".to_string(), Value::from(name));
        payload.insert("command".to_string(), Value::from(rest));
        true
    }
}
