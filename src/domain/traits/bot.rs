use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::errors::BotError;
use crate::domain::entities::{Recipient, Response};

/// Bot trait - abstraction over the outbound side of a chat service
#[async_trait]
pub trait Bot: Send + Sync {
    /// Prepare the connection to the chat service
    async fn start(&self) -> Result<(), BotError>;

    /// Send a message
    async fn send_message(&self, to: &Recipient, text: &str) -> Result<(), BotError>;

    /// React to a message with an emoji
    async fn add_reaction(&self, message_id: &str, emoji: &str) -> Result<(), BotError>;

    /// Deliver handler responses in order, stopping at the first failure
    async fn send_responses(&self, responses: &[Response]) -> Result<(), BotError> {
        for response in responses {
            match response {
                Response::Message { to, content } => self.send_message(to, content).await?,
                Response::Reaction { message_id, emoji } => {
                    self.add_reaction(message_id, emoji).await?
                }
            }
        }
        Ok(())
    }

    /// Get bot info
    fn bot_info(&self) -> BotInfo;
}

/// Bot information
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BotInfo {
    pub id: String,
    pub name: String,
}

impl BotInfo {
    /// Mention markup addressing the bot
    pub fn mention(&self) -> String {
        format!("@**{}**", self.name)
    }
}
