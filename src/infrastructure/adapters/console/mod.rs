//! Console adapter for development/testing
//!
//! Every stdin line becomes a private message from the console user;
//! responses are printed to stdout.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

use crate::application::errors::{BotError, RuntimeError};
use crate::domain::entities::{ChatMessage, Event, Recipient, Response, User, ROOT_SENDER};
use crate::domain::traits::{Bot, BotInfo};
use crate::plugins::RuntimeHandle;

/// Sender id of the person typing into the console
pub const CONSOLE_USER: &str = "console";

/// Console bot adapter for local development
pub struct ConsoleAdapter {
    info: BotInfo,
}

impl ConsoleAdapter {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            info: BotInfo {
                id: id.into(),
                name: name.into(),
            },
        }
    }

    /// Text printed for one response
    pub fn render(response: &Response) -> String {
        match response {
            Response::Message {
                to: Recipient::Private { to },
                content,
            } => format!("[BOT -> {}] {}", to, content),
            Response::Message {
                to: Recipient::Stream { channel, topic },
                content,
            } => format!("[BOT -> #{} > {}] {}", channel, topic, content),
            Response::Reaction { emoji, .. } => format!("[BOT] :{}:", emoji),
        }
    }
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        Self::new("courier", "courier-bot")
    }
}

#[async_trait]
impl Bot for ConsoleAdapter {
    async fn start(&self) -> Result<(), BotError> {
        info!("Starting console bot (dev mode)");
        Ok(())
    }

    async fn send_message(&self, to: &Recipient, text: &str) -> Result<(), BotError> {
        println!(
            "{}",
            Self::render(&Response::Message {
                to: to.clone(),
                content: text.to_string(),
            })
        );
        Ok(())
    }

    async fn add_reaction(&self, message_id: &str, emoji: &str) -> Result<(), BotError> {
        println!(
            "{}",
            Self::render(&Response::Reaction {
                message_id: message_id.to_string(),
                emoji: emoji.to_string(),
            })
        );
        Ok(())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}

/// Turn input lines into message events until end of input, then stop
/// the runtime. Returns the number of messages queued.
pub async fn feed<R>(reader: R, handle: &RuntimeHandle) -> Result<usize, RuntimeError>
where
    R: AsyncRead + Unpin,
{
    let user = User::new(CONSOLE_USER).with_name("Console User");
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("Console input: {}", line);
        let message = ChatMessage::private(user.clone(), line);
        handle.send(Event::message(ROOT_SENDER, &message)).await?;
        count += 1;
    }

    info!("Console input closed");
    handle.stop().await?;
    Ok(count)
}
