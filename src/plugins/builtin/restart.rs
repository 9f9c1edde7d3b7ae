//! Restart - Stop the bot and ask the host to start it again

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::application::errors::PluginError;
use crate::domain::entities::{CommandMetadata, Event, Privilege, Response};
use crate::plugins::context::PluginContext;
use crate::plugins::trait_def::{Plugin, PluginDescriptor};

pub struct Restart {
    ctx: PluginContext,
}

#[async_trait]
impl Plugin for Restart {
    fn context(&self) -> &PluginContext {
        &self.ctx
    }

    fn is_responsible(&self, event: &Event) -> bool {
        self.ctx.accepts(event) && event.command_name() == Some("restart")
    }

    async fn handle(&self, event: &Event) -> Result<Vec<Response>, PluginError> {
        let message = event
            .chat_message()
            .ok_or_else(|| PluginError::InvalidPayload("event carries no message".to_string()))?;

        if self.ctx.privilege_of(&message.sender.id) < Privilege::Admin {
            return Ok(vec![Response::reply(
                &message,
                format!(
                    "Hi {}!\nYou don't have sufficient privileges to execute the command `restart`.",
                    message.sender.display_name()
                ),
            )]);
        }

        info!("Restart requested by {}", message.sender.mention_silent());
        self.ctx
            .loopback()
            .try_push(Event::restart(self.ctx.name()))
            .map_err(|e| PluginError::Handler(e.to_string()))?;
        Ok(vec![Response::ok(&message)])
    }

    fn metadata(&self) -> Option<CommandMetadata> {
        Some(CommandMetadata::new("restart").with_description("Restart the bot (admins only)."))
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new("restart", |ctx| Ok(Arc::new(Restart { ctx }) as Arc<dyn Plugin>))
        .with_description("Restart the bot")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::CommandDetector;
    use crate::domain::entities::{ChatMessage, EventKind, User, ROOT_SENDER};
    use crate::domain::traits::BotInfo;
    use crate::plugins::context::{LoopbackSender, Privileges};
    use tokio::sync::mpsc;

    fn command(sender: &str) -> Event {
        let mut event = Event::message(ROOT_SENDER, &ChatMessage::private(User::new(sender), "restart"));
        CommandDetector::new("1", "Courier", "!").detect(&mut event);
        event
    }

    #[tokio::test]
    async fn test_only_admins_restart() {
        let (tx, mut rx) = mpsc::channel(4);
        let bot = BotInfo {
            id: "1".into(),
            name: "Courier".into(),
        };
        let ctx = PluginContext::new("restart", vec!["message".into()], bot, LoopbackSender::new(tx))
            .with_privileges(Arc::new(Privileges::new(vec!["9".to_string()], Vec::new())));
        let plugin = descriptor().build(ctx).unwrap();

        let denied = plugin.handle(&command("7")).await.unwrap();
        assert!(denied[0].content().unwrap().contains("sufficient privileges"));
        assert!(rx.try_recv().is_err());

        let ok = plugin.handle(&command("9")).await.unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::Restart);
    }
}
