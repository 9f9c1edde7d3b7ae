//! Command plugins - Expose a `CommandService` as a plugin

use async_trait::async_trait;
use tracing::debug;

use crate::application::errors::PluginError;
use crate::application::services::CommandService;
use crate::domain::entities::{CommandMetadata, Event, Response};
use crate::plugins::context::PluginContext;
use crate::plugins::trait_def::Plugin;

/// Handles commands whose name equals the service name
pub struct CommandPlugin {
    ctx: PluginContext,
    service: CommandService,
}

impl CommandPlugin {
    pub fn new(ctx: PluginContext, service: CommandService) -> Self {
        Self { ctx, service }
    }

    pub fn service(&self) -> &CommandService {
        &self.service
    }
}

#[async_trait]
impl Plugin for CommandPlugin {
    fn context(&self) -> &PluginContext {
        &self.ctx
    }

    fn is_responsible(&self, event: &Event) -> bool {
        self.ctx.accepts(event) && event.command_name() == Some(self.service.name())
    }

    async fn handle(&self, event: &Event) -> Result<Vec<Response>, PluginError> {
        let message = event
            .chat_message()
            .ok_or_else(|| PluginError::InvalidPayload("event carries no message".to_string()))?;
        let command = event.command_text().unwrap_or_default();
        let privilege = self.ctx.privilege_of(&message.sender.id);
        debug!("{} handles {:?} at {} privilege", self.service.name(), command, privilege);

        Ok(self.service.execute(&message, command, privilege).await)
    }

    fn metadata(&self) -> Option<CommandMetadata> {
        Some(self.service.metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::converters::string;
    use crate::application::messaging::CommandDetector;
    use crate::application::services::HandlerResult;
    use crate::domain::entities::{
        ArgSpec, ChatMessage, Outcome, Privilege, SubcommandSpec, User, ROOT_SENDER,
    };
    use crate::domain::traits::BotInfo;
    use crate::plugins::context::{LoopbackSender, Privileges};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn plugin() -> CommandPlugin {
        let (tx, _rx) = mpsc::channel(1);
        let bot = BotInfo {
            id: "1".into(),
            name: "Courier".into(),
        };
        let ctx = PluginContext::new("greet", vec!["message".into()], bot, LoopbackSender::new(tx))
            .with_privileges(Arc::new(Privileges::new(vec!["9".to_string()], Vec::new())));
        let service = CommandService::new("greet")
            .subcommand(
                SubcommandSpec::new("hello").arg(ArgSpec::positional("who", string())),
                |req| async move {
                    let who = req.invocation.arg_str("who").unwrap_or_default().to_string();
                    HandlerResult::Ok(vec![Outcome::Reply(format!("Hello, {}!", who))])
                },
            )
            .unwrap()
            .subcommand(
                SubcommandSpec::new("secret").with_privilege(Privilege::Admin),
                |_| async { HandlerResult::Ok(vec![Outcome::Reply("42".into())]) },
            )
            .unwrap();
        CommandPlugin::new(ctx, service)
    }

    fn command(sender: &str, text: &str) -> Event {
        let mut event = Event::message(ROOT_SENDER, &ChatMessage::private(User::new(sender), text));
        CommandDetector::new("1", "Courier", "!").detect(&mut event);
        event
    }

    #[test]
    fn test_responsible_for_own_name() {
        let p = plugin();
        assert!(p.is_responsible(&command("7", "greet hello you")));
        assert!(!p.is_responsible(&command("7", "help greet")));
        let plain = Event::message(ROOT_SENDER, &ChatMessage::stream(User::new("7"), "c", "t", "greet"));
        assert!(!p.is_responsible(&plain));
    }

    #[tokio::test]
    async fn test_handle_uses_sender_privilege() {
        let p = plugin();
        let out = p.handle(&command("7", "greet hello 'dear world'")).await.unwrap();
        assert_eq!(out[0].content(), Some("Hello, dear world!"));

        let denied = p.handle(&command("7", "greet secret")).await.unwrap();
        assert!(denied[0].content().unwrap().contains("sufficient privileges"));

        let allowed = p.handle(&command("9", "greet secret")).await.unwrap();
        assert_eq!(allowed[0].content(), Some("42"));
    }

    #[test]
    fn test_metadata_names_subcommands() {
        let meta = plugin().metadata().unwrap();
        assert_eq!(meta.name, "greet");
        assert_eq!(meta.syntax_for(Privilege::User), "greet hello <who>");
    }
}
