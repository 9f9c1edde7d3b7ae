//! Help - Render the command catalog for the requesting user

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::errors::PluginError;
use crate::application::messaging::suggest::{did_you_mean, suggest};
use crate::domain::entities::{ChatMessage, CommandMetadata, Event, Privilege, Response};
use crate::plugins::context::PluginContext;
use crate::plugins::trait_def::{ConcurrencyMode, Plugin, PluginDescriptor};

pub struct Help {
    ctx: PluginContext,
}

impl Help {
    fn visible(meta: &CommandMetadata, privilege: Privilege) -> bool {
        meta.subcommands.is_empty() || meta.subcommands.iter().any(|s| s.visible_to(privilege))
    }

    fn overview(&self, message: &ChatMessage, privilege: Privilege) -> Response {
        let commands: Vec<String> = self
            .ctx
            .catalog_snapshot()
            .values()
            .filter(|meta| Self::visible(meta, privilege))
            .map(|meta| format!("- `{}`: {}", meta.name, meta.short_help()))
            .collect();

        Response::direct(
            message.sender.id.clone(),
            format!(
                "Hi {}!\n\n\
                 Use `help <command name>` to get more information about a certain command.\n\
                 Arguments containing whitespace need to be quoted, like in a POSIX shell.\n\n\
                 Currently, I understand the following commands:\n\n{}\n\n\
                 Have a nice day! :-)",
                message.sender.display_name(),
                commands.join("\n")
            ),
        )
    }

    fn command(&self, message: &ChatMessage, name: &str, privilege: Privilege) -> Response {
        let catalog = self.ctx.catalog_snapshot();
        let Some(meta) = catalog.get(name).filter(|m| Self::visible(m, privilege)) else {
            let names = catalog.keys().map(String::as_str);
            return match did_you_mean(&suggest(name, names)) {
                Some(hint) => Response::reply(message, hint),
                None => Response::reaction(message, "question"),
            };
        };

        let mut text = format!("{}\n```text\n{}\n```", meta.short_help(), meta.syntax_for(privilege));
        for sub in meta.subcommands.iter().filter(|s| s.visible_to(privilege)) {
            if let Some(desc) = &sub.description {
                text.push_str(&format!("\n- `{}`: {}", sub.name, desc));
            }
        }
        Response::direct(message.sender.id.clone(), text)
    }
}

#[async_trait]
impl Plugin for Help {
    fn context(&self) -> &PluginContext {
        &self.ctx
    }

    fn is_responsible(&self, event: &Event) -> bool {
        self.ctx.accepts(event) && event.command_name() == Some("help")
    }

    async fn handle(&self, event: &Event) -> Result<Vec<Response>, PluginError> {
        let message = event
            .chat_message()
            .ok_or_else(|| PluginError::InvalidPayload("event carries no message".to_string()))?;
        let privilege = self.ctx.privilege_of(&message.sender.id);
        let response = match event.command_text().map(str::trim).unwrap_or_default() {
            "" => self.overview(&message, privilege),
            name => self.command(&message, name, privilege),
        };
        Ok(vec![response])
    }

    fn metadata(&self) -> Option<CommandMetadata> {
        Some(CommandMetadata::new("help").with_description("Show what I can do."))
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new("help", |ctx| Ok(Arc::new(Help { ctx }) as Arc<dyn Plugin>))
        .with_mode(ConcurrencyMode::Thread)
        .with_description("List commands and their syntax")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messaging::CommandDetector;
    use crate::domain::entities::{User, ROOT_SENDER};
    use crate::domain::traits::BotInfo;
    use crate::plugins::builtin::echo;
    use crate::plugins::context::LoopbackSender;
    use tokio::sync::mpsc;

    fn help() -> Arc<dyn Plugin> {
        let (tx, _rx) = mpsc::channel(1);
        let bot = BotInfo {
            id: "1".into(),
            name: "Courier".into(),
        };
        let ctx = PluginContext::new("help", vec!["message".into()], bot, LoopbackSender::new(tx));
        let meta = echo::service().unwrap().metadata();
        ctx.catalog().write().unwrap().insert(meta.name.clone(), meta);
        descriptor().build(ctx).unwrap()
    }

    fn command(text: &str) -> Event {
        let mut event = Event::message(
            ROOT_SENDER,
            &ChatMessage::private(User::new("7").with_name("Jane"), text),
        );
        CommandDetector::new("1", "Courier", "!").detect(&mut event);
        event
    }

    #[tokio::test]
    async fn test_overview_lists_catalog() {
        let out = help().handle(&command("help")).await.unwrap();
        let text = out[0].content().unwrap();
        assert!(text.starts_with("Hi Jane!"));
        assert!(text.contains("- `echo`: Echo text back to you."));
    }

    #[tokio::test]
    async fn test_command_syntax_hides_privileged_items() {
        let out = help().handle(&command("help echo")).await.unwrap();
        let text = out[0].content().unwrap();
        assert!(text.contains("echo uppercase <text>"));
        assert!(!text.contains("--number"));
        assert!(text.contains("- `meme`: Echo the text in meme case."));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let plugin = help();
        let out = plugin.handle(&command("help ech")).await.unwrap();
        assert_eq!(out[0].content(), Some("Did you mean `echo`?"));
        let out = plugin.handle(&command("help nothing")).await.unwrap();
        assert!(matches!(&out[0], Response::Reaction { emoji, .. } if emoji == "question"));
    }
}
