//! Ping - Wave back when the bot is addressed without a command

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::errors::PluginError;
use crate::domain::entities::{Event, Response};
use crate::plugins::context::PluginContext;
use crate::plugins::trait_def::{Plugin, PluginDescriptor};

pub struct Ping {
    ctx: PluginContext,
}

#[async_trait]
impl Plugin for Ping {
    fn context(&self) -> &PluginContext {
        &self.ctx
    }

    fn is_responsible(&self, event: &Event) -> bool {
        self.ctx.accepts(event) && event.command_name() == Some("")
    }

    async fn handle(&self, event: &Event) -> Result<Vec<Response>, PluginError> {
        Ok(event
            .chat_message()
            .map(|msg| Response::reaction(&msg, "wave"))
            .into_iter()
            .collect())
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new("ping", |ctx| Ok(Arc::new(Ping { ctx }) as Arc<dyn Plugin>))
        .with_description("Wave at people who mention the bot")
}
