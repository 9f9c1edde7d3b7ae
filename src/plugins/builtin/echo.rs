//! Echo - Repeat text back in various shapes
//!
//! Runs in a child process by default so slow `delay` requests never
//! hold up the dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use crate::application::errors::{PluginError, SpecError};
use crate::application::messaging::converters::{integer, string};
use crate::application::services::{CommandService, HandlerResult};
use crate::domain::entities::{ArgSpec, OptionSpec, Outcome, Privilege, SubcommandSpec};
use crate::plugins::command::CommandPlugin;
use crate::plugins::trait_def::{ConcurrencyMode, Plugin, PluginDescriptor};

const MAX_REPEAT: i64 = 10;
const MAX_DELAY_SECS: i64 = 30;

/// Alternate the case of every letter, starting lowercase
pub fn meme_case(text: &str) -> String {
    let mut upper = false;
    text.chars()
        .map(|c| {
            if !c.is_alphabetic() {
                return c.to_string();
            }
            let out = if upper {
                c.to_uppercase().to_string()
            } else {
                c.to_lowercase().to_string()
            };
            upper = !upper;
            out
        })
        .collect()
}

pub fn service() -> Result<CommandService, SpecError> {
    CommandService::new("echo")
        .with_description("Echo text back to you.")
        .subcommand(
            SubcommandSpec::new("uppercase")
                .with_description("Echo the text in uppercase, optionally several times.")
                .arg(ArgSpec::positional("text", string()).with_description("The message text"))
                .opt(
                    OptionSpec::valued('n', integer())
                        .with_long("number")
                        .with_description("How often to echo the text")
                        .with_privilege(Privilege::Moderator),
                ),
            |req| async move {
                let text = req.invocation.arg_str("text").unwrap_or_default().to_uppercase();
                let times = req.invocation.opt_i64("n").unwrap_or(1).clamp(1, MAX_REPEAT);
                HandlerResult::Ok((0..times).map(|_| Outcome::Reply(text.clone())).collect())
            },
        )?
        .subcommand(
            SubcommandSpec::new("lowercase")
                .with_description("Echo the text in lowercase.")
                .arg(ArgSpec::positional("text", string())),
            |req| async move {
                let text = req.invocation.arg_str("text").unwrap_or_default().to_lowercase();
                HandlerResult::Ok(vec![Outcome::Reply(text)])
            },
        )?
        .subcommand(
            SubcommandSpec::new("meme")
                .with_description("Echo the text in meme case.")
                .arg(ArgSpec::greedy("text", string()).non_empty()),
            |req| async move {
                let text = req.invocation.arg_strings("text").join(" ");
                HandlerResult::Ok(vec![Outcome::Reply(meme_case(&text))])
            },
        )?
        .subcommand(
            SubcommandSpec::new("delay")
                .with_description("Echo the text after a delay.")
                .arg(ArgSpec::greedy("text", string()).non_empty())
                .opt(
                    OptionSpec::valued('d', integer())
                        .with_long("delay")
                        .with_description("The delay in seconds"),
                ),
            |req| async move {
                let secs = req.invocation.opt_i64("d").unwrap_or(1).clamp(0, MAX_DELAY_SECS);
                tokio::time::sleep(Duration::from_secs(secs as u64)).await;
                HandlerResult::Ok(vec![Outcome::Reply(req.invocation.arg_strings("text").join(" "))])
            },
        )
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new("echo", |ctx| {
        let service = service().map_err(|e| PluginError::Unavailable(e.to_string()))?;
        Ok(Arc::new(CommandPlugin::new(ctx, service)) as Arc<dyn Plugin>)
    })
    .with_mode(ConcurrencyMode::Process)
    .with_description("Echo text back")
}
