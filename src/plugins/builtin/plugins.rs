//! Plugins - Inspect and control loaded plugins at runtime
//!
//! Lifecycle requests are pushed onto the inbound queue as `start`,
//! `stop` and `reload` events, so they take effect in queue order.

use std::sync::Arc;

use crate::application::errors::{PluginError, SpecError};
use crate::application::messaging::converters::string;
use crate::application::services::{CommandService, HandlerResult};
use crate::domain::entities::{ArgSpec, Event, Outcome, Privilege, SubcommandSpec};
use crate::plugins::command::CommandPlugin;
use crate::plugins::context::PluginContext;
use crate::plugins::trait_def::{Plugin, PluginDescriptor};

fn push(ctx: &PluginContext, event: Event) -> Result<(), PluginError> {
    ctx.loopback()
        .try_push(event)
        .map_err(|e| PluginError::Handler(e.to_string()))
}

pub fn service(ctx: &PluginContext) -> Result<CommandService, SpecError> {
    let list_ctx = ctx.clone();
    let load_ctx = ctx.clone();
    let unload_ctx = ctx.clone();
    let reload_ctx = ctx.clone();

    CommandService::new("plugins")
        .with_description("Manage running plugins (admins only).")
        .subcommand(
            SubcommandSpec::new("list")
                .with_description("List running plugins.")
                .with_privilege(Privilege::Admin),
            move |_| {
                let ctx = list_ctx.clone();
                async move {
                    let lines: Vec<String> = ctx
                        .directory_snapshot()
                        .values()
                        .map(|p| {
                            let mut line = format!("- `{}` ({})", p.name, p.mode);
                            if !p.dependencies.is_empty() {
                                line.push_str(&format!(", needs {}", p.dependencies.join(", ")));
                            }
                            line
                        })
                        .collect();
                    HandlerResult::Ok(vec![Outcome::Reply(lines.join("\n"))])
                }
            },
        )?
        .subcommand(
            SubcommandSpec::new("load")
                .with_description("Start registered plugins.")
                .with_privilege(Privilege::Admin)
                .arg(ArgSpec::greedy("names", string()).non_empty()),
            move |req| {
                let ctx = load_ctx.clone();
                async move {
                    let running = ctx.directory_snapshot();
                    let mut outcomes = Vec::new();
                    for name in req.invocation.arg_strings("names") {
                        if !ctx.is_registered(&name) {
                            outcomes.push(Outcome::PartialError(format!("{} is not a known plugin", name)));
                            continue;
                        }
                        if running.contains_key(&name) {
                            outcomes.push(Outcome::PartialError(format!("{} is already running", name)));
                            continue;
                        }
                        match push(&ctx, Event::start(ctx.name(), name.clone())) {
                            Ok(()) => outcomes.push(Outcome::PartialSuccess(name)),
                            Err(e) => outcomes.push(Outcome::PartialError(format!("{}: {}", name, e))),
                        }
                    }
                    HandlerResult::Ok(outcomes)
                }
            },
        )?
        .subcommand(
            SubcommandSpec::new("unload")
                .with_description("Stop running plugins.")
                .with_privilege(Privilege::Admin)
                .arg(ArgSpec::greedy("names", string()).non_empty()),
            move |req| {
                let ctx = unload_ctx.clone();
                async move {
                    let running = ctx.directory_snapshot();
                    let mut outcomes = Vec::new();
                    for name in req.invocation.arg_strings("names") {
                        if !running.contains_key(&name) {
                            outcomes.push(Outcome::PartialError(format!("{} is not running", name)));
                            continue;
                        }
                        let event = Event::stop(ctx.name()).with_destination(name.clone());
                        match push(&ctx, event) {
                            Ok(()) => outcomes.push(Outcome::PartialSuccess(name)),
                            Err(e) => outcomes.push(Outcome::PartialError(format!("{}: {}", name, e))),
                        }
                    }
                    HandlerResult::Ok(outcomes)
                }
            },
        )?
        .subcommand(
            SubcommandSpec::new("reload")
                .with_description("Reload one plugin, or all of them.")
                .with_privilege(Privilege::Admin)
                .arg(ArgSpec::optional("name", string())),
            move |req| {
                let ctx = reload_ctx.clone();
                async move {
                    let event = match req.invocation.arg_str("name") {
                        Some(name) if !ctx.is_registered(name) => {
                            return HandlerResult::Ok(vec![Outcome::Reply(format!(
                                "{} is not a known plugin",
                                name
                            ))]);
                        }
                        Some(name) => Event::reload(ctx.name()).with_destination(name),
                        None => Event::reload(ctx.name()),
                    };
                    push(&ctx, event)?;
                    HandlerResult::Ok(vec![Outcome::React("ok".to_string())])
                }
            },
        )
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new("plugins", |ctx| {
        let service = service(&ctx).map_err(|e| PluginError::Unavailable(e.to_string()))?;
        Ok(Arc::new(CommandPlugin::new(ctx, service)) as Arc<dyn Plugin>)
    })
    .with_description("Load, unload and reload plugins")
}
