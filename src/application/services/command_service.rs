//! Command service - Parses a command line and runs the subcommand handler

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::application::errors::{PluginError, SpecError};
use crate::application::messaging::CommandParser;
use crate::domain::entities::{
    ChatMessage, CommandMetadata, Outcome, ParsedInvocation, Privilege, Response, SubcommandSpec,
};

/// Input of a subcommand handler
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub message: ChatMessage,
    pub invocation: ParsedInvocation,
    pub privilege: Privilege,
}

pub type HandlerResult = Result<Vec<Outcome>, PluginError>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
pub type SubcommandHandler = Arc<dyn Fn(CommandRequest) -> HandlerFuture + Send + Sync>;

/// A command made of subcommands, each with its own handler
#[derive(Clone)]
pub struct CommandService {
    name: String,
    description: Option<String>,
    parser: CommandParser,
    handlers: HashMap<String, SubcommandHandler>,
}

impl CommandService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parser: CommandParser::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Register a subcommand together with its handler
    pub fn subcommand<F, Fut>(mut self, spec: SubcommandSpec, handler: F) -> Result<Self, SpecError>
    where
        F: Fn(CommandRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let name = spec.name.clone();
        self.parser.add_subcommand(spec)?;
        let handler: SubcommandHandler = Arc::new(move |req| Box::pin(handler(req)));
        self.handlers.insert(name, handler);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    pub fn metadata(&self) -> CommandMetadata {
        let meta = self.parser.metadata(&self.name);
        match &self.description {
            Some(desc) => meta.with_description(desc.clone()),
            None => meta,
        }
    }

    /// Run `command` (the line after the command name) for `message`.
    ///
    /// Never fails: parse errors, missing privileges and handler failures
    /// all become replies to the sender.
    pub async fn execute(
        &self,
        message: &ChatMessage,
        command: &str,
        privilege: Privilege,
    ) -> Vec<Response> {
        let invocation = match self.parser.parse(command) {
            Ok(invocation) => invocation,
            Err(e) => {
                debug!("Parse error in `{} {}`: {}", self.name, command, e);
                let usage = self.metadata().syntax_for(privilege);
                return vec![Response::direct(
                    message.sender.id.clone(),
                    format!("{}\n\nUsage:\n```text\n{}\n```", e, usage),
                )];
            }
        };

        let full_name = format!("{} {}", self.name, invocation.subcommand);
        if let Err(reason) = self.check_privilege(&invocation, privilege) {
            return vec![privilege_denied(message, &full_name, &reason)];
        }

        let Some(handler) = self.handlers.get(&invocation.subcommand) else {
            return vec![Response::reaction(message, "question")];
        };

        info!(
            "{} calls {} with {:?} and {:?}",
            message.sender.mention_silent(),
            full_name,
            invocation.args,
            invocation.opts
        );

        let request = CommandRequest {
            message: message.clone(),
            invocation,
            privilege,
        };

        match handler(request).await {
            Ok(outcomes) => fold_outcomes(message, outcomes),
            Err(PluginError::Privilege(reason)) => {
                vec![privilege_denied(message, &full_name, &reason)]
            }
            Err(e) => {
                error!("Handler `{}` failed: {}", full_name, e);
                vec![Response::reply(
                    message,
                    format!(
                        "Sorry, {}, an error occurred while executing your request.",
                        message.sender.display_name()
                    ),
                )]
            }
        }
    }

    /// Minimum privileges of the subcommand and of every supplied item
    fn check_privilege(
        &self,
        invocation: &ParsedInvocation,
        privilege: Privilege,
    ) -> Result<(), String> {
        let Some(spec) = self.parser.subcommand(&invocation.subcommand) else {
            return Ok(());
        };

        if let Some(required) = spec.privilege.filter(|p| *p > privilege) {
            return Err(format!("Requires {} privilege.", required));
        }

        for opt in &spec.opts {
            if let Some(required) = opt.privilege.filter(|p| *p > privilege) {
                if invocation.has_opt(&opt.key_str()) {
                    return Err(format!("Option `-{}` requires {} privilege.", opt.key, required));
                }
            }
        }

        for arg in &spec.args {
            if let Some(required) = arg.privilege.filter(|p| *p > privilege) {
                if invocation.has_arg(&arg.name) {
                    return Err(format!(
                        "Argument `{}` requires {} privilege.",
                        arg.name, required
                    ));
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for CommandService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandService")
            .field("name", &self.name)
            .field("parser", &self.parser)
            .finish()
    }
}

fn privilege_denied(message: &ChatMessage, command: &str, reason: &str) -> Response {
    Response::reply(
        message,
        format!(
            "Hi {}!\nYou don't have sufficient privileges to execute the command `{}`. {}",
            message.sender.display_name(),
            command,
            reason
        ),
    )
}

/// Turn handler outcomes into responses, summarising partial results
pub fn fold_outcomes(message: &ChatMessage, outcomes: Vec<Outcome>) -> Vec<Response> {
    let mut responses = Vec::new();
    let mut successful = Vec::new();
    let mut errors = Vec::new();

    for outcome in outcomes {
        match outcome {
            Outcome::Reply(text) => responses.push(Response::reply(message, text)),
            Outcome::Direct { to, content } => responses.push(Response::direct(to, content)),
            Outcome::React(emoji) => responses.push(Response::reaction(message, emoji)),
            Outcome::PartialSuccess(info) => successful.push(info),
            Outcome::PartialError(info) => errors.push(info),
            Outcome::Raw(response) => responses.push(response),
        }
    }

    if !errors.is_empty() {
        let mut text = if errors.len() > 1 {
            format!("Multiple errors occurred: {}", errors.join(", "))
        } else {
            format!("An error occurred: {}", errors[0])
        };
        if !successful.is_empty() {
            text.push_str("\nHowever, the following were successful: ");
            text.push_str(&successful.join(", "));
        }
        responses.push(Response::reply(message, text));
    } else if responses.is_empty() && !successful.is_empty() {
        responses.push(Response::ok(message));
    } else if responses.is_empty() {
        responses.push(Response::reply(
            message,
            "It looks like there's nothing for me to do.",
        ));
    }

    responses
}
