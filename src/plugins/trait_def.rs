//! Plugin trait definitions

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::errors::PluginError;
use crate::domain::entities::{CommandMetadata, Event, Response};
use crate::plugins::context::{PluginContext, PluginInfo};

/// Core plugin trait that all plugins must implement
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Context the plugin was built with
    fn context(&self) -> &PluginContext;

    /// Unique identifier for the plugin
    fn name(&self) -> &str {
        self.context().name()
    }

    /// Whether this plugin wants `event`. Runs on the dispatch loop, so it
    /// must answer from the event alone.
    fn is_responsible(&self, event: &Event) -> bool {
        self.context().accepts(event)
    }

    /// Key of the pending exchange `event` would answer
    fn exchange_key(&self, event: &Event) -> Option<String> {
        event.correlation_id.clone()
    }

    /// Handle one event; the responses are delivered in order
    async fn handle(&self, event: &Event) -> Result<Vec<Response>, PluginError>;

    /// Release resources before the plugin is dropped
    async fn shutdown(&self) {}

    /// Command metadata for help and typo suggestions
    fn metadata(&self) -> Option<CommandMetadata> {
        None
    }
}

/// Where a plugin's handler runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    /// On the dispatch loop, awaited before the next event
    #[default]
    Inline,
    /// On a dedicated OS thread with its own runtime
    Thread,
    /// In a child process speaking the host protocol
    Process,
}

impl ConcurrencyMode {
    pub fn as_str(&self) -> &str {
        match self {
            ConcurrencyMode::Inline => "inline",
            ConcurrencyMode::Thread => "thread",
            ConcurrencyMode::Process => "process",
        }
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a plugin from its context
pub type PluginFactory =
    Arc<dyn Fn(PluginContext) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync>;

/// Static description of a plugin
#[derive(Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub dependencies: Vec<String>,
    pub event_kinds: Vec<String>,
    pub mode: ConcurrencyMode,
    pub description: Option<String>,
    factory: PluginFactory,
}

impl PluginDescriptor {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(PluginContext) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            event_kinds: vec!["message".to_string()],
            mode: ConcurrencyMode::Inline,
            description: None,
            factory: Arc::new(factory),
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn with_event_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: ConcurrencyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Construct the plugin
    pub fn build(&self, ctx: PluginContext) -> Result<Arc<dyn Plugin>, PluginError> {
        (self.factory)(ctx)
    }

    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name.clone(),
            mode: self.mode,
            dependencies: self.dependencies.clone(),
            description: self.description.clone(),
        }
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("event_kinds", &self.event_kinds)
            .field("mode", &self.mode)
            .finish()
    }
}
