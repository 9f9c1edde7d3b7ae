//! Plugin context - Everything a plugin receives at construction time

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::application::errors::RuntimeError;
use crate::domain::entities::{CommandMetadata, Event, Privilege};
use crate::domain::traits::BotInfo;
use crate::plugins::trait_def::ConcurrencyMode;

/// Published command metadata, keyed by command name
pub type CommandCatalog = Arc<RwLock<BTreeMap<String, CommandMetadata>>>;

/// Currently loaded plugins, keyed by name
pub type PluginDirectory = Arc<RwLock<BTreeMap<String, PluginInfo>>>;

/// Names of every registered plugin, loaded or not
pub type PluginRegistry = Arc<RwLock<BTreeSet<String>>>;

/// Summary of a loaded plugin
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub mode: ConcurrencyMode,
    pub dependencies: Vec<String>,
    pub description: Option<String>,
}

/// Sender ids with elevated privileges
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Privileges {
    pub admins: HashSet<String>,
    pub moderators: HashSet<String>,
}

impl Privileges {
    pub fn new<A, M>(admins: A, moderators: M) -> Self
    where
        A: IntoIterator<Item = String>,
        M: IntoIterator<Item = String>,
    {
        Self {
            admins: admins.into_iter().collect(),
            moderators: moderators.into_iter().collect(),
        }
    }

    pub fn level(&self, sender_id: &str) -> Privilege {
        if self.admins.contains(sender_id) {
            Privilege::Admin
        } else if self.moderators.contains(sender_id) {
            Privilege::Moderator
        } else {
            Privilege::User
        }
    }
}

/// Pushes events back onto the inbound queue
#[derive(Debug, Clone)]
pub struct LoopbackSender {
    tx: mpsc::Sender<Event>,
}

impl LoopbackSender {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    pub async fn push(&self, event: Event) -> Result<(), RuntimeError> {
        debug!("Loopback {} event from {}", event.kind, event.sender);
        self.tx.send(event).await.map_err(|_| RuntimeError::QueueClosed)
    }

    /// Push without waiting; fails when the queue is full or closed
    pub fn try_push(&self, event: Event) -> Result<(), RuntimeError> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => RuntimeError::QueueFull,
            TrySendError::Closed(_) => RuntimeError::QueueClosed,
        })
    }
}

/// Serializable part of a context, sent to process hosts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextSeed {
    pub name: String,
    pub event_kinds: Vec<String>,
    pub bot: BotInfo,
    pub privileges: Privileges,
    #[serde(default)]
    pub catalog: BTreeMap<String, CommandMetadata>,
}

/// Construction-time context of a plugin
#[derive(Debug, Clone)]
pub struct PluginContext {
    name: String,
    event_kinds: Vec<String>,
    bot: BotInfo,
    privileges: Arc<Privileges>,
    loopback: LoopbackSender,
    catalog: CommandCatalog,
    directory: PluginDirectory,
    registry: PluginRegistry,
    exchanges: Arc<Mutex<HashMap<String, oneshot::Sender<Event>>>>,
}

impl PluginContext {
    pub fn new(
        name: impl Into<String>,
        event_kinds: Vec<String>,
        bot: BotInfo,
        loopback: LoopbackSender,
    ) -> Self {
        Self {
            name: name.into(),
            event_kinds,
            bot,
            privileges: Arc::new(Privileges::default()),
            loopback,
            catalog: CommandCatalog::default(),
            directory: PluginDirectory::default(),
            registry: PluginRegistry::default(),
            exchanges: Arc::default(),
        }
    }

    pub fn with_privileges(mut self, privileges: Arc<Privileges>) -> Self {
        self.privileges = privileges;
        self
    }

    pub fn with_catalog(mut self, catalog: CommandCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_directory(mut self, directory: PluginDirectory) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Rebuild a context inside a process host
    pub fn from_seed(seed: ContextSeed, loopback: LoopbackSender) -> Self {
        Self::new(seed.name, seed.event_kinds, seed.bot, loopback)
            .with_privileges(Arc::new(seed.privileges))
            .with_catalog(Arc::new(RwLock::new(seed.catalog)))
    }

    pub fn seed(&self) -> ContextSeed {
        ContextSeed {
            name: self.name.clone(),
            event_kinds: self.event_kinds.clone(),
            bot: self.bot.clone(),
            privileges: (*self.privileges).clone(),
            catalog: self.catalog_snapshot(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_kinds(&self) -> &[String] {
        &self.event_kinds
    }

    pub fn bot(&self) -> &BotInfo {
        &self.bot
    }

    pub fn loopback(&self) -> &LoopbackSender {
        &self.loopback
    }

    pub fn privilege_of(&self, sender_id: &str) -> Privilege {
        self.privileges.level(sender_id)
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    pub fn catalog_snapshot(&self) -> BTreeMap<String, CommandMetadata> {
        match self.catalog.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn directory_snapshot(&self) -> BTreeMap<String, PluginInfo> {
        match self.directory.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        match self.registry.read() {
            Ok(guard) => guard.contains(name),
            Err(poisoned) => poisoned.into_inner().contains(name),
        }
    }

    /// Default responsibility: the event's kind tag is declared and the
    /// destination, if any, is this plugin
    pub fn accepts(&self, event: &Event) -> bool {
        event.is_addressed_to(&self.name)
            && self.event_kinds.iter().any(|k| k == event_tag(event))
    }

    /// Wait up to `timeout` for an event delivered under `id`
    pub async fn await_exchange(&self, id: &str, timeout: Duration) -> Option<Event> {
        let (tx, rx) = oneshot::channel();
        self.lock_exchanges().insert(id.to_string(), tx);

        let result = tokio::time::timeout(timeout, rx).await;
        self.lock_exchanges().remove(id);
        match result {
            Ok(Ok(event)) => Some(event),
            Ok(Err(_)) => None,
            Err(_) => {
                debug!("Exchange {} of {} timed out", id, self.name);
                None
            }
        }
    }

    /// Complete a pending exchange; returns whether someone was waiting
    pub fn deliver_exchange(&self, id: &str, event: Event) -> bool {
        let Some(tx) = self.lock_exchanges().remove(id) else {
            return false;
        };
        if tx.send(event).is_err() {
            warn!("Exchange {} of {} was abandoned", id, self.name);
            return false;
        }
        true
    }

    pub fn has_exchange(&self, id: &str) -> bool {
        self.lock_exchanges().contains_key(id)
    }

    fn lock_exchanges(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Event>>> {
        match self.exchanges.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Kind tag matched against declared event kinds: the payload `type` for
/// domain events, the kind name otherwise
pub fn event_tag(event: &Event) -> &str {
    event.domain_type().unwrap_or_else(|| event.kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::EventKind;
    use serde_json::json;

    fn context() -> (PluginContext, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(4);
        let bot = BotInfo {
            id: "1".to_string(),
            name: "Courier".to_string(),
        };
        let ctx = PluginContext::new("echo", vec!["message".to_string()], bot, LoopbackSender::new(tx));
        (ctx, rx)
    }

    #[test]
    fn test_accepts_declared_kinds() {
        let (ctx, _rx) = context();
        let message = Event::domain("_root", json!({"type": "message", "message": {}}));
        let reaction = Event::domain("_root", json!({"type": "reaction"}));
        assert!(ctx.accepts(&message));
        assert!(!ctx.accepts(&reaction));
        assert!(!ctx.accepts(&message.clone().with_destination("help")));
        assert!(ctx.accepts(&message.with_destination("echo")));
        assert!(!ctx.accepts(&Event::new("_root", EventKind::Reload, json!(null))));
    }

    #[test]
    fn test_privilege_levels() {
        let p = Privileges::new(vec!["1".to_string()], vec!["2".to_string()]);
        assert_eq!(p.level("1"), Privilege::Admin);
        assert_eq!(p.level("2"), Privilege::Moderator);
        assert_eq!(p.level("3"), Privilege::User);
    }

    #[tokio::test]
    async fn test_loopback_reaches_queue() {
        let (ctx, mut rx) = context();
        ctx.loopback().push(Event::restart("echo")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Restart);
    }

    #[test]
    fn test_try_push_tells_full_from_closed() {
        let (ctx, rx) = context();
        for _ in 0..4 {
            ctx.loopback().try_push(Event::reload("echo")).unwrap();
        }
        assert!(matches!(
            ctx.loopback().try_push(Event::reload("echo")),
            Err(RuntimeError::QueueFull)
        ));
        drop(rx);
        assert!(matches!(
            ctx.loopback().try_push(Event::reload("echo")),
            Err(RuntimeError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_exchange_delivery() {
        let (ctx, _rx) = context();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move {
            waiter.await_exchange("42", Duration::from_secs(5)).await
        });

        while !ctx.has_exchange("42") {
            tokio::task::yield_now().await;
        }
        assert!(ctx.deliver_exchange("42", Event::stop("x")));
        let got = handle.await.unwrap();
        assert_eq!(got.map(|e| e.kind), Some(EventKind::Stop));
        assert!(!ctx.has_exchange("42"));
    }

    #[tokio::test]
    async fn test_exchange_timeout() {
        let (ctx, _rx) = context();
        let got = ctx.await_exchange("1", Duration::from_millis(10)).await;
        assert!(got.is_none());
        assert!(!ctx.deliver_exchange("1", Event::stop("x")));
    }

    #[test]
    fn test_seed_round_trip() {
        let (ctx, _rx) = context();
        let seed = ctx.seed();
        let json = serde_json::to_string(&seed).unwrap();
        let back: ContextSeed = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "echo");
        assert_eq!(back.event_kinds, vec!["message"]);
    }
}
