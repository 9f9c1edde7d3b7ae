//! Runtime - The event dispatch loop
//!
//! All events, whether from the chat service or pushed back by plugins,
//! arrive on one bounded queue and are handled strictly in order. The one
//! exception is an event that answers a pending exchange: it goes straight
//! to the waiting handler.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::application::errors::{DependencyError, RuntimeError};
use crate::application::messaging::suggest::{did_you_mean, suggest};
use crate::application::messaging::CommandDetector;
use crate::domain::entities::{Event, EventKind, Response};
use crate::domain::traits::Bot;
use crate::plugins::context::LoopbackSender;
use crate::plugins::manager::{ManagerSettings, PluginManager};
use crate::plugins::trait_def::{ConcurrencyMode, PluginDescriptor};

/// Lifecycle of the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
            LoopState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopExit {
    /// The host should re-exec the binary
    pub restart_requested: bool,
    /// Events still queued at shutdown; never dispatched
    pub dropped: usize,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub queue_capacity: usize,
    /// Command prefix for channel messages
    pub prefix: String,
    pub manager: ManagerSettings,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            prefix: "!".to_string(),
            manager: ManagerSettings::default(),
        }
    }
}

/// Cloneable access to a running loop
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Event>,
    state: watch::Receiver<LoopState>,
}

impl RuntimeHandle {
    /// Queue an event; waits while the queue is full
    pub async fn send(&self, event: Event) -> Result<(), RuntimeError> {
        self.tx.send(event).await.map_err(|_| RuntimeError::QueueClosed)
    }

    /// Ask the loop to stop after the events already queued
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        self.send(Event::stop("runtime")).await
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Wait until the loop reached `Stopped`
    pub async fn stopped(&mut self) {
        while *self.state.borrow() != LoopState::Stopped {
            if self.state.changed().await.is_err() {
                return;
            }
        }
    }
}

pub struct Runtime {
    tx: mpsc::Sender<Event>,
    rx: mpsc::Receiver<Event>,
    /// Events read while an inline handler was running
    backlog: VecDeque<Event>,
    backlog_limit: usize,
    manager: PluginManager,
    detector: CommandDetector,
    bot: Arc<dyn Bot>,
    state: watch::Sender<LoopState>,
}

impl Runtime {
    pub fn new(settings: RuntimeSettings, bot: Arc<dyn Bot>) -> Self {
        let capacity = settings.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let info = bot.bot_info();
        let detector = CommandDetector::new(info.id.clone(), &info.name, settings.prefix);
        let manager = PluginManager::new(
            settings.manager,
            Arc::clone(&bot),
            LoopbackSender::new(tx.clone()),
        );
        let (state, _) = watch::channel(LoopState::Running);
        Self {
            tx,
            rx,
            backlog: VecDeque::new(),
            backlog_limit: capacity,
            manager,
            detector,
            bot,
            state,
        }
    }

    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), DependencyError> {
        self.manager.register(descriptor)
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            tx: self.tx.clone(),
            state: self.state.subscribe(),
        }
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    /// Start every plugin in dependency order, then dispatch until stopped
    pub async fn run(mut self) -> Result<LoopExit, RuntimeError> {
        if let Err(e) = self.manager.start_all().await {
            error!("Failed to start plugins: {}", e);
            self.manager.stop_all().await;
            self.state.send_replace(LoopState::Stopped);
            return Err(e);
        }
        info!("Dispatch loop running with {} plugins", self.manager.running().len());

        let mut exit = LoopExit::default();
        while let Some(mut event) = self.next_event().await {
            debug!("Received {} event {} from {}", event.kind, event.id, event.sender);

            if self.manager.answer(&event) {
                continue;
            }

            if event.kind == EventKind::Restart {
                info!("Restart requested by {}", event.sender);
                exit.restart_requested = true;
                event.kind = EventKind::Stop;
                event.destination = None;
            }

            match (event.kind, event.destination.clone()) {
                (EventKind::Stop, None) => break,
                (EventKind::Stop, Some(name)) => {
                    log_lifecycle(self.manager.unload(&name).await, "unload", &name)
                }
                (EventKind::Start, Some(name)) => {
                    log_lifecycle(self.manager.load(&name).await, "load", &name)
                }
                (EventKind::Reload, Some(name)) => {
                    log_lifecycle(self.manager.reload(&name).await, "reload", &name)
                }
                (EventKind::Reload, None) => {
                    log_lifecycle(self.manager.reload_all().await, "reload", "all plugins")
                }
                (EventKind::Start, None) => warn!("Ignoring start event {} without destination", event.id),
                (EventKind::Domain, _) => {
                    self.detector.detect(&mut event);
                }
                (EventKind::Restart, _) => {}
            }

            self.dispatch(&event).await;
        }

        self.state.send_replace(LoopState::Stopping);
        info!("Dispatch loop stopping");

        self.rx.close();
        exit.dropped += self.backlog.len();
        self.backlog.clear();
        while self.rx.try_recv().is_ok() {
            exit.dropped += 1;
        }
        if exit.dropped > 0 {
            warn!("Dropped {} queued events at shutdown", exit.dropped);
        }

        self.manager.stop_all().await;
        self.state.send_replace(LoopState::Stopped);
        info!("Dispatch loop stopped");
        Ok(exit)
    }

    async fn next_event(&mut self) -> Option<Event> {
        match self.backlog.pop_front() {
            Some(event) => Some(event),
            None => self.rx.recv().await,
        }
    }

    /// Hand `event` to every responsible plugin exactly once.
    ///
    /// While an inline handler runs, the queue is still read: answers to
    /// pending exchanges are delivered, everything else waits in the
    /// backlog in arrival order.
    async fn dispatch(&mut self, event: &Event) {
        let workers = self.manager.responsible(event);
        if workers.is_empty() {
            self.unclaimed(event).await;
            return;
        }
        for worker in workers {
            debug!("Dispatching {} to {} ({})", event.id, worker.name(), worker.mode());
            if worker.mode() != ConcurrencyMode::Inline {
                worker.dispatch(event, self.bot.as_ref()).await;
                continue;
            }

            let work = worker.dispatch(event, self.bot.as_ref());
            tokio::pin!(work);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut work => break,
                    received = self.rx.recv(), if self.backlog.len() < self.backlog_limit => {
                        match received {
                            Some(next) if self.manager.answer(&next) => {}
                            Some(next) => self.backlog.push_back(next),
                            None => {
                                (&mut work).await;
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Answer commands nobody handles with a suggestion or a question mark
    async fn unclaimed(&self, event: &Event) {
        let (Some(name), Some(message)) = (event.command_name(), event.chat_message()) else {
            return;
        };

        let known: Vec<String> = match self.manager.catalog().read() {
            Ok(catalog) => catalog.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        let response = match did_you_mean(&suggest(name, known.iter().map(String::as_str))) {
            Some(text) => Response::reply(&message, text),
            None => Response::reaction(&message, "question"),
        };
        debug!("No plugin for command {:?}", name);

        if let Err(e) = self.bot.send_responses(&[response]).await {
            error!("Failed to answer unknown command: {}", e);
        }
    }
}

/// Lifecycle failures are reported, never fatal to the loop
fn log_lifecycle(result: Result<(), RuntimeError>, action: &str, target: &str) {
    match result {
        Ok(()) => info!("Finished {} of {}", action, target),
        Err(e) => error!("Failed to {} {}: {}", action, target, e),
    }
}
