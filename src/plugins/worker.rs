//! Workers - Run a plugin's handler under its concurrency mode

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::application::errors::RuntimeError;
use crate::domain::entities::{Event, Response};
use crate::domain::traits::Bot;
use crate::plugins::process::ProcessUnit;
use crate::plugins::trait_def::{ConcurrencyMode, Plugin};

/// Reply sent to the requester when a handler fails
pub fn failure_responses(event: &Event) -> Vec<Response> {
    match event.chat_message() {
        Some(msg) => vec![Response::reply(
            &msg,
            format!(
                "Sorry, {}, an error occurred while executing your request.",
                msg.sender.display_name()
            ),
        )],
        None => Vec::new(),
    }
}

/// Run the handler as its own task so a panic stays inside it.
///
/// On failure returns the error text and the responses telling the
/// requester about it.
pub async fn run_handler(
    plugin: &Arc<dyn Plugin>,
    event: &Event,
) -> Result<Vec<Response>, (String, Vec<Response>)> {
    let task_plugin = Arc::clone(plugin);
    let task_event = event.clone();
    let result = tokio::spawn(async move { task_plugin.handle(&task_event).await }).await;

    match result {
        Ok(Ok(responses)) => Ok(responses),
        Ok(Err(e)) => {
            error!("Plugin {} failed on event {}: {}", plugin.name(), event.id, e);
            Err((e.to_string(), failure_responses(event)))
        }
        Err(e) => {
            error!("Plugin {} panicked on event {}: {}", plugin.name(), event.id, e);
            Err((format!("handler panicked: {}", e), failure_responses(event)))
        }
    }
}

/// Hand `event` to a handler of `plugin` waiting on its exchange key.
/// Returns whether the event was consumed.
pub fn answer_exchange(plugin: &Arc<dyn Plugin>, event: &Event) -> bool {
    let Some(id) = plugin.exchange_key(event) else {
        return false;
    };
    let ctx = plugin.context();
    if !ctx.has_exchange(&id) {
        return false;
    }
    debug!("Event {} answers exchange {} of {}", event.id, id, plugin.name());
    ctx.deliver_exchange(&id, event.clone())
}

async fn handle_and_deliver(plugin: &Arc<dyn Plugin>, event: &Event, bot: &dyn Bot) {
    let responses = match run_handler(plugin, event).await {
        Ok(responses) => responses,
        Err((_, responses)) => responses,
    };
    if responses.is_empty() {
        return;
    }
    if let Err(e) = bot.send_responses(&responses).await {
        error!("Failed to deliver responses of {}: {}", plugin.name(), e);
    }
}

/// Send on a bounded channel, waiting for room when it is full
pub(crate) async fn enqueue<T>(name: &str, tx: &mpsc::Sender<T>, item: T) -> bool {
    match tx.try_send(item) {
        Ok(()) => true,
        Err(TrySendError::Full(item)) => {
            warn!("Queue of {} is full; dispatch waits for it", name);
            tx.send(item).await.is_ok()
        }
        Err(TrySendError::Closed(_)) => {
            warn!("Queue of {} is closed; event dropped", name);
            false
        }
    }
}

enum Job {
    Event(Event),
    Stop,
}

enum Unit {
    Inline,
    Thread {
        tx: mpsc::Sender<Job>,
        handle: std::thread::JoinHandle<()>,
    },
    Process(ProcessUnit),
}

/// A started plugin together with its execution unit
pub struct Worker {
    plugin: Arc<dyn Plugin>,
    unit: Unit,
}

impl Worker {
    /// Handler runs on the dispatch loop
    pub fn inline(plugin: Arc<dyn Plugin>) -> Self {
        Self {
            plugin,
            unit: Unit::Inline,
        }
    }

    /// Handler runs on its own thread, fed through a bounded channel
    pub fn thread(
        plugin: Arc<dyn Plugin>,
        bot: Arc<dyn Bot>,
        capacity: usize,
    ) -> Result<Self, RuntimeError> {
        let name = plugin.name().to_string();
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RuntimeError::Spawn {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        let thread_plugin = Arc::clone(&plugin);
        let handle = std::thread::Builder::new()
            .name(format!("plugin-{}", name))
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(job) = rx.recv().await {
                        match job {
                            Job::Event(event) => {
                                handle_and_deliver(&thread_plugin, &event, bot.as_ref()).await
                            }
                            Job::Stop => break,
                        }
                    }
                    thread_plugin.shutdown().await;
                    debug!("Thread of {} finished", thread_plugin.name());
                });
            })
            .map_err(|e| RuntimeError::Spawn {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        info!("Started thread for {}", name);
        Ok(Self {
            plugin,
            unit: Unit::Thread { tx, handle },
        })
    }

    /// Handler runs in a child process; `plugin` only answers the
    /// responsibility question here
    pub fn process(plugin: Arc<dyn Plugin>, unit: ProcessUnit) -> Self {
        Self {
            plugin,
            unit: Unit::Process(unit),
        }
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub fn mode(&self) -> ConcurrencyMode {
        match self.unit {
            Unit::Inline => ConcurrencyMode::Inline,
            Unit::Thread { .. } => ConcurrencyMode::Thread,
            Unit::Process(_) => ConcurrencyMode::Process,
        }
    }

    pub fn is_responsible(&self, event: &Event) -> bool {
        self.plugin.is_responsible(event)
    }

    /// Complete a pending exchange in this process. Process units wait in
    /// the child, which answers from its own input.
    pub fn answer(&self, event: &Event) -> bool {
        match self.unit {
            Unit::Inline | Unit::Thread { .. } => answer_exchange(&self.plugin, event),
            Unit::Process(_) => false,
        }
    }

    /// Hand `event` to the plugin. Inline handlers finish before this
    /// returns; thread and process units only queue the event.
    pub async fn dispatch(&self, event: &Event, bot: &dyn Bot) {
        match &self.unit {
            Unit::Inline => handle_and_deliver(&self.plugin, event, bot).await,
            Unit::Thread { tx, .. } => {
                enqueue(self.name(), tx, Job::Event(event.clone())).await;
            }
            Unit::Process(unit) => {
                unit.send(event.clone()).await;
            }
        }
    }

    /// Stop the unit and wait for it to finish
    pub async fn stop(self) {
        let name = self.name().to_string();
        match self.unit {
            Unit::Inline => self.plugin.shutdown().await,
            Unit::Thread { tx, handle } => {
                if tx.send(Job::Stop).await.is_err() {
                    debug!("Thread of {} already gone", name);
                }
                match tokio::task::spawn_blocking(move || handle.join()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => error!("Thread of {} panicked", name),
                    Err(e) => error!("Failed to join thread of {}: {}", name, e),
                }
            }
            Unit::Process(unit) => unit.stop().await,
        }
        info!("Stopped {}", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::{BotError, PluginError};
    use crate::domain::entities::{ChatMessage, Recipient, User, ROOT_SENDER};
    use crate::domain::traits::BotInfo;
    use crate::plugins::context::{LoopbackSender, PluginContext};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Bot for Recorder {
        async fn start(&self) -> Result<(), BotError> {
            Ok(())
        }

        async fn send_message(&self, _to: &Recipient, text: &str) -> Result<(), BotError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn add_reaction(&self, _id: &str, emoji: &str) -> Result<(), BotError> {
            self.sent.lock().unwrap().push(format!(":{}:", emoji));
            Ok(())
        }

        fn bot_info(&self) -> BotInfo {
            BotInfo {
                id: "1".into(),
                name: "Courier".into(),
            }
        }
    }

    struct Flaky {
        ctx: PluginContext,
    }

    #[async_trait]
    impl Plugin for Flaky {
        fn context(&self) -> &PluginContext {
            &self.ctx
        }

        async fn handle(&self, event: &Event) -> Result<Vec<Response>, PluginError> {
            let msg = event.chat_message().unwrap();
            match msg.content.as_str() {
                "panic" => panic!("boom"),
                "fail" => Err(PluginError::Handler("nope".into())),
                other => Ok(vec![Response::reply(&msg, other.to_string())]),
            }
        }
    }

    fn flaky() -> Arc<dyn Plugin> {
        let (tx, _rx) = mpsc::channel(1);
        let ctx = PluginContext::new(
            "flaky",
            vec!["message".into()],
            Recorder::default().bot_info(),
            LoopbackSender::new(tx),
        );
        Arc::new(Flaky { ctx })
    }

    fn event(text: &str) -> Event {
        Event::message(ROOT_SENDER, &ChatMessage::private(User::new("7").with_name("Jane"), text))
    }

    #[tokio::test]
    async fn test_inline_failures_are_contained() {
        let bot = Recorder::default();
        let worker = Worker::inline(flaky());
        worker.dispatch(&event("hi"), &bot).await;
        worker.dispatch(&event("fail"), &bot).await;
        worker.dispatch(&event("panic"), &bot).await;
        worker.dispatch(&event("still here"), &bot).await;

        let sent = bot.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0], "hi");
        assert!(sent[1].starts_with("Sorry, Jane"));
        assert!(sent[2].starts_with("Sorry, Jane"));
        assert_eq!(sent[3], "still here");
    }

    #[tokio::test]
    async fn test_thread_unit_processes_in_order() {
        let bot = Arc::new(Recorder::default());
        let worker = Worker::thread(flaky(), bot.clone(), 2).unwrap();
        assert_eq!(worker.mode(), ConcurrencyMode::Thread);
        for text in ["a", "b", "panic", "c", "d"] {
            worker.dispatch(&event(text), bot.as_ref()).await;
        }
        worker.stop().await;

        let sent = bot.sent.lock().unwrap().clone();
        assert_eq!(sent[0], "a");
        assert_eq!(sent[1], "b");
        assert!(sent[2].starts_with("Sorry"));
        assert_eq!(&sent[3..], ["c", "d"]);
    }

    #[tokio::test]
    async fn test_enqueue_reports_closed() {
        let (tx, rx) = mpsc::channel::<u8>(1);
        assert!(enqueue("t", &tx, 1).await);
        drop(rx);
        assert!(!enqueue("t", &tx, 2).await);
    }
}
