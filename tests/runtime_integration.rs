//! End-to-end tests of the dispatch loop with the builtin plugins

use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;

use courier_bot::application::errors::BotError;
use courier_bot::domain::entities::{ChatMessage, Event, Recipient, User, ROOT_SENDER};
use courier_bot::domain::traits::{Bot, BotInfo};
use courier_bot::plugins::builtin;
use courier_bot::plugins::{
    ConcurrencyMode, LoopState, ManagerSettings, PluginDescriptor, Privileges, Runtime,
    RuntimeSettings,
};

static LOGGING: Once = Once::new();

fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<String>>,
}

impl Recorder {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    async fn wait_for(&self, needle: &str) {
        for _ in 0..200 {
            if self.sent().iter().any(|s| s.contains(needle)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never saw {:?} in {:?}", needle, self.sent());
    }
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

    async fn add_reaction(&self, _message_id: &str, emoji: &str) -> Result<(), BotError> {
        self.sent.lock().unwrap().push(format!(":{}:", emoji));
        Ok(())
    }

    fn bot_info(&self) -> BotInfo {
        BotInfo {
            id: "1".to_string(),
            name: "Courier".to_string(),
        }
    }
}

const ADMIN: &str = "9";

fn settings() -> RuntimeSettings {
    RuntimeSettings {
        queue_capacity: 64,
        prefix: "!".to_string(),
        manager: ManagerSettings {
            worker_capacity: 8,
            process_host: Some(PathBuf::from(env!("CARGO_BIN_EXE_courier-bot"))),
            disabled: Vec::new(),
            privileges: Arc::new(Privileges::new(vec![ADMIN.to_string()], Vec::new())),
        },
    }
}

fn builtins(echo_mode: ConcurrencyMode) -> Vec<PluginDescriptor> {
    builtin::descriptors()
        .into_iter()
        .map(|d| if d.name == "echo" { d.with_mode(echo_mode) } else { d })
        .collect()
}

fn private(sender: &str, text: &str) -> Event {
    let user = User::new(sender).with_name("Jane");
    Event::message(ROOT_SENDER, &ChatMessage::private(user, text))
}

#[tokio::test]
async fn test_builtins_across_concurrency_modes() {
    init_logging();
    let bot = Arc::new(Recorder::default());
    let mut runtime = Runtime::new(settings(), bot.clone());
    for d in builtins(ConcurrencyMode::Process) {
        runtime.register(d).unwrap();
    }
    let handle = runtime.handle();

    handle.send(private("7", "echo lowercase 'HELLO World'")).await.unwrap();
    handle.send(private("7", "help echo")).await.unwrap();
    handle.send(private("7", "")).await.unwrap();
    handle.send(private("7", "ecco")).await.unwrap();
    let stream = ChatMessage::stream(User::new("7"), "general", "chat", "nobody asked");
    handle.send(Event::message(ROOT_SENDER, &stream)).await.unwrap();
    handle.stop().await.unwrap();

    let exit = runtime.run().await.unwrap();
    assert!(!exit.restart_requested);
    assert_eq!(handle.state(), LoopState::Stopped);

    let sent = bot.sent();
    assert_eq!(sent.len(), 4, "{:?}", sent);
    assert!(sent.contains(&"hello world".to_string()));
    assert!(sent.contains(&":wave:".to_string()));
    assert!(sent.contains(&"Did you mean `echo`?".to_string()));
    assert!(sent.iter().any(|s| s.contains("echo lowercase <text>")));
}

#[tokio::test]
async fn test_restart_requires_admin() {
    init_logging();
    let bot = Arc::new(Recorder::default());
    let mut runtime = Runtime::new(settings(), bot.clone());
    for d in builtins(ConcurrencyMode::Inline) {
        runtime.register(d).unwrap();
    }
    let handle = runtime.handle();

    handle.send(private("7", "restart")).await.unwrap();
    handle.send(private(ADMIN, "restart")).await.unwrap();
    handle.send(private("7", "echo lowercase QUEUED")).await.unwrap();

    let exit = runtime.run().await.unwrap();
    assert!(exit.restart_requested);
    assert_eq!(exit.dropped, 0);

    // the restart event queues behind the message that was already waiting
    let sent = bot.sent();
    assert!(sent[0].contains("sufficient privileges"));
    assert_eq!(&sent[1..], [":ok:", "queued"]);
}

#[tokio::test]
async fn test_unload_through_plugins_command() {
    init_logging();
    let bot = Arc::new(Recorder::default());
    let mut runtime = Runtime::new(settings(), bot.clone());
    for d in builtins(ConcurrencyMode::Inline) {
        runtime.register(d).unwrap();
    }
    let mut handle = runtime.handle();
    let running = tokio::spawn(runtime.run());

    handle.send(private("7", "echo lowercase A")).await.unwrap();
    bot.wait_for("a").await;

    handle.send(private(ADMIN, "plugins unload echo")).await.unwrap();
    bot.wait_for(":ok:").await;

    handle.send(private("7", "echo lowercase B")).await.unwrap();
    handle.send(Event::start("test", "echo")).await.unwrap();
    handle.send(private("7", "echo lowercase C")).await.unwrap();
    handle.stop().await.unwrap();

    let exit = running.await.unwrap().unwrap();
    assert_eq!(exit.dropped, 0);
    handle.stopped().await;

    let sent = bot.sent();
    assert_eq!(sent, vec!["a", ":ok:", ":question:", "c"]);
}

#[tokio::test]
async fn test_disabled_builtin_leaves_the_rest_running() {
    init_logging();
    let bot = Arc::new(Recorder::default());
    let mut settings = settings();
    settings.manager.disabled = vec!["echo".to_string()];
    let mut runtime = Runtime::new(settings, bot.clone());
    for d in builtin::descriptors() {
        runtime.register(d).unwrap();
    }
    let handle = runtime.handle();

    handle.send(private("7", "echo lowercase X")).await.unwrap();
    handle.send(private("7", "help")).await.unwrap();
    handle.stop().await.unwrap();

    let exit = runtime.run().await.unwrap();
    assert_eq!(exit.dropped, 0);

    let sent = bot.sent();
    assert_eq!(sent.len(), 2, "{:?}", sent);
    assert!(sent.contains(&":question:".to_string()));
    let overview = sent.iter().find(|s| s.starts_with("Hi Jane!")).unwrap();
    assert!(overview.contains("- `restart`"));
    assert!(!overview.contains("`echo`"));
}
