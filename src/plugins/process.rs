//! Process host - Runs a plugin in a child process
//!
//! Parent and child exchange newline-delimited JSON. The parent writes
//! `HostRequest`s to the child's stdin and reads `HostReply`s from its
//! stdout; the child logs to stderr only.
//!
//! ```text
//! parent -> {"op":"init","seed":{..}}
//! child  <- {"op":"ready"}
//! parent -> {"op":"event","event":{..}}
//! child  <- {"op":"loopback","event":{..}}      (any number)
//! child  <- {"op":"responses","event_id":"..","responses":[..]}
//! parent -> {"op":"stop"}
//! child  <- {"op":"done"}
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::errors::{PluginError, RuntimeError};
use crate::domain::entities::{Event, Response};
use crate::domain::traits::Bot;
use crate::plugins::context::{ContextSeed, LoopbackSender, PluginContext};
use crate::plugins::trait_def::{Plugin, PluginDescriptor};
use crate::plugins::worker::{answer_exchange, enqueue, run_handler};

/// Parent to child
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum HostRequest {
    Init { seed: ContextSeed },
    Event { event: Event },
    Stop,
}

/// Child to parent
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum HostReply {
    Ready,
    Responses {
        event_id: String,
        responses: Vec<Response>,
    },
    Loopback {
        event: Event,
    },
    Failed {
        event_id: String,
        error: String,
        #[serde(default)]
        responses: Vec<Response>,
    },
    Done,
}

async fn write_line<W, T>(writer: &mut W, msg: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Parent side of a process unit
pub struct ProcessUnit {
    name: String,
    tx: mpsc::Sender<HostRequest>,
    task: JoinHandle<()>,
}

impl ProcessUnit {
    /// Spawn `program plugin-host <name>` and attach to its pipes
    pub fn spawn(
        program: &Path,
        seed: ContextSeed,
        capacity: usize,
        bot: Arc<dyn Bot>,
        loopback: LoopbackSender,
    ) -> Result<Self, RuntimeError> {
        let name = seed.name.clone();
        let spawn_err = |reason: String| RuntimeError::Spawn {
            name: name.clone(),
            reason,
        };

        let mut child = Command::new(program)
            .arg("plugin-host")
            .arg(&name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_err(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_err("child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err("child has no stdout".to_string()))?;

        info!("Spawned process host for {} (pid {:?})", name, child.id());
        Ok(Self::attach(seed, stdout, stdin, Some(child), capacity, bot, loopback))
    }

    /// Drive a host over arbitrary pipes
    pub fn attach<R, W>(
        seed: ContextSeed,
        reader: R,
        writer: W,
        child: Option<Child>,
        capacity: usize,
        bot: Arc<dyn Bot>,
        loopback: LoopbackSender,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let name = seed.name.clone();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(supervise(name.clone(), seed, reader, writer, rx, child, bot, loopback));
        Self { name, tx, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue an event for the child; waits while the queue is full
    pub async fn send(&self, event: Event) -> bool {
        enqueue(&self.name, &self.tx, HostRequest::Event { event }).await
    }

    /// Ask the child to stop and wait until it has exited
    pub async fn stop(self) {
        if self.tx.send(HostRequest::Stop).await.is_err() {
            debug!("Process host {} already gone", self.name);
        }
        if let Err(e) = self.task.await {
            error!("Supervisor of {} failed: {}", self.name, e);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn supervise<R, W>(
    name: String,
    seed: ContextSeed,
    reader: R,
    mut writer: W,
    mut rx: mpsc::Receiver<HostRequest>,
    child: Option<Child>,
    bot: Arc<dyn Bot>,
    loopback: LoopbackSender,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer_name = name.clone();
    let writer_task = tokio::spawn(async move {
        if let Err(e) = write_line(&mut writer, &HostRequest::Init { seed }).await {
            error!("Failed to initialise process host {}: {}", writer_name, e);
            return;
        }
        while let Some(request) = rx.recv().await {
            let stop = matches!(request, HostRequest::Stop);
            if let Err(e) = write_line(&mut writer, &request).await {
                warn!("Process host {} stopped accepting events: {}", writer_name, e);
                break;
            }
            if stop {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                warn!("Process host {} closed its output", name);
                break;
            }
            Err(e) => {
                error!("Failed to read from process host {}: {}", name, e);
                break;
            }
        };

        let reply = match serde_json::from_str::<HostReply>(&line) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Unreadable line from process host {}: {}", name, e);
                continue;
            }
        };

        match reply {
            HostReply::Ready => info!("Process host {} ready", name),
            HostReply::Responses {
                event_id,
                responses,
            } => {
                debug!("{} answered event {}", name, event_id);
                deliver(&name, bot.as_ref(), &responses).await;
            }
            HostReply::Loopback { event } => {
                if let Err(e) = loopback.push(event).await {
                    warn!("Dropped loopback event from {}: {}", name, e);
                }
            }
            HostReply::Failed {
                event_id,
                error,
                responses,
            } => {
                error!("Plugin {} failed on event {}: {}", name, event_id, error);
                deliver(&name, bot.as_ref(), &responses).await;
            }
            HostReply::Done => {
                debug!("Process host {} done", name);
                break;
            }
        }
    }

    if let Err(e) = writer_task.await {
        error!("Writer of {} failed: {}", name, e);
    }
    if let Some(mut child) = child {
        match child.wait().await {
            Ok(status) => info!("Process host {} exited with {}", name, status),
            Err(e) => error!("Failed to wait for process host {}: {}", name, e),
        }
    }
}

async fn deliver(name: &str, bot: &dyn Bot, responses: &[Response]) {
    if responses.is_empty() {
        return;
    }
    if let Err(e) = bot.send_responses(responses).await {
        error!("Failed to deliver responses of {}: {}", name, e);
    }
}

/// Child side: build plugin `name` from `registry` and serve requests
/// until `stop` or end of input
pub async fn run_host<R, W>(
    registry: &[PluginDescriptor],
    name: &str,
    reader: R,
    mut writer: W,
) -> Result<(), PluginError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    let seed = match next_request(&mut lines).await? {
        Some(HostRequest::Init { seed }) => seed,
        Some(other) => {
            return Err(PluginError::InvalidPayload(format!(
                "expected init, got {:?}",
                other
            )))
        }
        None => return Ok(()),
    };

    let descriptor = registry
        .iter()
        .find(|d| d.name == name)
        .ok_or_else(|| PluginError::Unavailable(format!("no plugin named {}", name)))?;

    let (tx, loopback_rx) = mpsc::channel(64);
    let ctx = PluginContext::from_seed(seed, LoopbackSender::new(tx));
    let plugin = descriptor.build(ctx)?;

    write_line(&mut writer, &HostReply::Ready).await?;
    serve(plugin, loopback_rx, &mut lines, &mut writer).await
}

async fn next_request<B>(lines: &mut tokio::io::Lines<B>) -> Result<Option<HostRequest>, PluginError>
where
    B: AsyncBufRead + Unpin,
{
    loop {
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        if line.trim().is_empty() {
            continue;
        }
        return serde_json::from_str(&line)
            .map(Some)
            .map_err(|e| PluginError::InvalidPayload(e.to_string()));
    }
}

/// Requests a child reads ahead while its handler is busy
const READ_AHEAD: usize = 64;

async fn serve<B, W>(
    plugin: Arc<dyn Plugin>,
    mut loopback_rx: mpsc::Receiver<Event>,
    lines: &mut tokio::io::Lines<B>,
    writer: &mut W,
) -> Result<(), PluginError>
where
    B: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut backlog = VecDeque::new();
    loop {
        let request = match backlog.pop_front() {
            Some(request) => request,
            None => tokio::select! {
                request = next_request(lines) => match request {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Ignoring request: {}", e);
                        continue;
                    }
                },
                Some(event) = loopback_rx.recv() => {
                    write_line(writer, &HostReply::Loopback { event }).await?;
                    continue;
                }
            },
        };

        match request {
            HostRequest::Event { event } => {
                let reply =
                    handle_event(&plugin, &event, &mut loopback_rx, lines, writer, &mut backlog)
                        .await?;
                forward_loopback(&mut loopback_rx, writer).await?;
                write_line(writer, &reply).await?;
            }
            HostRequest::Init { .. } => warn!("Ignoring repeated init"),
            HostRequest::Stop => break,
        }
    }

    plugin.shutdown().await;
    forward_loopback(&mut loopback_rx, writer).await?;
    write_line(writer, &HostReply::Done).await?;
    Ok(())
}

/// Run the handler for `event`. Requests read in the meantime either
/// answer a pending exchange or are kept in `backlog`.
async fn handle_event<B, W>(
    plugin: &Arc<dyn Plugin>,
    event: &Event,
    loopback_rx: &mut mpsc::Receiver<Event>,
    lines: &mut tokio::io::Lines<B>,
    writer: &mut W,
    backlog: &mut VecDeque<HostRequest>,
) -> Result<HostReply, PluginError>
where
    B: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reading = !backlog.iter().any(|r| matches!(r, HostRequest::Stop));
    let work = run_handler(plugin, event);
    tokio::pin!(work);

    let result = loop {
        tokio::select! {
            biased;
            result = &mut work => break result,
            Some(looped) = loopback_rx.recv() => {
                write_line(writer, &HostReply::Loopback { event: looped }).await?;
            }
            request = next_request(lines), if reading && backlog.len() < READ_AHEAD => {
                match request {
                    Ok(Some(HostRequest::Event { event: next })) if answer_exchange(plugin, &next) => {}
                    Ok(Some(HostRequest::Stop)) | Ok(None) => {
                        reading = false;
                        backlog.push_back(HostRequest::Stop);
                    }
                    Ok(Some(other)) => backlog.push_back(other),
                    Err(e) => warn!("Ignoring request: {}", e),
                }
            }
        }
    };

    Ok(match result {
        Ok(responses) => HostReply::Responses {
            event_id: event.id.clone(),
            responses,
        },
        Err((error, responses)) => HostReply::Failed {
            event_id: event.id.clone(),
            error,
            responses,
        },
    })
}

async fn forward_loopback<W>(rx: &mut mpsc::Receiver<Event>, writer: &mut W) -> Result<(), PluginError>
where
    W: AsyncWrite + Unpin,
{
    while let Ok(event) = rx.try_recv() {
        write_line(writer, &HostReply::Loopback { event }).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ChatMessage, EventKind, User, ROOT_SENDER};
    use crate::domain::traits::BotInfo;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::duplex;

    struct Shout {
        ctx: PluginContext,
    }

    #[async_trait]
    impl Plugin for Shout {
        fn context(&self) -> &PluginContext {
            &self.ctx
        }

        async fn handle(&self, event: &Event) -> Result<Vec<Response>, PluginError> {
            let msg = event
                .chat_message()
                .ok_or_else(|| PluginError::InvalidPayload("no message".into()))?;
            if msg.content == "fail" {
                return Err(PluginError::Handler("asked to fail".into()));
            }
            self.ctx.loopback().push(Event::reload(self.ctx.name())).await.ok();
            Ok(vec![Response::reply(&msg, msg.content.to_uppercase())])
        }
    }

    fn registry() -> Vec<PluginDescriptor> {
        vec![PluginDescriptor::new("shout", |ctx| {
            Ok(Arc::new(Shout { ctx }) as Arc<dyn Plugin>)
        })]
    }

    fn seed() -> ContextSeed {
        seed_named("shout")
    }

    fn seed_named(name: &str) -> ContextSeed {
        ContextSeed {
            name: name.to_string(),
            event_kinds: vec!["message".to_string()],
            bot: BotInfo {
                id: "1".to_string(),
                name: "Courier".to_string(),
            },
            privileges: Default::default(),
            catalog: BTreeMap::new(),
        }
    }

    async fn read_reply<B: AsyncBufRead + Unpin>(lines: &mut tokio::io::Lines<B>) -> HostReply {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_host_protocol() {
        let (parent, child) = duplex(4096);
        let (child_read, child_write) = tokio::io::split(child);
        let host = tokio::spawn(async move {
            run_host(&registry(), "shout", child_read, child_write).await
        });

        let (parent_read, mut parent_write) = tokio::io::split(parent);
        let mut lines = BufReader::new(parent_read).lines();

        write_line(&mut parent_write, &HostRequest::Init { seed: seed() }).await.unwrap();
        assert!(matches!(read_reply(&mut lines).await, HostReply::Ready));

        let msg = ChatMessage::private(User::new("7"), "hello");
        let event = Event::message(ROOT_SENDER, &msg);
        write_line(&mut parent_write, &HostRequest::Event { event: event.clone() })
            .await
            .unwrap();

        match read_reply(&mut lines).await {
            HostReply::Loopback { event } => assert_eq!(event.kind, EventKind::Reload),
            other => panic!("unexpected: {:?}", other),
        }
        match read_reply(&mut lines).await {
            HostReply::Responses { event_id, responses } => {
                assert_eq!(event_id, event.id);
                assert_eq!(responses[0].content(), Some("HELLO"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let failing = Event::message(ROOT_SENDER, &ChatMessage::private(User::new("7"), "fail"));
        write_line(&mut parent_write, &HostRequest::Event { event: failing })
            .await
            .unwrap();
        match read_reply(&mut lines).await {
            HostReply::Failed { error, responses, .. } => {
                assert!(error.contains("asked to fail"));
                assert_eq!(responses.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }

        write_line(&mut parent_write, &HostRequest::Stop).await.unwrap();
        assert!(matches!(read_reply(&mut lines).await, HostReply::Done));
        host.await.unwrap().unwrap();
    }

    /// Waits for exchange `q` on `question`, echoes anything else
    struct Waiter {
        ctx: PluginContext,
    }

    #[async_trait]
    impl Plugin for Waiter {
        fn context(&self) -> &PluginContext {
            &self.ctx
        }

        async fn handle(&self, event: &Event) -> Result<Vec<Response>, PluginError> {
            let msg = event.chat_message().unwrap();
            if msg.content != "question" {
                return Ok(vec![Response::reply(&msg, msg.content.clone())]);
            }
            let text = match self.ctx.await_exchange("q", Duration::from_secs(5)).await {
                Some(answer) => format!("answer: {}", answer.chat_message().unwrap().content),
                None => "timed out".to_string(),
            };
            Ok(vec![Response::reply(&msg, text)])
        }
    }

    #[tokio::test]
    async fn test_host_answers_exchange_while_handler_waits() {
        let slot: Arc<Mutex<Option<PluginContext>>> = Arc::default();
        let factory_slot = Arc::clone(&slot);
        let registry = vec![PluginDescriptor::new("waiter", move |ctx| {
            *factory_slot.lock().unwrap() = Some(ctx.clone());
            Ok(Arc::new(Waiter { ctx }) as Arc<dyn Plugin>)
        })];

        let (parent, child) = duplex(4096);
        let (child_read, child_write) = tokio::io::split(child);
        let host = tokio::spawn(async move {
            run_host(&registry, "waiter", child_read, child_write).await
        });
        let (parent_read, mut parent_write) = tokio::io::split(parent);
        let mut lines = BufReader::new(parent_read).lines();

        write_line(&mut parent_write, &HostRequest::Init { seed: seed_named("waiter") })
            .await
            .unwrap();
        assert!(matches!(read_reply(&mut lines).await, HostReply::Ready));

        let user = User::new("7");
        let question = Event::message(ROOT_SENDER, &ChatMessage::private(user.clone(), "question"));
        write_line(&mut parent_write, &HostRequest::Event { event: question.clone() })
            .await
            .unwrap();

        for _ in 0..400 {
            let waiting = slot
                .lock()
                .unwrap()
                .as_ref()
                .map_or(false, |ctx| ctx.has_exchange("q"));
            if waiting {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let answer = Event::message(ROOT_SENDER, &ChatMessage::private(user.clone(), "yes"))
            .with_correlation("q");
        let after = Event::message(ROOT_SENDER, &ChatMessage::private(user, "after"));
        for event in [answer, after] {
            write_line(&mut parent_write, &HostRequest::Event { event }).await.unwrap();
        }
        write_line(&mut parent_write, &HostRequest::Stop).await.unwrap();

        match read_reply(&mut lines).await {
            HostReply::Responses { event_id, responses } => {
                assert_eq!(event_id, question.id);
                assert_eq!(responses[0].content(), Some("answer: yes"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        match read_reply(&mut lines).await {
            HostReply::Responses { responses, .. } => {
                assert_eq!(responses[0].content(), Some("after"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(read_reply(&mut lines).await, HostReply::Done));
        host.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_plugin() {
        let (parent, child) = duplex(4096);
        let (child_read, child_write) = tokio::io::split(child);
        let (_parent_read, mut parent_write) = tokio::io::split(parent);
        write_line(&mut parent_write, &HostRequest::Init { seed: seed() }).await.unwrap();

        let result = run_host(&registry(), "ghost", child_read, child_write).await;
        assert!(matches!(result, Err(PluginError::Unavailable(_))));
    }

    #[test]
    fn test_wire_format() {
        let line = serde_json::to_string(&HostRequest::Stop).unwrap();
        assert_eq!(line, r#"{"op":"stop"}"#);
        let reply: HostReply = serde_json::from_str(r#"{"op":"done"}"#).unwrap();
        assert!(matches!(reply, HostReply::Done));
    }
}
