//! Controller side of the bridge.
//!
//! Mirrors the remote runtime's agents as proxy entries in a local session,
//! sends commands, and matches solicited replies to the requests awaiting them.

use super::{Command, CommandWriter, LineCodec, PendingReplies, ReplyKind, StepKind};
use crate::config::DebuggerConfig;
use crate::debugger::{Breakpoint, RunMode};
use crate::directory::{DebugSession, EntityKind};
use crate::errors::{ProtocolError, ProtocolResult};
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

/// Creates the local stand-in for an entity announced by the runtime.
pub trait ProcessSpawner: Send + Sync {
    /// Start whatever registers `id` in `session`. Registration may complete
    /// asynchronously.
    fn spawn(&self, id: &str, kind: EntityKind, session: Arc<DebugSession>) -> ProtocolResult<()>;
}

/// Registers a proxy debugger in `REMOTEPROCESS` mode from its own thread.
pub struct ProxySpawner;

impl ProcessSpawner for ProxySpawner {
    fn spawn(&self, id: &str, kind: EntityKind, session: Arc<DebugSession>) -> ProtocolResult<()> {
        let name = id.to_string();
        std::thread::Builder::new()
            .name(format!("proxy-{}", id))
            .spawn(move || {
                let debugger = session.create_debugger(&name);
                debugger.set_run_mode(RunMode::RemoteProcess);
                session.register(&name, kind, debugger, Some(std::thread::current().id()));
            })
            .map(|_| ())
            .map_err(|e| ProtocolError::SpawnFailed(id.to_string(), e.to_string()))
    }
}

pub struct ControllerBridge {
    session: Arc<DebugSession>,
    writer: CommandWriter,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<PendingReplies>,
    modes: Arc<DashMap<String, RunMode>>,
    reply_timeout: Duration,
}

impl ControllerBridge {
    /// Start the read and write loops. Notifications received from the runtime
    /// are forwarded to `events`.
    pub fn connect<R, W>(
        input: R,
        output: W,
        session: Arc<DebugSession>,
        spawner: Arc<dyn ProcessSpawner>,
        events: mpsc::UnboundedSender<Command>,
        config: &DebuggerConfig,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer, writer_task) = CommandWriter::spawn(output);
        let pending = Arc::new(PendingReplies::new());
        let modes = Arc::new(DashMap::new());

        let reader = ReadLoop {
            session: session.clone(),
            spawner,
            pending: pending.clone(),
            modes: modes.clone(),
            events,
            registration_timeout: config.registration_timeout(),
        };
        let reader_task = tokio::spawn(reader.run(input));

        Self {
            session,
            writer,
            writer_task: Mutex::new(Some(writer_task)),
            reader_task: Mutex::new(Some(reader_task)),
            pending,
            modes,
            reply_timeout: config.reply_timeout(),
        }
    }

    pub fn session(&self) -> &Arc<DebugSession> {
        &self.session
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    pub fn run(&self, id: &str) -> ProtocolResult<()> {
        self.writer.send(Command::Run { id: id.to_string() })
    }

    pub fn pause(&self, id: &str) -> ProtocolResult<()> {
        self.writer.send(Command::Pause { id: id.to_string() })
    }

    pub fn step(&self, id: &str, kind: StepKind) -> ProtocolResult<()> {
        self.writer.send(Command::Step {
            id: id.to_string(),
            kind,
        })
    }

    pub fn set_breakpoints(&self, id: &str, breakpoints: Vec<Breakpoint>) -> ProtocolResult<()> {
        self.writer.send(Command::Breaks {
            id: id.to_string(),
            breakpoints,
        })
    }

    // ========================================================================
    // REQUESTS
    // ========================================================================

    /// Evaluate a mental-state condition in the agent's current state.
    pub async fn evaluate(&self, id: &str, condition: &str) -> ProtocolResult<String> {
        let command = Command::Eval {
            id: id.to_string(),
            payload: condition.to_string(),
        };
        self.request(ReplyKind::Eval, id, command).await
    }

    pub async fn history_state(&self, id: &str) -> ProtocolResult<String> {
        let command = Command::HistoryState {
            id: id.to_string(),
            payload: String::new(),
        };
        self.request(ReplyKind::HistoryState, id, command).await
    }

    pub async fn why_action(&self, id: &str, action: &str) -> ProtocolResult<String> {
        let command = Command::WhyAction {
            id: id.to_string(),
            payload: action.to_string(),
        };
        self.request(ReplyKind::Explanation, id, command).await
    }

    pub async fn why_not_action(&self, id: &str, action: &str) -> ProtocolResult<String> {
        let command = Command::WhyNotAction {
            id: id.to_string(),
            payload: action.to_string(),
        };
        self.request(ReplyKind::Explanation, id, command).await
    }

    async fn request(&self, kind: ReplyKind, id: &str, command: Command) -> ProtocolResult<String> {
        let receiver = self.pending.expect(kind, id)?;
        self.writer.send(command)?;
        receiver.recv(self.reply_timeout).await
    }

    /// Last run mode the runtime reported for `id`.
    pub fn agent_run_mode(&self, id: &str) -> RunMode {
        self.modes.get(id).map(|m| *m).unwrap_or(RunMode::Unknown)
    }

    /// Ask the runtime to stop, wait for it to close its stream, then close
    /// the session.
    pub async fn stop(&self) -> ProtocolResult<()> {
        let sent = self.writer.send(Command::Stop);
        self.writer.close();

        let reader = self.reader_task.lock().take();
        if let Some(reader) = reader {
            if sent.is_ok() && tokio::time::timeout(self.reply_timeout, reader).await.is_err() {
                warn!("Runtime did not close its stream after STOP");
            }
        }
        let writer = self.writer_task.lock().take();
        if let Some(writer) = writer {
            let _ = writer.await;
        }
        self.pending.cancel_all();
        self.session.close();
        sent
    }
}

struct ReadLoop {
    session: Arc<DebugSession>,
    spawner: Arc<dyn ProcessSpawner>,
    pending: Arc<PendingReplies>,
    modes: Arc<DashMap<String, RunMode>>,
    events: mpsc::UnboundedSender<Command>,
    registration_timeout: Duration,
}

impl ReadLoop {
    async fn run<R>(self, input: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = FramedRead::new(input, LineCodec::new());
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(Ok(line)) => line,
                Ok(Err(e)) => {
                    warn!("Ignoring runtime line: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Runtime stream failed: {}", e);
                    break;
                }
            };
            match Command::parse(&line) {
                Ok(command) => {
                    if let Err(e) = self.handle(command).await {
                        warn!("{}", e);
                    }
                }
                Err(e) => warn!("Ignoring runtime line: {}", e),
            }
        }
        info!("Runtime closed the bridge");
        self.pending.cancel_all();
        self.session.close();
    }

    async fn handle(&self, command: Command) -> ProtocolResult<()> {
        debug!("<- {}", command);
        match &command {
            Command::Launched { id } => self.register(id, EntityKind::Agent).await?,
            Command::EnvCreated { id } => self.register(id, EntityKind::Environment).await?,
            Command::RunMode { id, mode } => {
                self.modes.insert(id.clone(), *mode);
            }
            Command::Killed { id } => {
                self.modes.insert(id.clone(), RunMode::Killed);
            }
            Command::Eval { id, payload } => {
                return self.pending.fulfill(ReplyKind::Eval, id, payload.clone());
            }
            Command::HistoryState { id, payload } => {
                return self.pending.fulfill(ReplyKind::HistoryState, id, payload.clone());
            }
            Command::WhyAction { id, payload } | Command::WhyNotAction { id, payload } => {
                return self.pending.fulfill(ReplyKind::Explanation, id, payload.clone());
            }
            Command::Run { .. }
            | Command::Pause { .. }
            | Command::Step { .. }
            | Command::Breaks { .. }
            | Command::Stop => {
                warn!("Unexpected {} from runtime", command.name());
                return Ok(());
            }
            _ => {}
        }
        // nobody listening is fine
        let _ = self.events.send(command);
        Ok(())
    }

    /// Spawn the proxy for a newly announced entity and wait, bounded, until it
    /// registered. Later lines are not processed before that.
    async fn register(&self, id: &str, kind: EntityKind) -> ProtocolResult<()> {
        if !self.session.contains(id) {
            self.spawner.spawn(id, kind, self.session.clone())?;
        }
        self.session
            .wait_for_registration(id, self.registration_timeout)
            .await
            .map(|_| ())
            .map_err(|_| {
                ProtocolError::RegistrationTimeout(
                    id.to_string(),
                    self.registration_timeout.as_millis() as u64,
                )
            })
    }
}
