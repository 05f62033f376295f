//! Runtime side of the bridge: hosts the agents, obeys controller commands
//! and notifies the controller of everything its agents do.

use super::{is_valid_id, Command, CommandWriter, DeltaKind, LineCodec, StepKind};
use crate::debugger::{
    Channel, DebugEvent, DebugObject, DebugObserver, DebugQuery, ObservableDebugger, RunMode,
    SourceInfo,
};
use crate::directory::{DebugSession, EntityKind, SessionController};
use crate::errors::{DebuggerResult, ProtocolError, ProtocolResult};
use crate::kr::{parse_term, MentalStateCondition};
use crate::mental_state::{Base, Change};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

pub struct RuntimeBridge {
    session: Arc<DebugSession>,
    controller: SessionController,
    writer: CommandWriter,
    writer_task: JoinHandle<()>,
    reply_timeout: Duration,
}

impl RuntimeBridge {
    /// Claim the session's main controller role and start writing to `output`.
    pub fn new<W>(session: Arc<DebugSession>, output: W, reply_timeout: Duration) -> ProtocolResult<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let controller = session.main_controller("bridge")?;
        let (writer, writer_task) = CommandWriter::spawn(output);
        Ok(Self {
            session,
            controller,
            writer,
            writer_task,
            reply_timeout,
        })
    }

    pub fn session(&self) -> &Arc<DebugSession> {
        &self.session
    }

    /// Forward `debugger`'s events to the controller and announce the entity.
    /// Call before the agent starts running so no event is missed.
    pub fn attach(
        &self,
        id: &str,
        kind: EntityKind,
        debugger: &Arc<ObservableDebugger>,
    ) -> ProtocolResult<()> {
        if !is_valid_id(id) {
            return Err(ProtocolError::Malformed(format!("{:?} is not a valid id", id)));
        }
        let observer = Arc::new(BridgeObserver::new(id, self.writer.clone()));
        debugger.subscribe_all(observer);
        let announcement = match kind {
            EntityKind::Agent => Command::Launched { id: id.to_string() },
            EntityKind::Environment => Command::EnvCreated { id: id.to_string() },
        };
        self.writer.send(announcement)
    }

    /// Process controller commands until `STOP` or end of input, then kill
    /// every agent and close the output.
    pub async fn serve<R>(self, input: R) -> ProtocolResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = FramedRead::new(input, LineCodec::new());
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(Ok(line)) => line,
                Ok(Err(e)) => {
                    warn!("Ignoring controller line: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Controller stream failed: {}", e);
                    break;
                }
            };
            match Command::parse(&line) {
                Ok(Command::Stop) => {
                    info!("Controller requested stop");
                    break;
                }
                Ok(command) => self.dispatch(command),
                Err(e) => warn!("Ignoring controller line: {}", e),
            }
        }
        self.shutdown().await;
        Ok(())
    }

    fn dispatch(&self, command: Command) {
        debug!("<- {}", command);
        let result = match command {
            Command::Run { id } => self.controller.run(&id),
            Command::Pause { id } => self.controller.pause(&id),
            Command::Step { id, kind: StepKind::Fine } => self.controller.finestep(&id),
            Command::Step { id, kind: StepKind::Coarse } => self.controller.step(&id),
            Command::Breaks { id, breakpoints } => self.controller.set_breakpoints(&id, breakpoints),
            Command::Eval { id, payload } => {
                let query = MentalStateCondition::parse(&payload)
                    .map(DebugQuery::Evaluate)
                    .map_err(|e| e.to_string());
                self.answer(id, query, |id, payload| Command::Eval { id, payload })
            }
            Command::HistoryState { id, .. } => self.answer(id, Ok(DebugQuery::HistoryState), |id, payload| {
                Command::HistoryState { id, payload }
            }),
            Command::WhyAction { id, payload } => {
                let query = parse_term(&payload)
                    .map(DebugQuery::WhyAction)
                    .map_err(|e| e.to_string());
                self.answer(id, query, |id, payload| Command::WhyAction { id, payload })
            }
            Command::WhyNotAction { id, payload } => {
                let query = parse_term(&payload)
                    .map(DebugQuery::WhyNotAction)
                    .map_err(|e| e.to_string());
                self.answer(id, query, |id, payload| Command::WhyNotAction { id, payload })
            }
            other => {
                warn!("Unexpected {} from controller", other.name());
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("Controller command failed: {}", e);
        }
    }

    /// Post a query and reply once the agent thread answered. Every request
    /// gets exactly one reply, an error text if need be.
    fn answer<F>(&self, id: String, query: Result<DebugQuery, String>, reply: F) -> DebuggerResult<()>
    where
        F: FnOnce(String, String) -> Command + Send + 'static,
    {
        let writer = self.writer.clone();
        let query = match query {
            Ok(query) => query,
            Err(e) => {
                let _ = writer.send(reply(id, format!("error: {}", e)));
                return Ok(());
            }
        };
        let receiver = match self.controller.query(&id, query) {
            Ok(receiver) => receiver,
            Err(e) => {
                let _ = writer.send(reply(id, format!("error: {}", e)));
                return Ok(());
            }
        };
        let timeout = self.reply_timeout;
        tokio::spawn(async move {
            let payload = match receiver.recv(timeout).await {
                Ok(answer) => answer,
                Err(e) => format!("error: {}", e),
            };
            let _ = writer.send(reply(id, payload));
        });
        Ok(())
    }

    async fn shutdown(self) {
        self.session.close();
        self.writer.close();
        if let Err(e) = self.writer_task.await {
            warn!("Bridge writer ended abnormally: {}", e);
        }
    }
}

/// Translates one entity's debug events into notifications.
struct BridgeObserver {
    id: String,
    writer: CommandWriter,
    /// Description and location of the last located event, reported on suspension
    last_location: Mutex<Option<(String, SourceInfo)>>,
}

impl BridgeObserver {
    fn new(id: &str, writer: CommandWriter) -> Self {
        Self {
            id: id.to_string(),
            writer,
            last_location: Mutex::new(None),
        }
    }

    fn translate(&self, event: &DebugEvent) -> Vec<Command> {
        let id = self.id.clone();
        match (&event.object, event.channel) {
            (DebugObject::RunMode { from, to }, _) => {
                let mut commands = vec![Command::RunMode { id: id.clone(), mode: *to }];
                match to {
                    // a query ending leaves the agent where it was suspended
                    RunMode::Paused if *from != RunMode::Querying => {
                        if let Some((description, source)) = self.last_location.lock().clone() {
                            commands.push(Command::SuspendAt {
                                id,
                                description,
                                source,
                            });
                        }
                    }
                    RunMode::Killed => commands.push(Command::Killed { id }),
                    _ => {}
                }
                commands
            }
            (DebugObject::BaseChange { base, change, term }, _) => vec![Command::Delta {
                id,
                kind: delta_kind(*base, *change),
                term: term.to_string(),
            }],
            (DebugObject::Module(module), Channel::ModuleEntry) => vec![Command::ModuleEntry {
                id,
                module: module.clone(),
            }],
            (DebugObject::Module(module), Channel::ModuleExit) => vec![Command::ModuleExit {
                id,
                module: module.clone(),
            }],
            (DebugObject::Module(module), Channel::Focus) => vec![Command::Focus {
                id,
                module: module.clone(),
            }],
            (_, Channel::Print) => vec![Command::Log {
                id,
                text: event.message.clone(),
            }],
            (_, Channel::Warning) => vec![Command::Log {
                id,
                text: format!("WARNING: {}", event.message),
            }],
            (_, Channel::ActionPrecondEvaluation | Channel::RuleConditionEvaluation) => {
                vec![Command::RuleEvaluation {
                    id,
                    text: event.message.clone(),
                }]
            }
            _ => Vec::new(),
        }
    }
}

impl DebugObserver for BridgeObserver {
    fn name(&self) -> String {
        format!("bridge:{}", self.id)
    }

    fn notify_breakpoint_hit(&self, event: &DebugEvent) -> bool {
        if let Some(location) = &event.location {
            *self.last_location.lock() = Some((event.message.clone(), location.clone()));
        }
        for command in self.translate(event) {
            if self.writer.send(command).is_err() {
                debug!("Bridge closed, dropping notifications for {}", self.id);
                break;
            }
        }
        true
    }
}

fn delta_kind(base: Base, change: Change) -> DeltaKind {
    match (base, change) {
        (Base::Beliefs, Change::Added) => DeltaKind::InsertedBel,
        (Base::Beliefs, _) => DeltaKind::DeletedBel,
        (Base::Goals, Change::Added) => DeltaKind::Adopted,
        (Base::Goals, Change::Removed) => DeltaKind::Dropped,
        (Base::Goals, Change::Achieved) => DeltaKind::Achieved,
        (Base::Percepts, Change::Added) => DeltaKind::InsertedPercept,
        (Base::Percepts, _) => DeltaKind::DeletedPercept,
        (Base::Mails, Change::Added) => DeltaKind::InsertedMail,
        (Base::Mails, _) => DeltaKind::DeletedMail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::Checkpoint;
    use crate::kr::Term;

    #[tokio::test]
    async fn test_pause_reports_suspension_point() {
        let (writer, _task) = CommandWriter::spawn(tokio::io::sink());
        let observer = BridgeObserver::new("a1", writer);

        let executed = Checkpoint::new(Channel::ActionExecutedBuiltin, DebugObject::None, "performed %s")
            .arg("insert(p)")
            .at(Some(SourceInfo::new("a1.toml", 5)));
        observer.notify_breakpoint_hit(&DebugEvent::from_checkpoint(RunMode::Running, "a1", &executed));

        let pause = Checkpoint::new(
            Channel::RunMode,
            DebugObject::RunMode { from: RunMode::Running, to: RunMode::Paused },
            "run mode",
        );
        let commands = observer.translate(&DebugEvent::from_checkpoint(RunMode::Running, "a1", &pause));
        assert_eq!(commands.len(), 2);
        match &commands[1] {
            Command::SuspendAt { description, source, .. } => {
                assert_eq!(description, "performed insert(p)");
                assert_eq!(source.line, 5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_end_does_not_repeat_suspension() {
        let (writer, _task) = CommandWriter::spawn(tokio::io::sink());
        let observer = BridgeObserver::new("a1", writer);
        *observer.last_location.lock() = Some(("performed p".to_string(), SourceInfo::new("a1.toml", 3)));

        let back = Checkpoint::new(
            Channel::RunMode,
            DebugObject::RunMode { from: RunMode::Querying, to: RunMode::Paused },
            "run mode",
        );
        let commands = observer.translate(&DebugEvent::from_checkpoint(RunMode::Querying, "a1", &back));
        assert_eq!(commands, vec![Command::RunMode { id: "a1".into(), mode: RunMode::Paused }]);
    }

    #[tokio::test]
    async fn test_attach_rejects_ids_that_break_lines() {
        let session = DebugSession::new();
        let bridge = RuntimeBridge::new(session.clone(), tokio::io::sink(), Duration::from_millis(50)).unwrap();
        let debugger = session.create_debugger("my agent");
        assert!(matches!(
            bridge.attach("my agent", EntityKind::Agent, &debugger),
            Err(ProtocolError::Malformed(_))
        ));
        assert_eq!(debugger.observer_count(Channel::RunMode), 0);
    }

    #[tokio::test]
    async fn test_base_changes_become_deltas() {
        let (writer, _task) = CommandWriter::spawn(tokio::io::sink());
        let observer = BridgeObserver::new("a1", writer);
        let cp = Checkpoint::new(
            Channel::GoalAchieved,
            DebugObject::BaseChange {
                base: Base::Goals,
                change: Change::Achieved,
                term: Term::atom("home"),
            },
            "achieved %s",
        );
        let commands = observer.translate(&DebugEvent::from_checkpoint(RunMode::Running, "a1", &cp));
        assert_eq!(commands[0].to_line(), "ACHIEVED a1 home");
    }
}
