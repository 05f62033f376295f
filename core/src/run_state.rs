//! Per-agent execution context: mental state, debugger hookup, history,
//! messaging and environment boundary.

use crate::action::{Action, ActionKind, ActionLibrary, Mood};
use crate::debugger::{
    Channel, Checkpoint, DebugObject, DebugQuery, ObservableDebugger, QueryTarget,
};
use crate::errors::{ActionResult, DebuggerResult};
use crate::kr::{unify, Term};
use crate::mental_state::{
    Base, Change, Delta, InMemoryMentalState, MentalState, MentalStateSnapshot,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// EXECUTION EVENTS
// ============================================================================

/// Something the execution pipeline reports to the run state.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    CycleStarted { cycle: u64 },
    ModuleEntry { module: String },
    ModuleExit { module: String },
    Focus { module: String },
    PreconditionEvaluated { action: Action, holds: bool },
    ActionExecuted { action: Action },
    StateChanged(Delta),
    Printed(String),
    Warning(String),
}

impl ExecutionEvent {
    /// Channel an executed action is reported on.
    pub fn action_channel(action: &Action) -> Channel {
        match action.kind() {
            ActionKind::Send => Channel::ActionExecutedMessaging,
            ActionKind::UserSpec(_) => Channel::ActionExecutedUserspec,
            _ => Channel::ActionExecutedBuiltin,
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        match self {
            ExecutionEvent::CycleStarted { cycle } => Checkpoint::new(
                Channel::ReasoningCycleSeparator,
                DebugObject::None,
                "+++++++ Cycle %s +++++++",
            )
            .arg(cycle),
            ExecutionEvent::ModuleEntry { module } => Checkpoint::new(
                Channel::ModuleEntry,
                DebugObject::Module(module.clone()),
                "entering module %s",
            )
            .arg(module),
            ExecutionEvent::ModuleExit { module } => Checkpoint::new(
                Channel::ModuleExit,
                DebugObject::Module(module.clone()),
                "exiting module %s",
            )
            .arg(module),
            ExecutionEvent::Focus { module } => Checkpoint::new(
                Channel::Focus,
                DebugObject::Module(module.clone()),
                "focused on module %s",
            )
            .arg(module),
            ExecutionEvent::PreconditionEvaluated { action, holds } => Checkpoint::new(
                Channel::ActionPrecondEvaluation,
                DebugObject::Action(action.clone()),
                "precondition %s of %s %s",
            )
            .arg(action.precondition())
            .arg(action)
            .arg(if *holds { "holds" } else { "does not hold" })
            .at(action.source().cloned()),
            ExecutionEvent::ActionExecuted { action } => Checkpoint::new(
                Self::action_channel(action),
                DebugObject::Action(action.clone()),
                "performed %s",
            )
            .arg(action)
            .at(action.source().cloned()),
            ExecutionEvent::StateChanged(delta) => {
                let (channel, template) = match (delta.base, delta.change) {
                    (Base::Beliefs, Change::Added) => (Channel::BbUpdates, "inserted %s into belief base"),
                    (Base::Beliefs, _) => (Channel::BbUpdates, "deleted %s from belief base"),
                    (Base::Goals, Change::Added) => (Channel::GbUpdates, "adopted %s"),
                    (Base::Goals, Change::Removed) => (Channel::GbUpdates, "dropped %s"),
                    (Base::Goals, Change::Achieved) => (Channel::GoalAchieved, "achieved goal %s"),
                    (Base::Percepts, Change::Added) => (Channel::Percepts, "inserted percept %s"),
                    (Base::Percepts, _) => (Channel::Percepts, "deleted percept %s"),
                    (Base::Mails, Change::Added) => (Channel::Mails, "inserted mail %s"),
                    (Base::Mails, _) => (Channel::Mails, "deleted mail %s"),
                };
                Checkpoint::new(
                    channel,
                    DebugObject::BaseChange {
                        base: delta.base,
                        change: delta.change,
                        term: delta.term.clone(),
                    },
                    template,
                )
                .arg(&delta.term)
            }
            ExecutionEvent::Printed(text) => {
                Checkpoint::new(Channel::Print, DebugObject::Text(text.clone()), "%s").arg(text)
            }
            ExecutionEvent::Warning(text) => {
                Checkpoint::new(Channel::Warning, DebugObject::Text(text.clone()), "%s").arg(text)
            }
        }
    }
}

// ============================================================================
// RUN STATE BOUNDARY
// ============================================================================

/// What the execution pipeline needs from the agent it runs for.
pub trait RunState {
    fn agent_name(&self) -> &str;

    fn mental_state(&self) -> &dyn MentalState;

    fn mental_state_mut(&mut self) -> &mut dyn MentalState;

    /// Report an event to the debugger; `Err(Killed)` means the agent must stop.
    fn report(&mut self, event: ExecutionEvent) -> DebuggerResult<()>;

    fn is_cycle_active(&self) -> bool;

    /// Forward an external action to the environment.
    fn perform_external(&mut self, action: &Action) -> Result<(), String>;

    fn send_message(&mut self, message: Message) -> Result<(), String>;
}

// ============================================================================
// MESSAGING AND ENVIRONMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: String,
    pub recipient: String,
    pub mood: Mood,
    pub content: Term,
}

impl Message {
    /// The mail term stored in the receiver's mail base.
    pub fn received_term(&self) -> Term {
        Term::compound(
            "received",
            vec![Term::atom(&self.sender), self.content.clone()],
        )
    }

    /// The mail term stored in the sender's mail base.
    pub fn sent_term(&self) -> Term {
        Term::compound(
            "sent",
            vec![Term::atom(&self.recipient), self.content.clone()],
        )
    }
}

/// In-process mail delivery between agents of one runtime.
#[derive(Clone, Default)]
pub struct Mailboxes {
    inner: Arc<DashMap<String, Vec<Message>>>,
}

impl Mailboxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, message: Message) {
        self.inner
            .entry(message.recipient.clone())
            .or_default()
            .push(message);
    }

    pub fn take(&self, agent: &str) -> Vec<Message> {
        self.inner
            .get_mut(agent)
            .map(|mut inbox| std::mem::take(&mut *inbox))
            .unwrap_or_default()
    }
}

/// Boundary to whatever environment the agents act in.
pub trait Environment: Send {
    fn perform(&mut self, agent: &str, action: &Action) -> Result<(), String>;

    fn percepts(&mut self, agent: &str) -> Vec<Term>;
}

/// Environment that accepts every action and records it.
#[derive(Clone, Default)]
pub struct RecordingEnvironment {
    performed: Arc<Mutex<Vec<(String, String)>>>,
    percepts: Arc<Mutex<Vec<Term>>>,
}

impl RecordingEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_percepts(&self, percepts: Vec<Term>) {
        *self.percepts.lock() = percepts;
    }

    /// `(agent, action)` pairs in the order they were performed.
    pub fn performed(&self) -> Vec<(String, String)> {
        self.performed.lock().clone()
    }
}

impl Environment for RecordingEnvironment {
    fn perform(&mut self, agent: &str, action: &Action) -> Result<(), String> {
        self.performed
            .lock()
            .push((agent.to_string(), action.to_string()));
        Ok(())
    }

    fn percepts(&mut self, _agent: &str) -> Vec<Term> {
        self.percepts.lock().clone()
    }
}

// ============================================================================
// HISTORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Executed,
    NotEnabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub cycle: u64,
    pub action: Term,
    pub precondition: String,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

/// Bounded record of action decisions, newest last.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl ExecutionHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn record(&mut self, cycle: u64, action: &Action, outcome: Outcome) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            cycle,
            action: action.to_term(),
            precondition: action.precondition().to_string(),
            outcome,
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn latest_matching(&self, action: &Term, outcome: Option<Outcome>) -> Option<&HistoryEntry> {
        self.entries.iter().rev().find(|e| {
            outcome.map_or(true, |o| e.outcome == o) && unify(action, &e.action).is_some()
        })
    }

    pub fn why(&self, action: &Term) -> String {
        match self.latest_matching(action, Some(Outcome::Executed)) {
            Some(e) => format!(
                "{} was executed in cycle {} because its precondition {} held",
                e.action, e.cycle, e.precondition
            ),
            None => format!("{} has not been executed", action),
        }
    }

    pub fn why_not(&self, action: &Term) -> String {
        match self.latest_matching(action, None) {
            Some(e) if e.outcome == Outcome::NotEnabled => format!(
                "{} was not executed in cycle {} because its precondition {} did not hold",
                e.action, e.cycle, e.precondition
            ),
            Some(e) => format!("{} was executed in cycle {}", e.action, e.cycle),
            None => format!("{} has not been considered", action),
        }
    }
}

#[derive(Serialize)]
struct HistoryView<'a> {
    agent: &'a str,
    cycle: u64,
    state: MentalStateSnapshot,
    history: Vec<&'a HistoryEntry>,
}

struct AgentQueries<'a> {
    name: &'a str,
    cycle: u64,
    mental: &'a InMemoryMentalState,
    history: &'a ExecutionHistory,
}

impl QueryTarget for AgentQueries<'_> {
    fn answer(&mut self, query: &DebugQuery) -> Result<String, String> {
        match query {
            DebugQuery::Evaluate(condition) => {
                let answers = self.mental.query(condition).map_err(|e| e.to_string())?;
                Ok(match answers.as_slice() {
                    [] => "false".to_string(),
                    [only] if only.is_empty() => "true".to_string(),
                    _ => answers
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                })
            }
            DebugQuery::HistoryState => {
                let view = HistoryView {
                    agent: self.name,
                    cycle: self.cycle,
                    state: self.mental.snapshot(),
                    history: self.history.entries().collect(),
                };
                serde_json::to_string(&view).map_err(|e| e.to_string())
            }
            DebugQuery::WhyAction(action) => Ok(self.history.why(action)),
            DebugQuery::WhyNotAction(action) => Ok(self.history.why_not(action)),
        }
    }
}

// ============================================================================
// AGENT RUN STATE
// ============================================================================

pub struct AgentRunState {
    name: String,
    mental: InMemoryMentalState,
    debugger: Option<Arc<ObservableDebugger>>,
    history: ExecutionHistory,
    library: ActionLibrary,
    mailboxes: Mailboxes,
    environment: Option<Box<dyn Environment>>,
    cycle: u64,
    cycle_active: bool,
}

impl AgentRunState {
    pub fn new(name: &str, mental: InMemoryMentalState) -> Self {
        Self {
            name: name.to_string(),
            mental,
            debugger: None,
            history: ExecutionHistory::new(100),
            library: ActionLibrary::new(),
            mailboxes: Mailboxes::new(),
            environment: None,
            cycle: 0,
            cycle_active: false,
        }
    }

    pub fn with_debugger(mut self, debugger: Arc<ObservableDebugger>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history = ExecutionHistory::new(limit);
        self
    }

    pub fn with_library(mut self, library: ActionLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn with_mailboxes(mut self, mailboxes: Mailboxes) -> Self {
        self.mailboxes = mailboxes;
        self
    }

    pub fn with_environment(mut self, environment: Box<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn mental(&self) -> &InMemoryMentalState {
        &self.mental
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    pub fn library(&self) -> &ActionLibrary {
        &self.library
    }

    pub fn debugger(&self) -> Option<&Arc<ObservableDebugger>> {
        self.debugger.as_ref()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Start the next reasoning cycle: report the separator, then deliver
    /// incoming mail and this cycle's percepts.
    pub fn begin_cycle(&mut self) -> ActionResult<()> {
        self.cycle += 1;
        self.cycle_active = true;
        self.report(ExecutionEvent::CycleStarted { cycle: self.cycle })?;

        for message in self.mailboxes.take(&self.name) {
            let deltas = self.mental.add_mail(message.received_term())?;
            self.report_deltas(deltas)?;
        }
        if let Some(env) = self.environment.as_mut() {
            let percepts = env.percepts(&self.name);
            let deltas = self.mental.set_percepts(percepts)?;
            self.report_deltas(deltas)?;
        }
        Ok(())
    }

    pub fn end_cycle(&mut self) {
        self.cycle_active = false;
    }

    pub fn report_deltas(&mut self, deltas: Vec<Delta>) -> DebuggerResult<()> {
        for delta in deltas {
            self.report(ExecutionEvent::StateChanged(delta))?;
        }
        Ok(())
    }

    fn record(&mut self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::PreconditionEvaluated {
                action,
                holds: false,
            } => self.history.record(self.cycle, action, Outcome::NotEnabled),
            ExecutionEvent::ActionExecuted { action } => {
                self.history.record(self.cycle, action, Outcome::Executed)
            }
            ExecutionEvent::Printed(text) => info!(agent = %self.name, "{}", text),
            ExecutionEvent::Warning(text) => warn!(agent = %self.name, "{}", text),
            _ => {}
        }
    }
}

impl RunState for AgentRunState {
    fn agent_name(&self) -> &str {
        &self.name
    }

    fn mental_state(&self) -> &dyn MentalState {
        &self.mental
    }

    fn mental_state_mut(&mut self) -> &mut dyn MentalState {
        &mut self.mental
    }

    fn report(&mut self, event: ExecutionEvent) -> DebuggerResult<()> {
        self.record(&event);
        let Some(debugger) = &self.debugger else {
            return Ok(());
        };
        let mut queries = AgentQueries {
            name: &self.name,
            cycle: self.cycle,
            mental: &self.mental,
            history: &self.history,
        };
        debugger.breakpoint(&event.checkpoint(), &mut queries)
    }

    fn is_cycle_active(&self) -> bool {
        self.cycle_active
    }

    fn perform_external(&mut self, action: &Action) -> Result<(), String> {
        match self.environment.as_mut() {
            Some(env) => env.perform(&self.name, action),
            None => Err("no environment attached".to_string()),
        }
    }

    fn send_message(&mut self, message: Message) -> Result<(), String> {
        debug!("{} -> {}: {}", message.sender, message.recipient, message.content);
        self.mailboxes.deliver(message);
        Ok(())
    }
}
