//! Agent files and the scripted reasoning loop.
//!
//! An agent file is TOML:
//!
//! ```toml
//! [[agent]]
//! name = "walker"
//! beliefs = ["at(home)"]
//! goals = ["at(shop)"]
//!
//! [[agent.spec]]
//! signature = "move(X, Y)"
//! pre = "bel(at(X))"
//! post_add = "at(Y)"
//! post_del = "at(X)"
//!
//! [[agent.action]]
//! action = "move(home, shop)"
//! line = 12
//! ```
//!
//! Every agent runs on its own OS thread and registers itself in the session
//! directory from that thread.

use crate::action::{Action, ActionKind, ActionLibrary, ActionSpecification};
use crate::config::RuntimeConfig;
use crate::debugger::{ObservableDebugger, SourceInfo};
use crate::directory::{DebugSession, EntityKind};
use crate::errors::{ActionResult, ConfigError, ConfigResult};
use crate::executor::ActionExecutor;
use crate::kr::{parse_term, parse_terms, MentalStateCondition, Substitution, Term, Update};
use crate::mental_state::InMemoryMentalState;
use crate::protocol::is_valid_id;
use crate::run_state::{AgentRunState, Environment, ExecutionEvent, Mailboxes, RunState};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Name of the single module a scripted agent runs.
pub const MAIN_MODULE: &str = "main";

// ============================================================================
// AGENT FILES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentFile {
    #[serde(default, rename = "agent")]
    pub agents: Vec<AgentDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub beliefs: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default, rename = "spec")]
    pub specs: Vec<SpecDefinition>,
    #[serde(default, rename = "action")]
    pub actions: Vec<ActionDefinition>,
}

/// A user-specified action: precondition and postcondition over its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecDefinition {
    pub signature: String,
    #[serde(default)]
    pub pre: Option<String>,
    #[serde(default)]
    pub post_add: Option<String>,
    #[serde(default)]
    pub post_del: Option<String>,
    /// Forwarded to the environment before the postcondition is applied
    #[serde(default)]
    pub external: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub action: String,
    /// Condition the action is guarded by
    #[serde(default)]
    pub pre: Option<String>,
    /// Line reported for breakpoints, defaults to the action's position
    #[serde(default)]
    pub line: Option<u32>,
}

impl AgentFile {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn parse(content: &str, origin: &str) -> ConfigResult<Self> {
        let file: AgentFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        let mut seen = std::collections::HashSet::new();
        for agent in &file.agents {
            if !is_valid_id(&agent.name) {
                return Err(ConfigError::Invalid(format!(
                    "agent name {:?} in {} may not be empty or contain whitespace, control characters or '#'",
                    agent.name, origin
                )));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "agent {} is defined twice in {}",
                    agent.name, origin
                )));
            }
        }
        Ok(file)
    }
}

/// An agent definition with all of its terms parsed.
#[derive(Debug, Clone)]
pub struct AgentProgram {
    pub name: String,
    pub beliefs: Vec<Term>,
    pub goals: Vec<Term>,
    pub library: ActionLibrary,
    pub actions: Vec<Action>,
}

impl AgentDefinition {
    /// Parse every term. `origin` names the file in source locations.
    pub fn compile(&self, origin: &str) -> ConfigResult<AgentProgram> {
        let beliefs = parse_all(&self.beliefs)?;
        let goals = parse_all(&self.goals)?;

        let mut library = ActionLibrary::new();
        for spec in &self.specs {
            library.add_spec(spec.compile()?);
        }

        let mut actions = Vec::with_capacity(self.actions.len());
        for (index, def) in self.actions.iter().enumerate() {
            let term = parse_term(&def.action)?;
            let mut action = Action::from_term(&term, &library)?;
            if let Some(pre) = &def.pre {
                action = action.with_precondition(MentalStateCondition::parse(pre)?);
            }
            let line = def.line.unwrap_or(index as u32 + 1);
            actions.push(action.at(SourceInfo::new(origin, line)));
        }

        Ok(AgentProgram {
            name: self.name.clone(),
            beliefs,
            goals,
            library,
            actions,
        })
    }
}

impl SpecDefinition {
    fn compile(&self) -> ConfigResult<ActionSpecification> {
        let signature = parse_term(&self.signature)?;
        let (name, params) = match &signature {
            Term::Atom(name) => (name.clone(), Vec::new()),
            Term::Compound { functor, args } => (functor.clone(), args.clone()),
            other => {
                return Err(ConfigError::Invalid(format!(
                    "{} is not an action signature",
                    other
                )))
            }
        };
        let mut spec = ActionSpecification::new(&name, params).external(self.external);
        if let Some(pre) = &self.pre {
            spec = spec.with_precondition(MentalStateCondition::parse(pre)?);
        }
        let post = Update {
            add: optional_terms(&self.post_add)?,
            remove: optional_terms(&self.post_del)?,
        };
        Ok(spec.with_postcondition(post))
    }
}

fn parse_all(texts: &[String]) -> ConfigResult<Vec<Term>> {
    texts
        .iter()
        .map(|t| parse_term(t).map_err(ConfigError::from))
        .collect()
}

fn optional_terms(text: &Option<String>) -> ConfigResult<Vec<Term>> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(parse_terms(text)?),
        _ => Ok(Vec::new()),
    }
}

// ============================================================================
// RUNNER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Stopped after the cycle limit or a cycle in which nothing was executed
    Finished { cycles: u64 },
    Killed { cycles: u64 },
    Failed(String),
}

pub struct AgentHandle {
    name: String,
    thread: JoinHandle<AgentOutcome>,
}

impl AgentHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the agent stopped.
    pub fn join(self) -> AgentOutcome {
        self.thread
            .join()
            .unwrap_or_else(|_| AgentOutcome::Failed(format!("agent {} panicked", self.name)))
    }
}

/// Launches agents into a session. Agents of one runner share mailboxes.
pub struct AgentRunner {
    session: Arc<DebugSession>,
    config: RuntimeConfig,
    mailboxes: Mailboxes,
}

impl AgentRunner {
    pub fn new(session: Arc<DebugSession>, config: RuntimeConfig) -> Self {
        Self {
            session,
            config,
            mailboxes: Mailboxes::new(),
        }
    }

    pub fn session(&self) -> &Arc<DebugSession> {
        &self.session
    }

    /// Start `program` on a new thread, checkpointing through `debugger`.
    /// Create the debugger with [`DebugSession::create_debugger`] and attach
    /// observers before launching so no event is missed.
    pub fn launch(
        &self,
        program: AgentProgram,
        debugger: Arc<ObservableDebugger>,
        environment: Option<Box<dyn Environment>>,
    ) -> std::io::Result<AgentHandle> {
        let name = program.name.clone();
        let session = self.session.clone();
        let config = self.config.clone();
        let mailboxes = self.mailboxes.clone();

        let thread = std::thread::Builder::new()
            .name(format!("agent-{}", name))
            .spawn(move || {
                let mental = match InMemoryMentalState::with_contents(
                    program.beliefs.clone(),
                    program.goals.clone(),
                ) {
                    Ok(mental) => mental,
                    Err(e) => return AgentOutcome::Failed(e.to_string()),
                };
                session.register(
                    &program.name,
                    EntityKind::Agent,
                    debugger.clone(),
                    Some(std::thread::current().id()),
                );

                let mut state = AgentRunState::new(&program.name, mental)
                    .with_debugger(debugger)
                    .with_history_limit(config.history_limit)
                    .with_library(program.library.clone())
                    .with_mailboxes(mailboxes);
                if let Some(environment) = environment {
                    state = state.with_environment(environment);
                }

                info!("Agent {} started", program.name);
                let outcome = run_agent(&program, &mut state, &config);
                info!("Agent {} stopped: {:?}", program.name, outcome);
                outcome
            })?;

        Ok(AgentHandle { name, thread })
    }
}

fn run_agent(program: &AgentProgram, state: &mut AgentRunState, config: &RuntimeConfig) -> AgentOutcome {
    let focus = ExecutionEvent::Focus {
        module: MAIN_MODULE.to_string(),
    };
    match state.report(focus) {
        Ok(()) => {}
        Err(e) if e.is_killed() => return AgentOutcome::Killed { cycles: 0 },
        Err(e) => return AgentOutcome::Failed(e.to_string()),
    }
    loop {
        if config.max_cycles > 0 && state.cycle() >= config.max_cycles {
            return AgentOutcome::Finished {
                cycles: state.cycle(),
            };
        }
        match run_cycle(program, state) {
            Ok(true) => {}
            Ok(false) => {
                debug!("{}: nothing executed in cycle {}", program.name, state.cycle());
                return AgentOutcome::Finished {
                    cycles: state.cycle(),
                };
            }
            Err(e) if e.is_killed() => {
                return AgentOutcome::Killed {
                    cycles: state.cycle(),
                }
            }
            Err(e) => return AgentOutcome::Failed(e.to_string()),
        }
        let delay = config.cycle_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Run one cycle; true if some action other than `exit-module` was performed.
fn run_cycle(program: &AgentProgram, state: &mut AgentRunState) -> ActionResult<bool> {
    state.begin_cycle()?;
    state.report(ExecutionEvent::ModuleEntry {
        module: MAIN_MODULE.to_string(),
    })?;

    let mut executed = false;
    for action in &program.actions {
        match try_action(state, action) {
            Ok(Some(kind)) => {
                if matches!(kind, ActionKind::ExitModule) {
                    break;
                }
                executed = true;
            }
            Ok(None) => {}
            Err(e) if e.is_killed() => return Err(e),
            Err(e) => {
                warn!(agent = %program.name, "{}", e);
                state.report(ExecutionEvent::Warning(e.to_string()))?;
            }
        }
    }

    state.report(ExecutionEvent::ModuleExit {
        module: MAIN_MODULE.to_string(),
    })?;
    state.end_cycle();
    Ok(executed)
}

/// Evaluate the action's precondition and perform it when enabled. Returns the
/// kind of the performed action.
fn try_action(state: &mut AgentRunState, action: &Action) -> ActionResult<Option<ActionKind>> {
    let Some(answer) = ActionExecutor::new(action.clone(), Substitution::new())
        .evaluate_precondition(state)?
    else {
        return Ok(None);
    };
    let result = ActionExecutor::new(action.clone(), answer).perform(state)?;
    Ok(result.performed.then(|| result.action.kind().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::RunMode;

    const WALKER: &str = r#"
[[agent]]
name = "walker"
beliefs = ["at(home)"]
goals = ["at(shop)"]

[[agent.spec]]
signature = "move(X, Y)"
pre = "bel(at(X))"
post_add = "at(Y)"
post_del = "at(X)"

[[agent.action]]
action = "move(X, shop)"
pre = "bel(at(X)), a-goal(at(shop))"
line = 12
"#;

    #[test]
    fn test_compile_agent_file() {
        let file = AgentFile::parse(WALKER, "walker.toml").unwrap();
        let program = file.agents[0].compile("walker.toml").unwrap();
        assert_eq!(program.beliefs, vec![parse_term("at(home)").unwrap()]);
        assert!(program.library.spec("move", 2).is_some());
        let action = &program.actions[0];
        assert!(matches!(action.kind(), ActionKind::UserSpec(_)));
        assert_eq!(action.source().map(|s| s.line), Some(12));
    }

    #[test]
    fn test_duplicate_agent_names_rejected() {
        let text = "[[agent]]\nname = \"a\"\n[[agent]]\nname = \"a\"\n";
        assert!(matches!(
            AgentFile::parse(text, "dup.toml"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_agent_names_must_fit_on_the_wire() {
        for name in ["my agent", "a\\nRUN b", "a#b", ""] {
            let text = format!("[[agent]]\nname = \"{}\"\n", name);
            assert!(
                matches!(AgentFile::parse(&text, "bad.toml"), Err(ConfigError::Invalid(_))),
                "{:?} accepted",
                name
            );
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let text = "[[agent]]\nname = \"a\"\n[[agent.action]]\naction = \"fly(away)\"\n";
        let file = AgentFile::parse(text, "a.toml").unwrap();
        assert!(matches!(
            file.agents[0].compile("a.toml"),
            Err(ConfigError::Term(_))
        ));
    }

    #[test]
    fn test_agent_reaches_goal_and_stops() {
        let session = DebugSession::new();
        let program = AgentFile::parse(WALKER, "walker.toml").unwrap().agents[0]
            .compile("walker.toml")
            .unwrap();
        let runner = AgentRunner::new(session.clone(), RuntimeConfig::default());
        let debugger = session.create_debugger("walker");

        let outcome = runner.launch(program, debugger, None).unwrap().join();
        // moved in cycle 1, nothing enabled in cycle 2
        assert_eq!(outcome, AgentOutcome::Finished { cycles: 2 });
        assert!(session.contains("walker"));
    }

    #[test]
    fn test_agent_focuses_on_main_once() {
        let session = DebugSession::new();
        let program = AgentFile::parse(WALKER, "walker.toml").unwrap().agents[0]
            .compile("walker.toml")
            .unwrap();
        let debugger = session.create_debugger("walker");
        let recorder = Arc::new(crate::debugger::EventRecorder::new());
        debugger.subscribe(recorder.clone(), crate::debugger::Channel::Focus);

        let handle = AgentRunner::new(session, RuntimeConfig::default())
            .launch(program, debugger, None)
            .unwrap();
        assert!(matches!(handle.join(), AgentOutcome::Finished { .. }));
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "focused on module main");
    }

    #[test]
    fn test_killed_agent_stops() {
        let session = DebugSession::new();
        let text = "[[agent]]\nname = \"chatty\"\n[[agent.action]]\naction = \"print(hello)\"\n";
        let program = AgentFile::parse(text, "c.toml").unwrap().agents[0]
            .compile("c.toml")
            .unwrap();
        let config = RuntimeConfig {
            max_cycles: 0,
            cycle_delay_ms: 1,
            ..RuntimeConfig::default()
        };
        let runner = AgentRunner::new(session.clone(), config);
        let debugger = session.create_debugger("chatty");
        let handle = runner.launch(program, debugger.clone(), None).unwrap();

        debugger.kill();
        assert!(matches!(handle.join(), AgentOutcome::Killed { .. }));
        assert_eq!(debugger.run_mode(), RunMode::Killed);
    }
}
