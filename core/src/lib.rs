// goalrt: execution-control core of a BDI agent runtime
// Debugger state machine, action execution and the controller bridge

pub mod action;
pub mod config;
pub mod debugger;
pub mod directory;
pub mod errors;
pub mod executor;
pub mod kr;
pub mod mental_state;
pub mod protocol;
pub mod run_state;
pub mod runner;

// Re-export commonly used types
pub use errors::{
    ActionError, ActionResult, ConfigError, ConfigResult, DebuggerError, DebuggerResult,
    MentalStateError, MentalStateResult, ParseError, ParseResult, ProtocolError, ProtocolResult,
};

pub use kr::{parse_term, parse_terms, unify, MentalStateCondition, Substitution, Term, Update};

pub use action::{Action, ActionKind, ActionLibrary, ActionSpecification, Mood};

pub use debugger::{
    Breakpoint, BreakpointKind, Channel, Checkpoint, DebugEvent, DebugObject, DebugObserver,
    DebugQuery, EventRecorder, ObservableDebugger, QueryTarget, RunMode, SourceInfo,
    SteppingDebugger,
};

pub use directory::{DebugSession, DirectoryEntry, EntityKind, EntityState, SessionController};

pub use executor::{ActionExecutor, ExecutionResult};

pub use mental_state::{Base, Change, Delta, InMemoryMentalState, MentalState};

pub use run_state::{
    AgentRunState, Environment, ExecutionEvent, Mailboxes, Message, RecordingEnvironment, RunState,
};

pub use protocol::{Command, ControllerBridge, ProxySpawner, RuntimeBridge, StepKind};

pub use config::{ConfigManager, DebuggerConfig, GoalrtConfig, LoggingConfig, RuntimeConfig};

pub use runner::{AgentDefinition, AgentFile, AgentHandle, AgentOutcome, AgentProgram, AgentRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
