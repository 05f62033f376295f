/// Error types for the goalrt execution-control core.
use thiserror::Error;

/// Errors raised by debuggers and the session directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebuggerError {
    /// The debugger was killed; raised at the next checkpoint of the agent thread.
    #[error("Agent {0} was killed")]
    Killed(String),

    #[error("Debugger {0} is not the main debugger of this session")]
    NotMainDebugger(String),

    #[error("No debugger registered for: {0}")]
    NotFound(String),

    #[error("Query could not be answered: {0}")]
    QueryFailed(String),

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("Debug session closed")]
    SessionClosed,
}

impl DebuggerError {
    pub fn is_killed(&self) -> bool {
        matches!(self, DebuggerError::Killed(_))
    }
}

/// Result type for debugger operations.
pub type DebuggerResult<T> = Result<T, DebuggerError>;

/// Errors raised by a mental state while querying or updating its bases.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MentalStateError {
    #[error("Cannot store non-ground term {0}")]
    NotGround(String),

    #[error("Cannot query an unbound formula: {0}")]
    Unbound(String),
}

pub type MentalStateResult<T> = Result<T, MentalStateError>;

/// Errors raised while evaluating or executing an action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Action {action} is not closed, free variables: {}", free.join(", "))]
    NotClosed { action: String, free: Vec<String> },

    #[error("Precondition of {action} could not be evaluated: {reason}")]
    PreconditionFailed { action: String, reason: String },

    #[error("Postcondition of {action} could not be applied: {reason}")]
    PostconditionFailed { action: String, reason: String },

    #[error("Module call {0} cannot be executed directly")]
    ModuleCallNotExecutable(String),

    #[error("External action {action} failed: {reason}")]
    ExternalFailed { action: String, reason: String },

    #[error(transparent)]
    MentalState(#[from] MentalStateError),

    #[error(transparent)]
    Debugger(#[from] DebuggerError),
}

impl ActionError {
    /// Kill signals must never be caught and retried by callers.
    pub fn is_killed(&self) -> bool {
        matches!(self, ActionError::Debugger(e) if e.is_killed())
    }
}

/// Result type for action execution.
pub type ActionResult<T> = Result<T, ActionError>;

/// Errors raised by the debug wire protocol.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed command line: {0}")]
    Malformed(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Reply {kind} for {agent} has no outstanding request")]
    UnmatchedReply { kind: String, agent: String },

    #[error("A {kind} request for {agent} is already outstanding")]
    DuplicateRequest { kind: String, agent: String },

    #[error("{0} did not register within {1} ms")]
    RegistrationTimeout(String, u64),

    #[error("Spawn of {0} failed: {1}")]
    SpawnFailed(String, String),

    #[error("Timeout waiting for reply")]
    Timeout,

    #[error("Reply channel dropped before an answer arrived")]
    ReplyDropped,

    #[error("Bridge disconnected")]
    Disconnected,

    #[error(transparent)]
    Debugger(#[from] DebuggerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing terms and mental-state conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Parse error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Empty input")]
    Empty,

    #[error("Invalid {what}: {term}")]
    Invalid { what: String, term: String },
}

/// Result type for term parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised while loading configuration or agent definitions.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Term(#[from] ParseError),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
