//! Execution control for agents: run modes, checkpoints, observers and queries.
//!
//! - [`SteppingDebugger`] owns the run-mode state machine and suspends the agent
//!   thread at checkpoints.
//! - [`ObservableDebugger`] adds per-channel observers with veto.
//! - [`DebugQuery`] questions are answered on the agent thread through a [`QueryTarget`].

mod channel;
mod event;
mod observable;
mod query;
mod run_mode;
mod stepping;

pub use channel::{Channel, ALWAYS_BREAK_LEVEL, HIDDEN_LEVEL};
pub use event::{
    format_message, Breakpoint, BreakpointKind, BreakpointLocation, Checkpoint, DebugEvent,
    DebugObject, SourceInfo,
};
pub use observable::{DebugObserver, EventRecorder, ObservableDebugger};
pub use query::{DebugQuery, NoQueries, QueryReceiver, QueryTarget};
pub use run_mode::RunMode;
pub use stepping::{ModeChangeHook, SteppingDebugger};
