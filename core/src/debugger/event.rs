//! Checkpoints raised by the execution pipeline and the events observers see.

use super::{Channel, RunMode};
use crate::action::Action;
use crate::kr::Term;
use crate::mental_state::{Base, Change};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SOURCE LOCATIONS AND BREAKPOINTS
// ============================================================================

/// Position of a program element in an agent file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceInfo {
    pub file: String,
    pub line: u32,
    pub start: u32,
    pub end: u32,
}

impl SourceInfo {
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: file.to_string(),
            line,
            start: 0,
            end: 0,
        }
    }

    pub fn with_span(mut self, start: u32, end: u32) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn location(&self) -> BreakpointLocation {
        BreakpointLocation {
            file: self.file.clone(),
            line: self.line,
        }
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BreakpointLocation {
    pub file: String,
    pub line: u32,
}

/// `Always` breakpoints trigger on any checkpoint at their location,
/// `Conditional` ones only when the action there is actually executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakpointKind {
    Always,
    Conditional,
}

impl BreakpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakpointKind::Always => "ALWAYS",
            BreakpointKind::Conditional => "CONDITIONAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ALWAYS" => Some(BreakpointKind::Always),
            "CONDITIONAL" => Some(BreakpointKind::Conditional),
            _ => None,
        }
    }

    /// Whether a breakpoint of this kind fires for a checkpoint on `channel`.
    pub fn matches(&self, channel: Channel) -> bool {
        match self {
            BreakpointKind::Always => true,
            BreakpointKind::Conditional => matches!(
                channel,
                Channel::ActionExecutedBuiltin
                    | Channel::ActionExecutedUserspec
                    | Channel::ActionExecutedMessaging
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Breakpoint {
    pub location: BreakpointLocation,
    pub kind: BreakpointKind,
}

impl Breakpoint {
    pub fn new(file: &str, line: u32, kind: BreakpointKind) -> Self {
        Self {
            location: BreakpointLocation {
                file: file.to_string(),
                line,
            },
            kind,
        }
    }
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

/// Domain object a checkpoint is about.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugObject {
    None,
    Action(Action),
    Term(Term),
    BaseChange { base: Base, change: Change, term: Term },
    Module(String),
    RunMode { from: RunMode, to: RunMode },
    Text(String),
}

/// A point in agent execution where the debugger gets control.
///
/// The message is a template with `%s` placeholders filled from `args`.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub channel: Channel,
    pub object: DebugObject,
    pub source: Option<SourceInfo>,
    pub template: String,
    pub args: Vec<String>,
}

impl Checkpoint {
    pub fn new(channel: Channel, object: DebugObject, template: &str) -> Self {
        Self {
            channel,
            object,
            source: None,
            template: template.to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl fmt::Display) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn at(mut self, source: Option<SourceInfo>) -> Self {
        self.source = source;
        self
    }

    pub fn message(&self) -> String {
        format_message(&self.template, &self.args)
    }
}

/// Substitute `%s` placeholders left to right; surplus placeholders stay verbatim.
pub fn format_message(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(idx) = rest.find("%s") {
        out.push_str(&rest[..idx]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("%s"),
        }
        rest = &rest[idx + 2..];
    }
    out.push_str(rest);
    out
}

// ============================================================================
// DEBUG EVENTS
// ============================================================================

/// What observers receive when a checkpoint on a subscribed channel is hit.
#[derive(Debug, Clone)]
pub struct DebugEvent {
    /// Run mode of the emitting debugger at emission time
    pub run_mode: RunMode,
    /// Name of the emitting debugger
    pub source: String,
    pub channel: Channel,
    pub object: DebugObject,
    pub location: Option<SourceInfo>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl DebugEvent {
    pub fn from_checkpoint(run_mode: RunMode, source: &str, checkpoint: &Checkpoint) -> Self {
        Self {
            run_mode,
            source: source.to_string(),
            channel: checkpoint.channel,
            object: checkpoint.object.clone(),
            location: checkpoint.source.clone(),
            message: checkpoint.message(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for DebugEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}: {}", self.run_mode, self.source, self.channel, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        let args = vec!["a1".to_string(), "p(1)".to_string()];
        assert_eq!(format_message("%s inserted %s", &args), "a1 inserted p(1)");
        assert_eq!(format_message("%s and %s", &args[..1]), "a1 and %s");
        assert_eq!(format_message("no args", &[]), "no args");
    }

    #[test]
    fn test_conditional_breakpoints_match_execution_only() {
        assert!(BreakpointKind::Conditional.matches(Channel::ActionExecutedUserspec));
        assert!(!BreakpointKind::Conditional.matches(Channel::ActionPrecondEvaluation));
        assert!(BreakpointKind::Always.matches(Channel::ActionPrecondEvaluation));
    }

    #[test]
    fn test_event_carries_formatted_message() {
        let cp = Checkpoint::new(Channel::Print, DebugObject::None, "said %s")
            .arg("hello")
            .at(Some(SourceInfo::new("a.toml", 3)));
        let event = DebugEvent::from_checkpoint(RunMode::Running, "a1", &cp);
        assert_eq!(event.message, "said hello");
        assert_eq!(event.location.unwrap().line, 3);
    }
}
