//! Line representation of bridge commands.
//!
//! A line is `NAME ID [FIELD#FIELD...]`. Fields are separated by `#`; inside a
//! field `\`, `#`, carriage return and newline are escaped as `\\`, `\#`,
//! `\r` and `\n`, so every command fits on a single line.

use crate::debugger::{Breakpoint, BreakpointKind, RunMode, SourceInfo};
use crate::errors::{ProtocolError, ProtocolResult};
use std::fmt;

/// Whether `id` can stand as the id field of a line.
///
/// Ids are written unescaped, so they may not contain whitespace, control
/// characters or the field separator.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|c| c.is_whitespace() || c.is_control() || c == '#')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Stop at the next visible checkpoint
    Fine,
    /// Stop at the next checkpoint on a pause channel
    Coarse,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Fine => "FINE",
            StepKind::Coarse => "COARSE",
        }
    }
}

/// Mental-state change notified to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    InsertedBel,
    DeletedBel,
    Adopted,
    Dropped,
    Achieved,
    InsertedPercept,
    DeletedPercept,
    InsertedMail,
    DeletedMail,
}

impl DeltaKind {
    const ALL: [DeltaKind; 9] = [
        DeltaKind::InsertedBel,
        DeltaKind::DeletedBel,
        DeltaKind::Adopted,
        DeltaKind::Dropped,
        DeltaKind::Achieved,
        DeltaKind::InsertedPercept,
        DeltaKind::DeletedPercept,
        DeltaKind::InsertedMail,
        DeltaKind::DeletedMail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaKind::InsertedBel => "INSERTED_BEL",
            DeltaKind::DeletedBel => "DELETED_BEL",
            DeltaKind::Adopted => "ADOPTED",
            DeltaKind::Dropped => "DROPPED",
            DeltaKind::Achieved => "ACHIEVED",
            DeltaKind::InsertedPercept => "INSERTED_PERCEPT",
            DeltaKind::DeletedPercept => "DELETED_PERCEPT",
            DeltaKind::InsertedMail => "INSERTED_MAIL",
            DeltaKind::DeletedMail => "DELETED_MAIL",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // controller -> runtime
    Run { id: String },
    Pause { id: String },
    Step { id: String, kind: StepKind },
    Breaks { id: String, breakpoints: Vec<Breakpoint> },
    Stop,

    // both directions: a request without payload, a reply with it
    Eval { id: String, payload: String },
    HistoryState { id: String, payload: String },
    WhyAction { id: String, payload: String },
    WhyNotAction { id: String, payload: String },

    // runtime -> controller
    Launched { id: String },
    EnvCreated { id: String },
    Killed { id: String },
    RunMode { id: String, mode: RunMode },
    SuspendAt { id: String, description: String, source: SourceInfo },
    Delta { id: String, kind: DeltaKind, term: String },
    ModuleEntry { id: String, module: String },
    ModuleExit { id: String, module: String },
    Focus { id: String, module: String },
    RuleEvaluation { id: String, text: String },
    Log { id: String, text: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Run { .. } => "RUN",
            Command::Pause { .. } => "PAUSE",
            Command::Step { .. } => "STEP",
            Command::Breaks { .. } => "BREAKS",
            Command::Stop => "STOP",
            Command::Eval { .. } => "EVAL",
            Command::HistoryState { .. } => "HISTORY_STATE",
            Command::WhyAction { .. } => "WHY_ACTION",
            Command::WhyNotAction { .. } => "WHY_NOT_ACTION",
            Command::Launched { .. } => "LAUNCHED",
            Command::EnvCreated { .. } => "ENV_CREATED",
            Command::Killed { .. } => "KILLED",
            Command::RunMode { .. } => "RUNMODE",
            Command::SuspendAt { .. } => "SUSPEND_AT",
            Command::Delta { kind, .. } => kind.as_str(),
            Command::ModuleEntry { .. } => "MODULE_ENTRY",
            Command::ModuleExit { .. } => "MODULE_EXIT",
            Command::Focus { .. } => "FOCUS",
            Command::RuleEvaluation { .. } => "RULE_EVALUATION",
            Command::Log { .. } => "LOG",
        }
    }

    /// Agent or environment the command is about.
    pub fn id(&self) -> Option<&str> {
        match self {
            Command::Stop => None,
            Command::Run { id }
            | Command::Pause { id }
            | Command::Step { id, .. }
            | Command::Breaks { id, .. }
            | Command::Eval { id, .. }
            | Command::HistoryState { id, .. }
            | Command::WhyAction { id, .. }
            | Command::WhyNotAction { id, .. }
            | Command::Launched { id }
            | Command::EnvCreated { id }
            | Command::Killed { id }
            | Command::RunMode { id, .. }
            | Command::SuspendAt { id, .. }
            | Command::Delta { id, .. }
            | Command::ModuleEntry { id, .. }
            | Command::ModuleExit { id, .. }
            | Command::Focus { id, .. }
            | Command::RuleEvaluation { id, .. }
            | Command::Log { id, .. } => Some(id),
        }
    }

    fn fields(&self) -> Vec<String> {
        match self {
            Command::Run { .. }
            | Command::Pause { .. }
            | Command::Stop
            | Command::Launched { .. }
            | Command::EnvCreated { .. }
            | Command::Killed { .. } => Vec::new(),
            Command::Step { kind, .. } => vec![kind.as_str().to_string()],
            Command::Breaks { breakpoints, .. } => breakpoints
                .iter()
                .flat_map(|bp| {
                    [
                        bp.location.file.clone(),
                        bp.location.line.to_string(),
                        bp.kind.as_str().to_string(),
                    ]
                })
                .collect(),
            Command::Eval { payload, .. }
            | Command::HistoryState { payload, .. }
            | Command::WhyAction { payload, .. }
            | Command::WhyNotAction { payload, .. } => {
                if payload.is_empty() {
                    Vec::new()
                } else {
                    vec![payload.clone()]
                }
            }
            Command::RunMode { mode, .. } => vec![mode.as_str().to_string()],
            Command::SuspendAt {
                description,
                source,
                ..
            } => vec![
                description.clone(),
                source.file.clone(),
                source.line.to_string(),
                source.start.to_string(),
                source.end.to_string(),
            ],
            Command::Delta { term, .. } => vec![term.clone()],
            Command::ModuleEntry { module, .. }
            | Command::ModuleExit { module, .. }
            | Command::Focus { module, .. } => vec![module.clone()],
            Command::RuleEvaluation { text, .. } | Command::Log { text, .. } => vec![text.clone()],
        }
    }

    /// Single-line representation, without the trailing newline.
    pub fn to_line(&self) -> String {
        let mut line = self.name().to_string();
        if let Some(id) = self.id() {
            line.push(' ');
            line.push_str(id);
        }
        let fields = self.fields();
        if !fields.is_empty() {
            line.push(' ');
            let escaped: Vec<String> = fields.iter().map(|f| escape(f)).collect();
            line.push_str(&escaped.join("#"));
        }
        line
    }

    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(3, ' ');
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(malformed(line, "empty line"));
        }
        if name == "STOP" {
            return Ok(Command::Stop);
        }
        let id = match parts.next() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(malformed(line, "missing id")),
        };
        let rest = parts.next().unwrap_or_default();
        let fields = split_fields(rest);
        let single = || fields.first().cloned().unwrap_or_default();

        let command = match name {
            "RUN" => Command::Run { id },
            "PAUSE" => Command::Pause { id },
            "STEP" => {
                let kind = match single().to_ascii_uppercase().as_str() {
                    "FINE" => StepKind::Fine,
                    "COARSE" | "" => StepKind::Coarse,
                    other => return Err(malformed(line, &format!("unknown step kind {}", other))),
                };
                Command::Step { id, kind }
            }
            "BREAKS" => Command::Breaks {
                id,
                breakpoints: parse_breakpoints(line, &fields)?,
            },
            "EVAL" => Command::Eval { id, payload: single() },
            "HISTORY_STATE" => Command::HistoryState { id, payload: single() },
            "WHY_ACTION" => Command::WhyAction { id, payload: single() },
            "WHY_NOT_ACTION" => Command::WhyNotAction { id, payload: single() },
            "LAUNCHED" => Command::Launched { id },
            "ENV_CREATED" => Command::EnvCreated { id },
            "KILLED" => Command::Killed { id },
            "RUNMODE" => Command::RunMode {
                id,
                mode: single()
                    .parse()
                    .map_err(|e: String| malformed(line, &e))?,
            },
            "SUSPEND_AT" => {
                if fields.len() != 5 {
                    return Err(malformed(line, "SUSPEND_AT needs 5 fields"));
                }
                let number = |i: usize| {
                    fields[i]
                        .parse::<u32>()
                        .map_err(|_| malformed(line, &format!("bad number {}", fields[i])))
                };
                Command::SuspendAt {
                    id,
                    description: fields[0].clone(),
                    source: SourceInfo::new(&fields[1], number(2)?).with_span(number(3)?, number(4)?),
                }
            }
            "MODULE_ENTRY" => Command::ModuleEntry { id, module: single() },
            "MODULE_EXIT" => Command::ModuleExit { id, module: single() },
            "FOCUS" => Command::Focus { id, module: single() },
            "RULE_EVALUATION" => Command::RuleEvaluation { id, text: single() },
            "LOG" => Command::Log { id, text: single() },
            other => match DeltaKind::parse(other) {
                Some(kind) => Command::Delta { id, kind, term: single() },
                None => return Err(ProtocolError::UnknownCommand(other.to_string())),
            },
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line())
    }
}

fn parse_breakpoints(line: &str, fields: &[String]) -> ProtocolResult<Vec<Breakpoint>> {
    if fields.len() % 3 != 0 {
        return Err(malformed(line, "breakpoints come in file#line#kind triples"));
    }
    fields
        .chunks(3)
        .map(|triple| {
            let number = triple[1]
                .parse::<u32>()
                .map_err(|_| malformed(line, &format!("bad line number {}", triple[1])))?;
            let kind = BreakpointKind::parse(&triple[2])
                .ok_or_else(|| malformed(line, &format!("bad breakpoint kind {}", triple[2])))?;
            Ok(Breakpoint::new(&triple[0], number, kind))
        })
        .collect()
}

fn malformed(line: &str, reason: &str) -> ProtocolError {
    ProtocolError::Malformed(format!("{} ({})", line, reason))
}

pub(crate) fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '#' => out.push_str("\\#"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Split on unescaped `#` and undo the escaping. Empty input has no fields.
pub(crate) fn split_fields(rest: &str) -> Vec<String> {
    if rest.is_empty() {
        return Vec::new();
    }
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('r') => current.push('\r'),
                Some('n') => current.push('\n'),
                Some(other) => current.push(other),
                None => current.push('\\'),
            },
            '#' => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids_survive_a_line() {
        for id in ["walker", "agent_1", "env.main", "bot-7"] {
            assert!(is_valid_id(id));
            let line = Command::Launched { id: id.into() }.to_line();
            assert_eq!(Command::parse(&line).unwrap().id(), Some(id));
        }
        for id in ["", "my agent", "a\nRUN b", "a#b", "tab\t"] {
            assert!(!is_valid_id(id), "{:?} accepted", id);
        }
    }

    #[test]
    fn test_escaping_keeps_one_line() {
        let cmd = Command::Eval {
            id: "a1".into(),
            payload: "bel(p(\"x#y\"))\nnext\\".into(),
        };
        let line = cmd.to_line();
        assert!(!line.contains('\n'));
        assert_eq!(Command::parse(&line).unwrap(), cmd);
    }

    #[test]
    fn test_breaks_triples() {
        let line = "BREAKS a1 blocks.toml#4#ALWAYS#blocks.toml#9#CONDITIONAL";
        match Command::parse(line).unwrap() {
            Command::Breaks { breakpoints, .. } => {
                assert_eq!(breakpoints.len(), 2);
                assert_eq!(breakpoints[1].kind, BreakpointKind::Conditional);
                assert_eq!(breakpoints[1].location.line, 9);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Command::parse("BREAKS a1 f#1").is_err());
        let clear = Command::parse("BREAKS a1").unwrap();
        assert_eq!(clear, Command::Breaks { id: "a1".into(), breakpoints: vec![] });
    }

    #[test]
    fn test_suspend_at() {
        let cmd = Command::SuspendAt {
            id: "a1".into(),
            description: "performed insert(p)".into(),
            source: SourceInfo::new("a.toml", 7).with_span(2, 14),
        };
        assert_eq!(cmd.to_line(), "SUSPEND_AT a1 performed insert(p)#a.toml#7#2#14");
        assert_eq!(Command::parse(&cmd.to_line()).unwrap(), cmd);
    }

    #[test]
    fn test_requests_have_no_payload() {
        let req = Command::HistoryState { id: "a1".into(), payload: String::new() };
        assert_eq!(req.to_line(), "HISTORY_STATE a1");
        assert_eq!(Command::parse("STOP").unwrap(), Command::Stop);
        assert_eq!(Command::Stop.to_line(), "STOP");
    }

    #[test]
    fn test_delta_and_run_mode() {
        assert_eq!(
            Command::parse("ADOPTED a1 on(a, b)").unwrap(),
            Command::Delta { id: "a1".into(), kind: DeltaKind::Adopted, term: "on(a, b)".into() }
        );
        assert_eq!(
            Command::parse("RUNMODE a1 PAUSED").unwrap(),
            Command::RunMode { id: "a1".into(), mode: RunMode::Paused }
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(Command::parse("JUMP a1"), Err(ProtocolError::UnknownCommand(_))));
        assert!(matches!(Command::parse("RUN"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(Command::parse(""), Err(ProtocolError::Malformed(_))));
        assert!(Command::parse("STEP a1 SIDEWAYS").is_err());
        assert!(Command::parse("RUNMODE a1 NAPPING").is_err());
    }
}
