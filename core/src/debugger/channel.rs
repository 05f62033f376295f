use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Level of channels that never pause execution.
pub const HIDDEN_LEVEL: u8 = 0;

/// Level of channels that pause regardless of the user's channel selection.
pub const ALWAYS_BREAK_LEVEL: u8 = u8::MAX;

/// Category of a debug-worthy occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    ReasoningCycleSeparator,
    RunMode,
    HiddenRuleCondition,
    Breakpoints,
    ActionExecutedBuiltin,
    ActionExecutedUserspec,
    ActionExecutedMessaging,
    ActionPrecondEvaluation,
    BbUpdates,
    GbUpdates,
    GoalAchieved,
    Percepts,
    Mails,
    ModuleEntry,
    ModuleExit,
    RuleConditionEvaluation,
    Focus,
    Print,
    Warning,
    Testfailure,
}

impl Channel {
    pub const ALL: [Channel; 20] = [
        Channel::ReasoningCycleSeparator,
        Channel::RunMode,
        Channel::HiddenRuleCondition,
        Channel::Breakpoints,
        Channel::ActionExecutedBuiltin,
        Channel::ActionExecutedUserspec,
        Channel::ActionExecutedMessaging,
        Channel::ActionPrecondEvaluation,
        Channel::BbUpdates,
        Channel::GbUpdates,
        Channel::GoalAchieved,
        Channel::Percepts,
        Channel::Mails,
        Channel::ModuleEntry,
        Channel::ModuleExit,
        Channel::RuleConditionEvaluation,
        Channel::Focus,
        Channel::Print,
        Channel::Warning,
        Channel::Testfailure,
    ];

    pub fn level(&self) -> u8 {
        match self {
            Channel::ReasoningCycleSeparator | Channel::RunMode | Channel::HiddenRuleCondition => {
                HIDDEN_LEVEL
            }
            Channel::Breakpoints | Channel::Print | Channel::Warning => 1,
            Channel::ActionExecutedBuiltin
            | Channel::ActionExecutedUserspec
            | Channel::ActionExecutedMessaging
            | Channel::BbUpdates
            | Channel::GbUpdates
            | Channel::GoalAchieved
            | Channel::ModuleEntry
            | Channel::ModuleExit => 2,
            Channel::ActionPrecondEvaluation
            | Channel::Percepts
            | Channel::Mails
            | Channel::RuleConditionEvaluation
            | Channel::Focus => 3,
            Channel::Testfailure => ALWAYS_BREAK_LEVEL,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.level() == HIDDEN_LEVEL
    }

    pub fn always_breaks(&self) -> bool {
        self.level() == ALWAYS_BREAK_LEVEL
    }

    /// Channels a user may add to a pause set.
    pub fn pausable() -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(|c| !c.is_hidden())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::ReasoningCycleSeparator => "REASONING_CYCLE_SEPARATOR",
            Channel::RunMode => "RUNMODE",
            Channel::HiddenRuleCondition => "HIDDEN_RULE_CONDITION",
            Channel::Breakpoints => "BREAKPOINTS",
            Channel::ActionExecutedBuiltin => "ACTION_EXECUTED_BUILTIN",
            Channel::ActionExecutedUserspec => "ACTION_EXECUTED_USERSPEC",
            Channel::ActionExecutedMessaging => "ACTION_EXECUTED_MESSAGING",
            Channel::ActionPrecondEvaluation => "ACTION_PRECOND_EVALUATION",
            Channel::BbUpdates => "BB_UPDATES",
            Channel::GbUpdates => "GB_UPDATES",
            Channel::GoalAchieved => "GOAL_ACHIEVED",
            Channel::Percepts => "PERCEPTS",
            Channel::Mails => "MAILS",
            Channel::ModuleEntry => "MODULE_ENTRY",
            Channel::ModuleExit => "MODULE_EXIT",
            Channel::RuleConditionEvaluation => "RULE_CONDITION_EVALUATION",
            Channel::Focus => "FOCUS",
            Channel::Print => "PRINT",
            Channel::Warning => "WARNING",
            Channel::Testfailure => "TESTFAILURE",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown channel: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_channels_are_not_pausable() {
        assert!(Channel::ReasoningCycleSeparator.is_hidden());
        assert!(Channel::RunMode.is_hidden());
        assert!(Channel::pausable().all(|c| !c.is_hidden()));
        assert_eq!(Channel::pausable().count(), Channel::ALL.len() - 3);
    }

    #[test]
    fn test_testfailure_always_breaks() {
        assert!(Channel::Testfailure.always_breaks());
        assert!(!Channel::BbUpdates.always_breaks());
    }

    #[test]
    fn test_parse_names() {
        for c in Channel::ALL {
            assert_eq!(c.as_str().parse::<Channel>().unwrap(), c);
        }
        assert_eq!("bb_updates".parse::<Channel>().unwrap(), Channel::BbUpdates);
    }
}
