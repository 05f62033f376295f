use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Control state of a debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    /// Mode of a process nothing is known about yet
    Unknown,
    /// Placeholder for an agent running in another process
    RemoteProcess,
    Running,
    /// Pause on the next checkpoint whose channel is in the pause set
    Stepping,
    /// Pause on the next visible checkpoint
    FineStepping,
    Paused,
    /// Paused and answering a controller query on the agent thread
    Querying,
    /// Terminal until reset
    Killed,
}

impl RunMode {
    pub const ALL: [RunMode; 8] = [
        RunMode::Unknown,
        RunMode::RemoteProcess,
        RunMode::Running,
        RunMode::Stepping,
        RunMode::FineStepping,
        RunMode::Paused,
        RunMode::Querying,
        RunMode::Killed,
    ];

    pub fn priority(&self) -> u8 {
        match self {
            RunMode::Unknown | RunMode::RemoteProcess | RunMode::Killed => 0,
            RunMode::Running => 1,
            RunMode::Stepping => 2,
            RunMode::FineStepping => 3,
            RunMode::Paused => 4,
            RunMode::Querying => 5,
        }
    }

    /// Combine two requested modes: `Killed` absorbs, otherwise the higher priority wins.
    pub fn merge(self, other: RunMode) -> RunMode {
        if self == RunMode::Killed || other == RunMode::Killed {
            RunMode::Killed
        } else if other.priority() > self.priority() {
            other
        } else {
            self
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, RunMode::Paused | RunMode::Querying)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Unknown => "UNKNOWN",
            RunMode::RemoteProcess => "REMOTEPROCESS",
            RunMode::Running => "RUNNING",
            RunMode::Stepping => "STEPPING",
            RunMode::FineStepping => "FINESTEPPING",
            RunMode::Paused => "PAUSED",
            RunMode::Querying => "QUERYING",
            RunMode::Killed => "KILLED",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunMode::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown run mode: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_higher_priority() {
        assert_eq!(RunMode::Running.merge(RunMode::Paused), RunMode::Paused);
        assert_eq!(RunMode::FineStepping.merge(RunMode::Stepping), RunMode::FineStepping);
        assert_eq!(RunMode::Unknown.merge(RunMode::Running), RunMode::Running);
    }

    #[test]
    fn test_killed_absorbs_in_merge() {
        for mode in RunMode::ALL {
            assert_eq!(mode.merge(RunMode::Killed), RunMode::Killed);
            assert_eq!(RunMode::Killed.merge(mode), RunMode::Killed);
        }
    }

    #[test]
    fn test_round_trip_names() {
        for mode in RunMode::ALL {
            assert_eq!(mode.to_string().parse::<RunMode>().unwrap(), mode);
        }
        assert!("SLEEPING".parse::<RunMode>().is_err());
    }
}
