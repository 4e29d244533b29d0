//! Status vocabulary for runs, results, executors, and cluster connectivity.
//!
//! Every status is stored as its lowercase string form. No magic strings --
//! handlers and repositories go through these enums.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an inspection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    /// Reserved: accepted on read, never produced by any transition.
    Paused,
    Cancelled,
    Completed,
    Incomplete,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(RunStatus::Queued),
            "running" => Some(RunStatus::Running),
            "paused" => Some(RunStatus::Paused),
            "cancelled" => Some(RunStatus::Cancelled),
            "completed" => Some(RunStatus::Completed),
            "incomplete" => Some(RunStatus::Incomplete),
            _ => None,
        }
    }

    /// Terminal statuses freeze counters and reject further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Incomplete | RunStatus::Cancelled
        )
    }
}

/// Outcome of a single inspection item within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Warning,
    Failed,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Passed => "passed",
            CheckStatus::Warning => "warning",
            CheckStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "passed" => Some(CheckStatus::Passed),
            "warning" => Some(CheckStatus::Warning),
            "failed" => Some(CheckStatus::Failed),
            _ => None,
        }
    }
}

/// Which entity executes the items of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Executor {
    Server,
    Agent,
}

impl Executor {
    pub fn as_str(self) -> &'static str {
        match self {
            Executor::Server => "server",
            Executor::Agent => "agent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "server" => Some(Executor::Server),
            "agent" => Some(Executor::Agent),
            _ => None,
        }
    }
}

/// Agent-side phase of an agent-executed run (absent for server runs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPhase {
    Queued,
    Running,
    Finished,
    Failed,
}

impl AgentPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentPhase::Queued => "queued",
            AgentPhase::Running => "running",
            AgentPhase::Finished => "finished",
            AgentPhase::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(AgentPhase::Queued),
            "running" => Some(AgentPhase::Running),
            "finished" => Some(AgentPhase::Finished),
            "failed" => Some(AgentPhase::Failed),
            _ => None,
        }
    }
}

/// Cluster connectivity as recorded by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Failed,
    Warning,
    Unknown,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
            ConnectionStatus::Warning => "warning",
            ConnectionStatus::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_roundtrips_through_strings() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Paused,
            RunStatus::Cancelled,
            RunStatus::Completed,
            RunStatus::Incomplete,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn terminal_statuses_are_exactly_three() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Incomplete.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
    }

    #[test]
    fn unknown_status_string_parses_to_none() {
        assert_eq!(RunStatus::parse("finished"), None);
        assert_eq!(CheckStatus::parse("ok"), None);
    }
}
