use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Initializing,
    Executing,
    Completed,
    Error,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Error)
    }

    /// Forward transitions only; `reset` is the sole way back to `Idle`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Initializing)
                | (RunState::Initializing, RunState::Executing)
                | (RunState::Initializing, RunState::Error)
                | (RunState::Executing, RunState::Completed)
                | (RunState::Executing, RunState::Error)
        )
    }

    pub fn accepts_start(&self) -> bool {
        matches!(self, RunState::Idle | RunState::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Initializing => "initializing",
            RunState::Executing => "executing",
            RunState::Completed => "completed",
            RunState::Error => "error",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(RunState::Idle),
            "initializing" => Ok(RunState::Initializing),
            "executing" => Ok(RunState::Executing),
            "completed" => Ok(RunState::Completed),
            "error" => Ok(RunState::Error),
            other => Err(format!("unknown run state: {other}")),
        }
    }
}

/// The monitored run as the controller sees it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Option<String>,
    pub state: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl WorkflowRun {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_forward_only() {
        assert!(RunState::Idle.can_transition_to(RunState::Initializing));
        assert!(RunState::Initializing.can_transition_to(RunState::Error));
        assert!(RunState::Executing.can_transition_to(RunState::Completed));
        assert!(!RunState::Completed.can_transition_to(RunState::Executing));
        assert!(!RunState::Error.can_transition_to(RunState::Completed));
        assert!(!RunState::Idle.can_transition_to(RunState::Executing));
        assert!(!RunState::Completed.can_transition_to(RunState::Completed));
    }

    #[test]
    fn only_idle_and_error_accept_a_start() {
        assert!(RunState::Idle.accepts_start());
        assert!(RunState::Error.accepts_start());
        assert!(!RunState::Executing.accepts_start());
        assert!(!RunState::Completed.accepts_start());
    }

    #[test]
    fn state_names_round_trip_through_display() {
        for state in [
            RunState::Idle,
            RunState::Initializing,
            RunState::Executing,
            RunState::Completed,
            RunState::Error,
        ] {
            assert_eq!(state.to_string().parse::<RunState>(), Ok(state));
        }
        assert!("running".parse::<RunState>().is_err());
    }
}
