//! Analyzer run records and their state machine.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Execution state of one analyzer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Started,
    Done,
    Error,
}

impl RunState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Whether a transition from self to `target` is allowed.
    ///
    /// Valid transitions:
    /// - `pending -> started`
    /// - `pending -> error` (cancelled before a worker picked it up)
    /// - `started -> done`
    /// - `started -> error`
    ///
    /// `done` and `error` are terminal: re-running an analyzer creates a new
    /// run, it never reopens a finished one.
    pub fn can_transition_to(self, target: Self) -> Result<(), InvalidRunTransition> {
        if matches!(
            (self, target),
            (Self::Pending, Self::Started)
                | (Self::Pending, Self::Error)
                | (Self::Started, Self::Done)
                | (Self::Started, Self::Error)
        ) {
            Ok(())
        } else {
            Err(InvalidRunTransition {
                from: self,
                to: target,
            })
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunState {
    type Err = UnknownRunState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "started" => Ok(Self::Started),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            other => Err(UnknownRunState(other.to_string())),
        }
    }
}

/// Unknown state string in a stored run row.
#[derive(Debug, thiserror::Error)]
#[error("unknown run state '{0}'")]
pub struct UnknownRunState(pub String);

/// Rejected run state transition.
#[derive(Debug, thiserror::Error)]
#[error("invalid run transition {from} -> {to}")]
pub struct InvalidRunTransition {
    pub from: RunState,
    pub to: RunState,
}

/// Error detail recorded when a run is cancelled by request.
pub const CANCELLED_DETAIL: &str = "cancelled";

/// One execution record of an analyzer against a sketch.
///
/// Immutable once `done` or `error`; history is preserved across re-runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerRun {
    pub run_id: i64,
    pub sketch_id: i64,
    pub analyzer: String,
    /// Restrict the run to these timelines; `None` means the whole sketch.
    pub timeline_scope: Option<Vec<i64>>,
    pub state: RunState,
    pub result_summary: String,
    pub finding_count: u64,
    pub error_detail: Option<String>,
    pub created_at_us: i64,
    pub started_at_us: Option<i64>,
    pub finished_at_us: Option<i64>,
}

impl AnalyzerRun {
    /// True when this run was cancelled rather than failing on its own.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state == RunState::Error
            && self.error_detail.as_deref() == Some(CANCELLED_DETAIL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        assert!(RunState::Pending.can_transition_to(RunState::Started).is_ok());
        assert!(RunState::Pending.can_transition_to(RunState::Error).is_ok());
        assert!(RunState::Started.can_transition_to(RunState::Done).is_ok());
        assert!(RunState::Started.can_transition_to(RunState::Error).is_ok());

        assert!(RunState::Pending.can_transition_to(RunState::Done).is_err());
        assert!(RunState::Started.can_transition_to(RunState::Pending).is_err());
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [RunState::Done, RunState::Error] {
            assert!(terminal.is_terminal());
            for target in [
                RunState::Pending,
                RunState::Started,
                RunState::Done,
                RunState::Error,
            ] {
                assert!(terminal.can_transition_to(target).is_err());
            }
        }
    }

    #[test]
    fn state_string_roundtrip() {
        for state in [
            RunState::Pending,
            RunState::Started,
            RunState::Done,
            RunState::Error,
        ] {
            let parsed: RunState = state.to_string().parse().expect("parse");
            assert_eq!(parsed, state);
        }
        assert!("running".parse::<RunState>().is_err());
    }
}
