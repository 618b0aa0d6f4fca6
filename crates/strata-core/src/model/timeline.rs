//! Timelines: one imported, indexed batch of forensic events.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Import lifecycle of a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Importing,
    Ready,
    Failed,
}

impl ImportStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Importing => "importing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    /// Whether a transition from self to `target` is allowed.
    ///
    /// Valid transitions:
    /// - `importing -> ready`
    /// - `importing -> failed`
    ///
    /// `ready` and `failed` are terminal; a re-import creates a new timeline
    /// instead of reusing this one.
    pub fn can_transition_to(self, target: Self) -> Result<(), InvalidImportTransition> {
        if matches!(
            (self, target),
            (Self::Importing, Self::Ready) | (Self::Importing, Self::Failed)
        ) {
            Ok(())
        } else {
            Err(InvalidImportTransition {
                from: self,
                to: target,
            })
        }
    }

    /// Terminal statuses accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = UnknownImportStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "importing" => Ok(Self::Importing),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownImportStatus(other.to_string())),
        }
    }
}

/// Unknown status string in a stored timeline row.
#[derive(Debug, thiserror::Error)]
#[error("unknown import status '{0}'")]
pub struct UnknownImportStatus(pub String);

/// Rejected import status transition.
#[derive(Debug, thiserror::Error)]
#[error("invalid import transition {from} -> {to}")]
pub struct InvalidImportTransition {
    pub from: ImportStatus,
    pub to: ImportStatus,
}

/// A named binding to exactly one event index.
///
/// Historical imports are immutable: re-importing the same source creates a
/// new `Timeline` row and a new index. A timeline is never deleted while a
/// sketch references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub timeline_id: i64,
    pub name: String,
    /// Identifier of the owning event index.
    pub index_id: String,
    pub status: ImportStatus,
    /// Error detail stored when the import fails. Never silently discarded.
    pub error_detail: Option<String>,
    /// Count of malformed events skipped during import.
    pub malformed_count: u64,
    /// Count of events actually indexed.
    pub event_count: u64,
    pub created_by: String,
    pub created_at_us: i64,
    pub finished_at_us: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importing_reaches_both_terminals() {
        assert!(ImportStatus::Importing
            .can_transition_to(ImportStatus::Ready)
            .is_ok());
        assert!(ImportStatus::Importing
            .can_transition_to(ImportStatus::Failed)
            .is_ok());
    }

    #[test]
    fn terminal_statuses_accept_no_transition() {
        for terminal in [ImportStatus::Ready, ImportStatus::Failed] {
            assert!(terminal.is_terminal());
            for target in [
                ImportStatus::Importing,
                ImportStatus::Ready,
                ImportStatus::Failed,
            ] {
                assert!(terminal.can_transition_to(target).is_err());
            }
        }
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            ImportStatus::Importing,
            ImportStatus::Ready,
            ImportStatus::Failed,
        ] {
            let parsed: ImportStatus = status.to_string().parse().expect("parse");
            assert_eq!(parsed, status);
        }
        assert!("done".parse::<ImportStatus>().is_err());
    }
}
