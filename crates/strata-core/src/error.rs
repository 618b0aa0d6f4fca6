use std::fmt;

/// Machine-readable error codes for API-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Validation,
    Permission,
    TimelineNotReady,
    NotFound,
    UnknownAnalyzer,
    RunFinished,
    IngestFailed,
    StorageFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "E1001",
            Self::Permission => "E1002",
            Self::TimelineNotReady => "E2001",
            Self::NotFound => "E2002",
            Self::UnknownAnalyzer => "E3001",
            Self::RunFinished => "E3002",
            Self::IngestFailed => "E4001",
            Self::StorageFailed => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Validation => "Invalid input",
            Self::Permission => "Insufficient sketch permission",
            Self::TimelineNotReady => "Timeline import not finished",
            Self::NotFound => "Object not found",
            Self::UnknownAnalyzer => "Analyzer not registered",
            Self::RunFinished => "Analyzer run already finished",
            Self::IngestFailed => "Event ingestion failed",
            Self::StorageFailed => "Metadata or index storage failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::Validation => Some("Fix the rejected input and retry."),
            Self::Permission => {
                Some("Ask the sketch owner to add you as a collaborator.")
            }
            Self::TimelineNotReady => {
                Some("Wait for the import to reach 'ready', then retry.")
            }
            Self::NotFound => None,
            Self::UnknownAnalyzer => {
                Some("Run `st analyze --list` to see registered analyzers.")
            }
            Self::RunFinished => Some("Schedule a new run instead of reusing a finished one."),
            Self::IngestFailed => Some("Check the source file and the import error detail."),
            Self::StorageFailed => Some("Check disk space and database file permissions."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Domain error taxonomy crossing the API boundary.
///
/// Every variant maps to exactly one [`ErrorCode`], so callers can
/// distinguish "fix your input" from "wait and retry" from "insufficient
/// permission" without string matching.
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    /// Bad input rejected synchronously with no state change.
    #[error("{0}")]
    Validation(String),

    /// The acting user lacks the required role on the sketch.
    #[error("user '{user}' lacks {needed} access to sketch {sketch_id}")]
    Permission {
        user: String,
        needed: &'static str,
        sketch_id: i64,
    },

    /// Timeline exists but has not reached `ready`. Retryable.
    #[error("timeline {timeline_id} is '{status}', not ready")]
    NotReady { timeline_id: i64, status: String },

    /// Unknown sketch/timeline/run identifier.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Analyzer name not present in the registry at schedule time.
    #[error("unknown analyzer '{0}'")]
    UnknownAnalyzer(String),

    /// Attempted transition out of a terminal run state.
    #[error("analyzer run {run_id} is already '{state}'")]
    RunFinished { run_id: i64, state: String },

    /// Storage or other internal failure; carries the full chain.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StrataError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::Permission { .. } => ErrorCode::Permission,
            Self::NotReady { .. } => ErrorCode::TimelineNotReady,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::UnknownAnalyzer(_) => ErrorCode::UnknownAnalyzer,
            Self::RunFinished { .. } => ErrorCode::RunFinished,
            Self::Internal(_) => ErrorCode::StorageFailed,
        }
    }

    /// Convenience constructor for a not-found error with a numeric id.
    #[must_use]
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StrataError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Internal(err.into())
    }
}

/// Result alias used across the strata API surface.
pub type Result<T, E = StrataError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::{ErrorCode, StrataError};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::Validation,
            ErrorCode::Permission,
            ErrorCode::TimelineNotReady,
            ErrorCode::NotFound,
            ErrorCode::UnknownAnalyzer,
            ErrorCode::RunFinished,
            ErrorCode::IngestFailed,
            ErrorCode::StorageFailed,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::TimelineNotReady.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn variants_map_to_expected_codes() {
        let err = StrataError::Validation("empty comment".into());
        assert_eq!(err.error_code(), ErrorCode::Validation);

        let err = StrataError::Permission {
            user: "mallory".into(),
            needed: "write",
            sketch_id: 7,
        };
        assert_eq!(err.error_code(), ErrorCode::Permission);

        let err = StrataError::NotReady {
            timeline_id: 3,
            status: "importing".into(),
        };
        assert_eq!(err.error_code(), ErrorCode::TimelineNotReady);

        let err = StrataError::UnknownAnalyzer("nope".into());
        assert_eq!(err.error_code(), ErrorCode::UnknownAnalyzer);
    }

    #[test]
    fn not_ready_display_names_the_status() {
        let err = StrataError::NotReady {
            timeline_id: 12,
            status: "importing".into(),
        };
        let text = err.to_string();
        assert!(text.contains("12"));
        assert!(text.contains("importing"));
    }
}
