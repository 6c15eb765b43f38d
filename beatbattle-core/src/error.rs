//! Core error types for beatbattle
//!
//! Configuration and contest validation errors shared across the workspace.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}{}: {message}", line.map_or_else(String::new, |l| format!(" (line {l})")))]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", summarize(errors))]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Configuration file exceeds the size limit
    #[error("{path} is {size} bytes (limit: {limit})")]
    TooLarge {
        /// Path to the configuration file
        path: PathBuf,
        /// Actual size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location in the configuration where it was referenced
        location: String,
    },
}

fn summarize(errors: &[ValidationIssue]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Dotted path to the problematic field (e.g. "database.max_connections")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Prevents the configuration from being used
    Error,
    /// Reported but does not prevent loading
    Warning,
}

// ============================================================================
// Contest Errors
// ============================================================================

/// Contest data that breaks the domain rules.
#[derive(Debug, Error)]
pub enum ContestError {
    /// Stored phase string is not one of `entry`, `voting`, `complete`
    #[error("unknown phase '{0}'")]
    UnknownPhase(String),

    /// Required text field is blank
    #[error("'{0}' must not be empty")]
    MissingField(&'static str),

    /// Entry deadline is not in the future
    #[error("entry deadline {deadline} has already passed")]
    EntryDeadlinePassed {
        /// The rejected deadline
        deadline: DateTime<Utc>,
    },

    /// Voting window would close before it opens
    #[error("voting deadline {voting} must be after entry deadline {entry}")]
    VotingBeforeEntry {
        /// Entry deadline
        entry: DateTime<Utc>,
        /// Voting deadline
        voting: DateTime<Utc>,
    },

    /// Votes-per-user cap outside the allowed range
    #[error("max votes must be between 1 and 10, got {0}")]
    MaxVotesOutOfRange(u32),

    /// Submission attempted outside the entry phase
    #[error("contest is in the {phase} phase and no longer accepts entries")]
    EntriesClosed {
        /// Phase the contest was found in
        phase: crate::model::Phase,
    },

    /// Entry password missing or wrong
    #[error("incorrect contest password")]
    WrongPassword,

    /// Media reference is blank or not a URL
    #[error("invalid submission url '{0}'")]
    InvalidUrl(String),

    /// Host-only action attempted by someone else
    #[error("user {user} does not host contest {contest}")]
    NotHost {
        /// Acting user
        user: crate::model::UserId,
        /// Contest the action targeted
        contest: crate::model::ContestId,
    },

    /// The entrant has no submission in the contest
    #[error("user {owner} has no submission in contest {contest}")]
    NoSubmission {
        /// Entrant
        owner: crate::model::UserId,
        /// Contest searched
        contest: crate::model::ContestId,
    },

    /// Results are final; submissions can no longer be withdrawn
    #[error("contest {0} is complete and its results are final")]
    ResultsFinal(crate::model::ContestId),

    /// Placements are set only after voting has closed
    #[error("contest is in the {phase} phase; placements open once voting closes")]
    ResultsPending {
        /// Phase the contest was found in
        phase: crate::model::Phase,
    },

    /// Placement on a disqualified submission
    #[error("submission {0} is disqualified")]
    Disqualified(crate::model::SubmissionId),

    /// Placement must start at 1
    #[error("placement must be 1 or greater")]
    PlacementOutOfRange,

    /// Entrants cannot leave feedback on their own submission
    #[error("cannot leave feedback on your own submission")]
    SelfFeedback,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_issue_display() {
        let issue = ValidationIssue {
            path: "tally.transaction_timeout".to_string(),
            message: "must be greater than zero".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: must be greater than zero at tally.transaction_timeout"
        );
    }

    #[test]
    fn validation_error_lists_issues() {
        let err = ConfigError::ValidationError {
            path: "beatbattle.yaml".to_string(),
            errors: vec![
                ValidationIssue {
                    path: "database.url".to_string(),
                    message: "unsupported scheme".to_string(),
                    severity: Severity::Error,
                },
                ValidationIssue {
                    path: "database.max_connections".to_string(),
                    message: "must be at least 1".to_string(),
                    severity: Severity::Error,
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("unsupported scheme at database.url"));
        assert!(text.contains("must be at least 1"));
    }

    #[test]
    fn parse_error_includes_line() {
        let err = ConfigError::ParseError {
            path: PathBuf::from("beatbattle.yaml"),
            line: Some(4),
            message: "unexpected token".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parse error in beatbattle.yaml (line 4): unexpected token"
        );
    }

    #[test]
    fn contest_error_display() {
        assert_eq!(
            ContestError::MaxVotesOutOfRange(12).to_string(),
            "max votes must be between 1 and 10, got 12"
        );
        assert_eq!(
            ContestError::UnknownPhase("draft".into()).to_string(),
            "unknown phase 'draft'"
        );
        assert_eq!(
            ContestError::NotHost {
                user: crate::model::UserId(4),
                contest: crate::model::ContestId(9),
            }
            .to_string(),
            "user 4 does not host contest 9"
        );
    }
}
