//! Error types for beatbattle
//!
//! Gateway failures, the top-level error aggregate and CLI exit codes.
//! Vote rejections are not errors; see [`beatbattle_core::VoteOutcome`].

use std::time::Duration;

use thiserror::Error;

pub use beatbattle_core::error::{ConfigError, ContestError, Severity, ValidationIssue};

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for beatbattle CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Persistence error (database unreachable, corrupt rows)
    pub const GATEWAY_ERROR: i32 = 4;

    /// Transient persistence failure; the caller may retry
    pub const TRANSIENT_ERROR: i32 = 75;

    /// Contest input rejected by the domain rules
    pub const CONTEST_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Gateway Errors
// ============================================================================

/// Persistence gateway failures.
///
/// A failed call never leaves a partial mutation behind: transactions roll
/// back on any error.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No transaction could be acquired within the configured bound
    #[error("timed out after {waited:?} waiting for a transaction")]
    Timeout {
        /// How long the caller waited
        waited: Duration,
    },

    /// A referenced record does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record (`"contest"`, `"submission"`)
        entity: &'static str,
        /// Identifier that was looked up
        id: i64,
    },

    /// The backing store reported a failure
    #[error("database error: {0}")]
    Database(String),

    /// A stored row holds a value the domain cannot represent
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl GatewayError {
    /// Creates a `NotFound` error for a contest.
    #[must_use]
    pub const fn contest_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "contest",
            id,
        }
    }

    /// Creates a `NotFound` error for a submission.
    #[must_use]
    pub const fn submission_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "submission",
            id,
        }
    }

    /// Returns `true` if retrying the request later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Database(_))
    }

    /// Returns `true` for missing records.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::NotFound { .. } => "not_found",
            Self::Database(_) => "database",
            Self::Corrupt(_) => "corrupt",
        }
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::Timeout {
                waited: Duration::ZERO,
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Corrupt(err.to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<ContestError> for GatewayError {
    fn from(err: ContestError) -> Self {
        Self::Corrupt(err.to_string())
    }
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for beatbattle operations.
#[derive(Debug, Error)]
pub enum BattleError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Persistence gateway error
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Contest input rejected
    #[error(transparent)]
    Contest(#[from] ContestError),

    /// Invalid command-line usage
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BattleError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Gateway(e) if e.is_transient() => ExitCode::TRANSIENT_ERROR,
            Self::Gateway(_) => ExitCode::GATEWAY_ERROR,
            Self::Contest(_) => ExitCode::CONTEST_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
            Self::Json(_) => ExitCode::ERROR,
        }
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for beatbattle operations.
pub type Result<T> = std::result::Result<T, BattleError>;
