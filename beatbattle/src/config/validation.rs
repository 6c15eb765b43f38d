//! Configuration validation
//!
//! Semantic checks on a deserialized [`BattleConfig`]. All issues are
//! collected rather than stopping at the first one.

use std::time::Duration;

use crate::config::{BattleConfig, MEMORY_DATABASE_URL};
use crate::error::{Severity, ValidationIssue};

/// Transaction timeouts above this are allowed but reported.
const LONG_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns the result.
    pub fn validate(&mut self, config: &BattleConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_database(config);
        self.validate_tally(config);
        self.validate_metrics(config);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn validate_database(&mut self, config: &BattleConfig) {
        let db = &config.database;
        if db.url == MEMORY_DATABASE_URL {
            self.add_warning(
                "database.url",
                "in-memory database: contests are lost when the process exits",
            );
        } else if !db.url.starts_with("sqlite:") {
            self.add_error(
                "database.url",
                format!("expected 'memory' or a sqlite: URL, got '{}'", db.url),
            );
        }

        if db.max_connections == 0 {
            self.add_error("database.max_connections", "must be at least 1");
        }
        if db.acquire_timeout.is_zero() {
            self.add_error("database.acquire_timeout", "must be greater than zero");
        }
    }

    fn validate_tally(&mut self, config: &BattleConfig) {
        let timeout = config.tally.transaction_timeout;
        if timeout.is_zero() {
            self.add_error("tally.transaction_timeout", "must be greater than zero");
        } else if timeout > LONG_TRANSACTION_TIMEOUT {
            self.add_warning(
                "tally.transaction_timeout",
                format!(
                    "{} lets a vote wait a long time behind a busy ballot",
                    humantime::format_duration(timeout)
                ),
            );
        }
    }

    fn validate_metrics(&mut self, config: &BattleConfig) {
        if config.metrics.port == Some(0) {
            self.add_error("metrics.port", "port 0 is not a valid listen port");
        }
    }

    fn add_error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }
}
