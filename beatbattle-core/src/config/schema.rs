//! Configuration schema types
//!
//! Runtime settings deserialized from the YAML configuration file. Every
//! section is optional; missing sections take their defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root configuration for beatbattle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct BattleConfig {
    /// Persistence gateway settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Vote tally settings
    #[serde(default)]
    pub tally: TallyConfig,

    /// Display status settings
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Prometheus exporter settings
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Structured event stream settings
    #[serde(default)]
    pub events: EventsConfig,
}

// ============================================================================
// Database
// ============================================================================

/// URL selecting the in-memory gateway.
pub const MEMORY_DATABASE_URL: &str = "memory";

/// Persistence gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DatabaseConfig {
    /// `sqlite://path` or `memory`
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_duration")]
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Returns `true` if the in-memory gateway is selected.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_DATABASE_URL
    }
}

fn default_database_url() -> String {
    "sqlite://beatbattle.db".to_owned()
}

const fn default_max_connections() -> u32 {
    8
}

const fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

// ============================================================================
// Tally
// ============================================================================

/// Vote tally settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct TallyConfig {
    /// Bound on acquiring a vote transaction. Expiry is reported as a
    /// transient failure; the engine never retries on its own.
    #[serde(default = "default_transaction_timeout", with = "humantime_duration")]
    pub transaction_timeout: Duration,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: default_transaction_timeout(),
        }
    }
}

const fn default_transaction_timeout() -> Duration {
    Duration::from_secs(2)
}

// ============================================================================
// Display
// ============================================================================

/// Display status settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DisplayConfig {
    /// Deadline used for the remaining-time text on the read that opens voting
    #[serde(default)]
    pub remainder: RemainderMode,
}

/// Which deadline the remaining-time text uses right after a contest moves
/// from `Entry` to `Voting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum RemainderMode {
    /// Keep counting down to the elapsed entry deadline
    #[default]
    Literal,
    /// Count down to the voting deadline
    Corrected,
}

// ============================================================================
// Logging / Metrics / Events
// ============================================================================

/// Logging settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct LoggingConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormatSetting,
}

/// Log output format as written in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum LogFormatSetting {
    /// Human-readable lines
    #[default]
    Human,
    /// Newline-delimited JSON
    Json,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct MetricsConfig {
    /// Port for the HTTP exporter on 127.0.0.1; disabled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Structured event stream settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct EventsConfig {
    /// JSONL output file; events are discarded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// ============================================================================
// Duration (de)serialization
// ============================================================================

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}
