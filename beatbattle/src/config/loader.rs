//! Configuration loader
//!
//! The loading pipeline:
//! 1. Size check
//! 2. Environment variable expansion (pre-parse, on raw text)
//! 3. YAML parsing into the typed [`BattleConfig`]
//! 4. Validation

use std::path::{Path, PathBuf};

use crate::config::{BattleConfig, RemainderMode};
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Limits applied while loading.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum configuration file size in bytes.
    pub max_config_size: u64,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_config_size: env_or("BEATBATTLE_MAX_CONFIG_SIZE", 1024 * 1024),
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: BattleConfig,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

/// Values applied after parsing and before validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces `database.url`.
    pub database_url: Option<String>,

    /// Replaces `display.remainder`.
    pub remainder: Option<RemainderMode>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut BattleConfig) {
        if let Some(ref url) = self.database_url {
            config.database.url.clone_from(url);
        }
        if let Some(mode) = self.remainder {
            config.display.remainder = mode;
        }
    }
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    limits: ConfigLimits,
    overrides: ConfigOverrides,
}

impl ConfigLoader {
    /// Creates a loader with the given limits.
    #[must_use]
    pub fn new(limits: ConfigLimits) -> Self {
        Self {
            limits,
            overrides: ConfigOverrides::default(),
        }
    }

    /// Applies `overrides` to every configuration this loader produces.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Loads, expands, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file is missing, unreadable or over the size limit
    /// - A required environment variable (`${VAR:?msg}`) is unset
    /// - YAML parsing fails or an unknown field is present
    /// - Validation reports errors
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        if metadata.len() > self.limits.max_config_size {
            return Err(ConfigError::TooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: self.limits.max_config_size,
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        self.load_str(&raw, path)
    }

    /// Runs the pipeline on already-read text. `source` names it in errors.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_str(&self, raw: &str, source: &Path) -> Result<LoadResult, ConfigError> {
        let mut warnings = Vec::new();

        // Handle UTF-8 BOM
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut env_sub = EnvSubstitution::new();
        let substituted = env_sub.substitute(raw, source)?;
        warnings.extend(env_sub.warnings);

        // An empty file means "all defaults"
        let mut config: BattleConfig = if substituted.trim().is_empty() {
            BattleConfig::default()
        } else {
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::ParseError {
                path: source.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        };
        self.overrides.apply(&mut config);

        let result = Validator::new().validate(&config);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: source.display().to_string(),
                errors: result.errors,
            });
        }
        warnings.extend(result.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult { config, warnings })
    }
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

/// Pre-parse environment variable substitution.
///
/// Runs on raw YAML text before parsing so substituted values keep YAML's
/// type inference.
struct EnvSubstitution {
    warnings: Vec<LoadWarning>,
}

/// A parsed `${...}` reference.
struct VarSpec {
    name: String,
    default: Option<String>,
    required: Option<String>,
}

impl EnvSubstitution {
    const fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    /// Substitutes environment variables in raw YAML text.
    ///
    /// Supports:
    /// - `${VAR}` - expand to value (empty string if unset, with warning)
    /// - `${VAR:-default}` - expand to default if unset
    /// - `${VAR:?message}` - fail if unset
    /// - `$$` - literal `$`
    fn substitute(&mut self, raw_yaml: &str, source: &Path) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(raw_yaml.len());
        let mut chars = raw_yaml.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let spec = Self::parse_var_spec(&mut chars, source)?;
                    match std::env::var(&spec.name) {
                        Ok(value) => result.push_str(&value),
                        Err(_) => {
                            if let Some(default) = spec.default {
                                result.push_str(&default);
                            } else if let Some(message) = spec.required {
                                return Err(ConfigError::EnvVarNotSet {
                                    var: spec.name,
                                    location: format!("{} ({message})", source.display()),
                                });
                            } else {
                                self.warnings.push(LoadWarning {
                                    message: format!(
                                        "environment variable '{}' is not set, using empty string",
                                        spec.name
                                    ),
                                    location: Some(source.display().to_string()),
                                });
                            }
                        }
                    }
                }
                _ => result.push(c),
            }
        }

        Ok(result)
    }

    /// Parses the inside of `${...}`; the opening brace is already consumed.
    fn parse_var_spec(
        chars: &mut std::iter::Peekable<std::str::Chars>,
        source: &Path,
    ) -> Result<VarSpec, ConfigError> {
        let mut name = String::new();

        while let Some(c) = chars.next() {
            match c {
                '}' => {
                    return Ok(VarSpec {
                        name,
                        default: None,
                        required: None,
                    });
                }
                ':' if chars.peek() == Some(&'-') => {
                    chars.next();
                    let default = Self::read_until_close(chars, source)?;
                    return Ok(VarSpec {
                        name,
                        default: Some(default),
                        required: None,
                    });
                }
                ':' if chars.peek() == Some(&'?') => {
                    chars.next();
                    let message = Self::read_until_close(chars, source)?;
                    return Ok(VarSpec {
                        name,
                        default: None,
                        required: Some(message),
                    });
                }
                _ => name.push(c),
            }
        }

        Err(unclosed(source, &name))
    }

    /// Reads up to the matching `}`, keeping nested braces.
    fn read_until_close(
        chars: &mut std::iter::Peekable<std::str::Chars>,
        source: &Path,
    ) -> Result<String, ConfigError> {
        let mut value = String::new();
        let mut depth = 1;

        for c in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(value);
                    }
                }
                _ => {}
            }
            value.push(c);
        }

        Err(unclosed(source, &value))
    }
}

fn unclosed(source: &Path, fragment: &str) -> ConfigError {
    ConfigError::ParseError {
        path: PathBuf::from(source),
        line: None,
        message: format!("unclosed environment variable reference near '{fragment}'"),
    }
}

/// Parses an environment variable with a default value.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn substitute(text: &str) -> (Result<String, ConfigError>, Vec<LoadWarning>) {
        let mut sub = EnvSubstitution::new();
        let result = sub.substitute(text, Path::new("test.yaml"));
        (result, sub.warnings)
    }

    #[test]
    fn test_env_substitution_simple() {
        // PATH is always set
        let (result, _) = substitute("path: ${PATH}");
        let result = result.unwrap();
        assert!(!result.contains("${PATH}"));
        assert!(result.len() > "path: ".len());
    }

    #[test]
    fn test_env_substitution_default() {
        let (result, warnings) = substitute("url: ${BEATBATTLE_TEST_UNSET_XYZ123:-memory}");
        assert_eq!(result.unwrap(), "url: memory");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_env_substitution_default_with_braces() {
        let (result, _) = substitute("v: ${BEATBATTLE_TEST_UNSET_XYZ123:-{a}}");
        assert_eq!(result.unwrap(), "v: {a}");
    }

    #[test]
    fn test_env_substitution_required_missing() {
        let (result, _) = substitute("url: ${BEATBATTLE_TEST_REQUIRED_XYZ123:?database url}");
        match result {
            Err(ConfigError::EnvVarNotSet { var, location }) => {
                assert_eq!(var, "BEATBATTLE_TEST_REQUIRED_XYZ123");
                assert!(location.contains("database url"));
            }
            other => panic!("expected EnvVarNotSet, got {other:?}"),
        }
    }

    #[test]
    fn test_env_substitution_escaped_dollar() {
        let (result, _) = substitute("rules: pay $$5 to enter");
        assert_eq!(result.unwrap(), "rules: pay $5 to enter");
    }

    #[test]
    fn test_env_substitution_missing_warning() {
        let (result, warnings) = substitute("value: ${BEATBATTLE_TEST_WARN_XYZ123}");
        assert_eq!(result.unwrap(), "value: ");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("BEATBATTLE_TEST_WARN_XYZ123"));
    }

    #[test]
    fn test_env_substitution_unclosed() {
        let (result, _) = substitute("value: ${OOPS");
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_load_str_parses_sections() {
        let yaml = "\
database:
  url: memory
tally:
  transaction_timeout: 750ms
display:
  remainder: corrected
";
        let result = ConfigLoader::default()
            .load_str(yaml, Path::new("inline.yaml"))
            .unwrap();
        assert!(result.config.database.is_memory());
        assert_eq!(
            result.config.tally.transaction_timeout,
            Duration::from_millis(750)
        );
        assert_eq!(result.config.display.remainder, RemainderMode::Corrected);
        // memory database warning from validation
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let result = ConfigLoader::default()
            .load_str("\u{feff}\n", Path::new("empty.yaml"))
            .unwrap();
        assert_eq!(result.config, BattleConfig::default());
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let err = ConfigLoader::default()
            .load_str("tally:\n  retries: 3\n", Path::new("bad.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_validation_errors_are_reported() {
        let err = ConfigLoader::default()
            .load_str("database:\n  max_connections: 0\n", Path::new("bad.yaml"))
            .unwrap_err();
        match err {
            ConfigError::ValidationError { errors, .. } => {
                assert_eq!(errors[0].path, "database.max_connections");
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn test_overrides_are_validated() {
        let loader = ConfigLoader::default().with_overrides(ConfigOverrides {
            database_url: Some("postgres://db".into()),
            remainder: None,
        });
        let err = loader
            .load_str("database:\n  url: memory\n", Path::new("o.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));

        let loader = ConfigLoader::default().with_overrides(ConfigOverrides {
            database_url: None,
            remainder: Some(RemainderMode::Corrected),
        });
        let result = loader.load_str("", Path::new("o.yaml")).unwrap();
        assert_eq!(result.config.display.remainder, RemainderMode::Corrected);
    }

    #[test]
    fn test_size_limit() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("big.yaml");
        std::fs::write(&path, "# padding\n".repeat(20)).unwrap();

        let err = ConfigLoader::new(ConfigLimits {
            max_config_size: 16,
        })
        .load(&path)
        .unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge { limit: 16, .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::default()
            .load(Path::new("/nonexistent/beatbattle.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }
}
