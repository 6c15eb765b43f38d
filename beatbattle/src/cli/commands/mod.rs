//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod completions;
pub mod contest;
pub mod init;
pub mod submission;
pub mod version;
pub mod vote;

use std::path::Path;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::app::App;
use crate::cli::args::{Cli, Commands, ContestSubcommand, SubmissionSubcommand};
use crate::config::{BattleConfig, ConfigLoader, ConfigOverrides, LoadWarning};
use crate::error::BattleError;
use crate::observability::init_logging;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// Completions and version run without configuration. Every other
/// command loads the configuration, initializes logging from it unless
/// `--quiet` is set, and builds the services.
///
/// # Errors
///
/// Returns an error if configuration loading, service wiring or the
/// dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), BattleError> {
    let command = match cli.command {
        Commands::Completions(args) => {
            completions::run(&args);
            return Ok(());
        }
        Commands::Version(args) => {
            version::run(&args);
            return Ok(());
        }
        other => other,
    };

    let overrides = ConfigOverrides {
        database_url: cli.database,
        remainder: cli.remainder,
    };
    let (config, warnings) = load_config(cli.config.as_deref(), overrides)?;
    if !cli.quiet {
        init_logging(config.logging.format.into(), cli.verbose, cli.color);
    }
    for warning in &warnings {
        warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }

    let app = App::build(config).await?;

    match command {
        Commands::Init(args) => init::run(&app, &args),
        Commands::Contest(cmd) => match cmd.subcommand {
            ContestSubcommand::Create(args) => contest::create(&app, &args).await,
            ContestSubcommand::Submit(args) => contest::submit(&app, &args).await,
            ContestSubcommand::List(args) => contest::list(&app, &args).await,
            ContestSubcommand::Status(args) => contest::status(&app, &args).await,
            ContestSubcommand::Standings(args) => contest::standings(&app, &args).await,
            ContestSubcommand::Remaining(args) => contest::remaining(&app, &args).await,
            ContestSubcommand::Sweep(args) => contest::sweep(&app, &args, cancel).await,
        },
        Commands::Submission(cmd) => match cmd.subcommand {
            SubmissionSubcommand::Show(args) => submission::show(&app, &args).await,
            SubmissionSubcommand::Withdraw(args) => submission::withdraw(&app, &args).await,
            SubmissionSubcommand::Disqualify(args) => {
                submission::qualify(&app, &args, false).await
            }
            SubmissionSubcommand::Requalify(args) => submission::qualify(&app, &args, true).await,
            SubmissionSubcommand::Place(args) => submission::place(&app, &args).await,
            SubmissionSubcommand::Like(args) => submission::like(&app, &args).await,
            SubmissionSubcommand::Feedback(args) => submission::feedback(&app, &args).await,
        },
        Commands::Vote(args) => vote::run(&app, &args).await,
        Commands::Completions(_) | Commands::Version(_) => Ok(()),
    }
}

/// Loads the configuration file, if any, and applies command-line overrides.
///
/// Without `--config` the defaults are used. Overrides are validated like
/// file values.
///
/// # Errors
///
/// Returns a config error if the file cannot be loaded or an override
/// makes the configuration invalid.
pub fn load_config(
    path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<(BattleConfig, Vec<LoadWarning>), BattleError> {
    let loader = ConfigLoader::default().with_overrides(overrides);
    let result = match path {
        Some(path) => loader.load(path)?,
        None => loader.load_str("", Path::new("<defaults>"))?,
    };
    Ok((result.config, result.warnings))
}

/// Prints `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<(), BattleError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemainderMode;

    #[test]
    fn defaults_without_config_file() {
        let (config, warnings) = load_config(None, ConfigOverrides::default()).unwrap();
        assert_eq!(config, BattleConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn database_override_is_validated() {
        let bad = ConfigOverrides {
            database_url: Some("postgres://db".into()),
            remainder: None,
        };
        let err = load_config(None, bad).unwrap_err();
        assert!(matches!(err, BattleError::Config(_)));

        let memory = ConfigOverrides {
            database_url: Some("memory".into()),
            remainder: None,
        };
        let (config, warnings) = load_config(None, memory).unwrap();
        assert!(config.database.is_memory());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn overrides_apply_on_top_of_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("beatbattle.yaml");
        std::fs::write(
            &path,
            "database:\n  url: memory\ntally:\n  transaction_timeout: 1s\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            database_url: None,
            remainder: Some(RemainderMode::Corrected),
        };
        let (config, _) = load_config(Some(&path), overrides).unwrap();
        assert!(config.database.is_memory());
        assert_eq!(
            config.tally.transaction_timeout,
            std::time::Duration::from_secs(1)
        );
        assert_eq!(config.display.remainder, RemainderMode::Corrected);
    }
}
