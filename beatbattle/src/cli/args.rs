//! CLI argument definitions
//!
//! All Clap derive structs for `beatbattle` command-line parsing.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use beatbattle_core::config::RemainderMode;

// ============================================================================
// Root CLI
// ============================================================================

/// Operator tooling for timed beat battles.
#[derive(Parser, Debug)]
#[command(name = "beatbattle", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "BEATBATTLE_COLOR")]
    pub color: ColorChoice,

    /// Path to YAML configuration file.
    #[arg(short, long, global = true, env = "BEATBATTLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database URL (`sqlite://path` or `memory`), overriding the config file.
    #[arg(long, global = true, env = "BEATBATTLE_DATABASE_URL")]
    pub database: Option<String>,

    /// Override the remainder mode used for display text.
    #[arg(long, global = true)]
    pub remainder: Option<RemainderMode>,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database schema.
    Init(InitArgs),

    /// Create, inspect and advance contests.
    Contest(ContestCommand),

    /// Withdraw, moderate, like and review submissions.
    Submission(SubmissionCommand),

    /// Cast or withdraw a vote.
    Vote(VoteArgs),

    /// Generate shell completion scripts.
    Completions(CompletionsArgs),

    /// Display version and build information.
    Version(VersionArgs),
}

/// Arguments for `init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Contest Command
// ============================================================================

/// Contest management commands.
#[derive(Args, Debug)]
pub struct ContestCommand {
    /// Contest subcommand.
    #[command(subcommand)]
    pub subcommand: ContestSubcommand,
}

/// Contest subcommands.
#[derive(Subcommand, Debug)]
pub enum ContestSubcommand {
    /// Create a contest.
    Create(ContestCreateArgs),

    /// Register or replace a submission.
    Submit(ContestSubmitArgs),

    /// List open or past contests.
    List(ContestListArgs),

    /// Show a contest's display status, advancing its phase if due.
    Status(ContestStatusArgs),

    /// Show ranked submissions.
    Standings(ContestStandingsArgs),

    /// Show how many votes a user may still cast.
    Remaining(ContestRemainingArgs),

    /// Resolve every open contest.
    Sweep(ContestSweepArgs),
}

/// Arguments for `contest create`.
#[derive(Args, Debug)]
pub struct ContestCreateArgs {
    /// Display title.
    #[arg(long)]
    pub title: String,

    /// Rules text.
    #[arg(long)]
    pub rules: String,

    /// Hosting user id.
    #[arg(long)]
    pub host: i64,

    /// End of the entry window: RFC 3339 timestamp or offset from now (`3d`).
    #[arg(long, value_parser = parse_deadline)]
    pub entry_deadline: DeadlineArg,

    /// End of the voting window: RFC 3339 timestamp or offset from now.
    #[arg(long, value_parser = parse_deadline)]
    pub voting_deadline: DeadlineArg,

    /// Password entrants must supply.
    #[arg(long)]
    pub password: Option<String>,

    /// Votes each user may hold in this contest (1-10).
    #[arg(long, default_value_t = 1)]
    pub max_votes: u32,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `contest submit`.
#[derive(Args, Debug)]
pub struct ContestSubmitArgs {
    /// Contest id.
    pub contest: i64,

    /// Entrant user id.
    #[arg(long)]
    pub owner: i64,

    /// Media URL.
    #[arg(long)]
    pub url: String,

    /// Contest password, if the contest has one.
    #[arg(long)]
    pub password: Option<String>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `contest list`.
#[derive(Args, Debug)]
pub struct ContestListArgs {
    /// List completed contests instead of open ones.
    #[arg(long)]
    pub past: bool,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `contest status`.
#[derive(Args, Debug)]
pub struct ContestStatusArgs {
    /// Contest id.
    pub contest: i64,

    /// Render only the largest time unit.
    #[arg(long)]
    pub short: bool,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `contest standings`.
#[derive(Args, Debug)]
pub struct ContestStandingsArgs {
    /// Contest id.
    pub contest: i64,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `contest remaining`.
#[derive(Args, Debug)]
pub struct ContestRemainingArgs {
    /// Contest id.
    pub contest: i64,

    /// Voting user id.
    #[arg(long)]
    pub voter: i64,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `contest sweep`.
#[derive(Args, Debug)]
pub struct ContestSweepArgs {
    /// Keep sweeping until interrupted.
    #[arg(long)]
    pub watch: bool,

    /// Pause between sweeps in watch mode.
    #[arg(long, default_value = "30s", requires = "watch")]
    pub interval: humantime::Duration,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Submission Command
// ============================================================================

/// Submission commands.
#[derive(Args, Debug)]
pub struct SubmissionCommand {
    /// Submission subcommand.
    #[command(subcommand)]
    pub subcommand: SubmissionSubcommand,
}

/// Submission subcommands.
#[derive(Subcommand, Debug)]
pub enum SubmissionSubcommand {
    /// Show a submission with its likes and feedback.
    Show(SubmissionShowArgs),

    /// Withdraw an entrant's submission and its votes.
    Withdraw(SubmissionWithdrawArgs),

    /// Remove a submission from the standings (host only).
    Disqualify(SubmissionModerateArgs),

    /// Put a disqualified submission back (host only).
    Requalify(SubmissionModerateArgs),

    /// Set a final placement once voting has closed (host only).
    Place(SubmissionPlaceArgs),

    /// Like a submission, or take the like back.
    Like(SubmissionLikeArgs),

    /// Leave or replace feedback on a submission.
    Feedback(SubmissionFeedbackArgs),
}

/// Arguments for `submission show`.
#[derive(Args, Debug)]
pub struct SubmissionShowArgs {
    /// Submission id.
    pub submission: i64,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `submission withdraw`.
#[derive(Args, Debug)]
pub struct SubmissionWithdrawArgs {
    /// Contest id.
    pub contest: i64,

    /// Entrant user id.
    #[arg(long)]
    pub owner: i64,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `submission disqualify` and `requalify`.
#[derive(Args, Debug)]
pub struct SubmissionModerateArgs {
    /// Submission id.
    pub submission: i64,

    /// Hosting user id.
    #[arg(long)]
    pub host: i64,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `submission place`.
#[derive(Args, Debug)]
pub struct SubmissionPlaceArgs {
    /// Submission id.
    pub submission: i64,

    /// Hosting user id.
    #[arg(long)]
    pub host: i64,

    /// Placement, 1 for the winner.
    #[arg(long)]
    pub placement: u32,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `submission like`.
#[derive(Args, Debug)]
pub struct SubmissionLikeArgs {
    /// Submission id.
    pub submission: i64,

    /// Liking user id.
    #[arg(long)]
    pub user: i64,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `submission feedback`.
#[derive(Args, Debug)]
pub struct SubmissionFeedbackArgs {
    /// Submission id.
    pub submission: i64,

    /// Author user id.
    #[arg(long)]
    pub author: i64,

    /// Feedback text.
    #[arg(long)]
    pub text: String,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Vote Command
// ============================================================================

/// Arguments for `vote`.
#[derive(Args, Debug)]
pub struct VoteArgs {
    /// Voting user id.
    #[arg(long)]
    pub voter: i64,

    /// Submission id.
    #[arg(long)]
    pub submission: i64,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Completions / Version
// ============================================================================

/// Arguments for shell completion generation.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell for completion script.
    pub shell: Shell,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Types
// ============================================================================

/// A deadline given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineArg {
    /// An absolute instant.
    At(DateTime<Utc>),
    /// An offset from the time the command runs.
    In(std::time::Duration),
}

impl DeadlineArg {
    /// Resolves the deadline against `now`.
    ///
    /// Offsets too large for `chrono` saturate to the far future.
    #[must_use]
    pub fn resolve(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::At(at) => at,
            Self::In(offset) => chrono::Duration::from_std(offset)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

fn parse_deadline(s: &str) -> Result<DeadlineArg, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(DeadlineArg::At(at.with_timezone(&Utc)));
    }
    humantime::parse_duration(s)
        .map(DeadlineArg::In)
        .map_err(|e| format!("expected an RFC 3339 timestamp or a duration like '3d': {e}"))
}

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

/// Shell type for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// `PowerShell`.
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell.
    Elvish,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_output() {
        let err = Cli::try_parse_from(["beatbattle", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_output() {
        let err = Cli::try_parse_from(["beatbattle", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_contest_create_parses_deadlines() {
        let cli = Cli::try_parse_from([
            "beatbattle",
            "contest",
            "create",
            "--title",
            "Flip Friday",
            "--rules",
            "one sample",
            "--host",
            "1",
            "--entry-deadline",
            "2d",
            "--voting-deadline",
            "2030-01-01T00:00:00Z",
            "--max-votes",
            "3",
        ])
        .unwrap();

        let Commands::Contest(ContestCommand {
            subcommand: ContestSubcommand::Create(args),
        }) = cli.command
        else {
            panic!("expected contest create");
        };
        assert_eq!(
            args.entry_deadline,
            DeadlineArg::In(std::time::Duration::from_secs(2 * 86_400))
        );
        assert!(matches!(args.voting_deadline, DeadlineArg::At(_)));
        assert_eq!(args.max_votes, 3);
        assert_eq!(args.format, OutputFormat::Human);
    }

    #[test]
    fn test_bad_deadline_rejected() {
        let result = Cli::try_parse_from([
            "beatbattle",
            "contest",
            "create",
            "--title",
            "t",
            "--rules",
            "r",
            "--host",
            "1",
            "--entry-deadline",
            "next tuesday",
            "--voting-deadline",
            "3d",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_deadline_offset_resolves_from_now() {
        let now = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let resolved = DeadlineArg::In(std::time::Duration::from_secs(3600)).resolve(now);
        assert_eq!(resolved, now + chrono::Duration::hours(1));
    }

    #[test]
    fn test_interval_requires_watch() {
        let result = Cli::try_parse_from(["beatbattle", "contest", "sweep", "--interval", "5s"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "beatbattle",
            "contest",
            "sweep",
            "--watch",
            "--interval",
            "5s",
        ])
        .unwrap();
        let Commands::Contest(ContestCommand {
            subcommand: ContestSubcommand::Sweep(args),
        }) = cli.command
        else {
            panic!("expected contest sweep");
        };
        assert_eq!(*args.interval, std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "beatbattle",
            "vote",
            "--voter",
            "7",
            "--submission",
            "9",
            "--database",
            "memory",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.database.as_deref(), Some("memory"));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_remainder_override_parses() {
        let cli = Cli::try_parse_from([
            "beatbattle",
            "--remainder",
            "corrected",
            "contest",
            "status",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.remainder, Some(RemainderMode::Corrected));
    }

    #[test]
    fn test_color_choices_parse() {
        for variant in ["auto", "always", "never"] {
            let cli = Cli::try_parse_from(["beatbattle", "--color", variant, "contest", "list"]);
            assert!(cli.is_ok(), "Failed to parse color={variant}");
        }
    }

    #[test]
    fn test_completions_shells_parse() {
        for shell in ["bash", "zsh", "fish", "powershell", "elvish"] {
            let cli = Cli::try_parse_from(["beatbattle", "completions", shell]);
            assert!(cli.is_ok(), "Failed to parse shell={shell}");
        }
    }

    #[test]
    fn test_exit_code_mapping() {
        use crate::error::{BattleError, ConfigError, ContestError, ExitCode, GatewayError};

        let cases: Vec<(BattleError, i32)> = vec![
            (
                ConfigError::MissingFile {
                    path: PathBuf::from("/x"),
                }
                .into(),
                ExitCode::CONFIG_ERROR,
            ),
            (
                GatewayError::contest_not_found(4).into(),
                ExitCode::GATEWAY_ERROR,
            ),
            (
                GatewayError::Database("locked".into()).into(),
                ExitCode::TRANSIENT_ERROR,
            ),
            (ContestError::WrongPassword.into(), ExitCode::CONTEST_ERROR),
            (
                BattleError::Usage("x".into()),
                ExitCode::USAGE_ERROR,
            ),
            (
                std::io::Error::new(std::io::ErrorKind::NotFound, "x").into(),
                ExitCode::IO_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.exit_code(), expected, "Wrong exit code for {err}");
        }
    }

    #[test]
    fn test_submission_place_parses() {
        let cli = Cli::try_parse_from([
            "beatbattle",
            "submission",
            "place",
            "7",
            "--host",
            "1",
            "--placement",
            "2",
        ])
        .unwrap();
        let Commands::Submission(cmd) = cli.command else {
            panic!("expected submission command");
        };
        let SubmissionSubcommand::Place(args) = cmd.subcommand else {
            panic!("expected place");
        };
        assert_eq!((args.submission, args.host, args.placement), (7, 1, 2));
    }

    #[test]
    fn test_submission_feedback_requires_text() {
        let err = Cli::try_parse_from([
            "beatbattle",
            "submission",
            "feedback",
            "7",
            "--author",
            "3",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
