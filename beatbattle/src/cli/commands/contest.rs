//! `contest` command handlers
//!
//! Implements `contest create`, `submit`, `list`, `status`, `standings`,
//! `remaining` and `sweep`.

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use beatbattle_core::{ContestDraft, ContestFilter, ContestId, Deadlines, NewSubmission, UserId};

use crate::app::App;
use crate::board::{ContestSummary, Standing, SweepReport};
use crate::cli::args::{
    ContestCreateArgs, ContestListArgs, ContestRemainingArgs, ContestStandingsArgs,
    ContestStatusArgs, ContestSubmitArgs, ContestSweepArgs, OutputFormat,
};
use crate::error::BattleError;

use super::print_json;

/// Create a contest.
///
/// # Errors
///
/// Returns a contest error for an invalid draft, or the gateway error.
pub async fn create(app: &App, args: &ContestCreateArgs) -> Result<(), BattleError> {
    let now = app.resolver().clock().now();
    let draft = ContestDraft {
        title: args.title.clone(),
        rules: args.rules.clone(),
        deadlines: Deadlines {
            entry: args.entry_deadline.resolve(now),
            voting: args.voting_deadline.resolve(now),
        },
        host: UserId(args.host),
        password: args.password.clone(),
        max_votes: args.max_votes,
    };
    let id = app.board().create(&draft).await?;

    match args.format {
        OutputFormat::Human => {
            println!("created contest {id}");
            Ok(())
        }
        OutputFormat::Json => print_json(&json!({ "id": id, "deadlines": draft.deadlines })),
    }
}

/// Register or replace a submission.
///
/// # Errors
///
/// Returns a contest error if the entry is refused, or the gateway error.
pub async fn submit(app: &App, args: &ContestSubmitArgs) -> Result<(), BattleError> {
    let entry = NewSubmission {
        owner: UserId(args.owner),
        contest: ContestId(args.contest),
        url: args.url.clone(),
    };
    let id = app.board().submit(&entry, args.password.as_deref()).await?;

    match args.format {
        OutputFormat::Human => {
            println!("submission {id} entered in contest {}", entry.contest);
            Ok(())
        }
        OutputFormat::Json => print_json(&json!({ "id": id, "contest": entry.contest })),
    }
}

/// List open or past contests.
///
/// # Errors
///
/// Returns the gateway error.
pub async fn list(app: &App, args: &ContestListArgs) -> Result<(), BattleError> {
    let filter = if args.past {
        ContestFilter::Past
    } else {
        ContestFilter::Open
    };
    let rows = app.board().list(filter).await?;

    match args.format {
        OutputFormat::Human => {
            if rows.is_empty() {
                println!("no contests");
            }
            for row in &rows {
                println!("{}", summary_line(row));
            }
            Ok(())
        }
        OutputFormat::Json => print_json(&rows),
    }
}

/// Show a contest's display status.
///
/// # Errors
///
/// Returns the gateway error, including `NotFound` for unknown contests.
pub async fn status(app: &App, args: &ContestStatusArgs) -> Result<(), BattleError> {
    let status = app
        .resolver()
        .resolve(ContestId(args.contest), args.short)
        .await?;

    match args.format {
        OutputFormat::Human => {
            println!("{status}");
            Ok(())
        }
        OutputFormat::Json => print_json(&status),
    }
}

/// Show ranked submissions.
///
/// # Errors
///
/// Returns the gateway error, including `NotFound` for unknown contests.
pub async fn standings(app: &App, args: &ContestStandingsArgs) -> Result<(), BattleError> {
    let standings = app.board().standings(ContestId(args.contest)).await?;

    match args.format {
        OutputFormat::Human => {
            if standings.is_empty() {
                println!("no submissions");
            }
            for standing in &standings {
                println!("{}", standing_line(standing));
            }
            Ok(())
        }
        OutputFormat::Json => print_json(&standings),
    }
}

/// Show how many votes a user may still cast.
///
/// # Errors
///
/// Returns the gateway error, including `NotFound` for unknown contests.
pub async fn remaining(app: &App, args: &ContestRemainingArgs) -> Result<(), BattleError> {
    let contest = ContestId(args.contest);
    let voter = UserId(args.voter);
    let remaining = app.board().votes_remaining(voter, contest).await?;

    match args.format {
        OutputFormat::Human => {
            println!("{remaining} vote{} remaining", plural(remaining));
            Ok(())
        }
        OutputFormat::Json => print_json(&json!({
            "contest": contest,
            "voter": voter,
            "remaining": remaining,
        })),
    }
}

/// Resolve every open contest, once or until cancelled.
///
/// # Errors
///
/// Returns the first gateway error; a watch loop stops on it.
pub async fn sweep(
    app: &App,
    args: &ContestSweepArgs,
    cancel: CancellationToken,
) -> Result<(), BattleError> {
    loop {
        let report = app.board().sweep().await?;
        print_sweep(&report, args.format)?;

        if !args.watch {
            return Ok(());
        }
        tokio::select! {
            () = cancel.cancelled() => {
                info!("sweep watch stopped");
                return Ok(());
            }
            () = tokio::time::sleep(*args.interval) => {}
        }
    }
}

fn print_sweep(report: &SweepReport, format: OutputFormat) -> Result<(), BattleError> {
    match format {
        OutputFormat::Human => {
            println!(
                "examined {} contest{}, advanced {}",
                report.examined,
                plural(report.examined),
                report.advanced.len()
            );
            for status in &report.advanced {
                println!("  {:>5}  {}", status.contest.0, status.text);
            }
            Ok(())
        }
        // One document per sweep so watch output stays line-delimited
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(report)?);
            Ok(())
        }
    }
}

fn summary_line(row: &ContestSummary) -> String {
    let lock = if row.password_protected { " [locked]" } else { "" };
    format!(
        "{:>5}  {:<28}  {}{lock} ({} entr{})",
        row.id.0,
        row.status,
        row.title,
        row.submission_count,
        if row.submission_count == 1 { "y" } else { "ies" }
    )
}

fn standing_line(standing: &Standing) -> String {
    let submission = &standing.submission;
    format!(
        "{:>3}. {:>4} vote{}  #{} by user {}  {}",
        standing.rank,
        submission.votes,
        plural(submission.votes),
        submission.id,
        submission.owner,
        submission.url
    )
}

pub(super) fn plural<N: PartialEq + From<u8>>(n: N) -> &'static str {
    if n == N::from(1) { "" } else { "s" }
}
