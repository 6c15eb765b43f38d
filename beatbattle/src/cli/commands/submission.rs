//! `submission` command handlers
//!
//! Implements `submission show`, `withdraw`, `disqualify`, `requalify`,
//! `place`, `like` and `feedback`.

use serde_json::json;

use beatbattle_core::{ContestId, Submission, SubmissionId, UserId};

use crate::app::App;
use crate::board::SubmissionDetail;
use crate::cli::args::{
    OutputFormat, SubmissionFeedbackArgs, SubmissionLikeArgs, SubmissionModerateArgs,
    SubmissionPlaceArgs, SubmissionShowArgs, SubmissionWithdrawArgs,
};
use crate::error::BattleError;

use super::contest::plural;
use super::print_json;

/// Show a submission with its likes and feedback.
///
/// # Errors
///
/// Returns the gateway error, including `NotFound` for unknown submissions.
pub async fn show(app: &App, args: &SubmissionShowArgs) -> Result<(), BattleError> {
    let detail = app
        .board()
        .submission(SubmissionId(args.submission))
        .await?;

    match args.format {
        OutputFormat::Human => {
            for line in detail_lines(&detail) {
                println!("{line}");
            }
            Ok(())
        }
        OutputFormat::Json => print_json(&detail),
    }
}

/// Withdraw an entrant's submission.
///
/// # Errors
///
/// Returns a contest error if nothing can be withdrawn, or the gateway
/// error.
pub async fn withdraw(app: &App, args: &SubmissionWithdrawArgs) -> Result<(), BattleError> {
    let withdrawal = app
        .board()
        .withdraw(UserId(args.owner), ContestId(args.contest))
        .await?;

    match args.format {
        OutputFormat::Human => {
            println!(
                "submission {} withdrawn from contest {} ({} vote{} removed)",
                withdrawal.submission,
                withdrawal.contest,
                withdrawal.votes_removed,
                plural(withdrawal.votes_removed)
            );
            Ok(())
        }
        OutputFormat::Json => print_json(&withdrawal),
    }
}

/// Disqualify or requalify a submission.
///
/// # Errors
///
/// Returns [`ContestError::NotHost`](beatbattle_core::error::ContestError::NotHost)
/// for anyone but the host, or the gateway error.
pub async fn qualify(
    app: &App,
    args: &SubmissionModerateArgs,
    qualified: bool,
) -> Result<(), BattleError> {
    let host = UserId(args.host);
    let submission = SubmissionId(args.submission);
    let record = if qualified {
        app.board().requalify(host, submission).await?
    } else {
        app.board().disqualify(host, submission).await?
    };

    match args.format {
        OutputFormat::Human => {
            let state = if record.qualified {
                "qualified"
            } else {
                "disqualified"
            };
            println!("submission {} is {state}", record.id);
            Ok(())
        }
        OutputFormat::Json => print_json(&record),
    }
}

/// Set a submission's final placement.
///
/// # Errors
///
/// Returns a contest error if the placement is refused, or the gateway
/// error.
pub async fn place(app: &App, args: &SubmissionPlaceArgs) -> Result<(), BattleError> {
    let record = app
        .board()
        .set_placement(
            UserId(args.host),
            SubmissionId(args.submission),
            args.placement,
        )
        .await?;

    match args.format {
        OutputFormat::Human => {
            println!("{}", placement_line(&record));
            Ok(())
        }
        OutputFormat::Json => print_json(&record),
    }
}

/// Like a submission or take the like back.
///
/// # Errors
///
/// Returns the gateway error, including `NotFound` for unknown submissions.
pub async fn like(app: &App, args: &SubmissionLikeArgs) -> Result<(), BattleError> {
    let submission = SubmissionId(args.submission);
    let outcome = app
        .board()
        .toggle_like(UserId(args.user), submission)
        .await?;

    match args.format {
        OutputFormat::Human => {
            println!("{outcome}");
            Ok(())
        }
        OutputFormat::Json => print_json(&json!({
            "submission": submission,
            "user": args.user,
            "result": outcome,
        })),
    }
}

/// Leave or replace feedback.
///
/// # Errors
///
/// Returns a contest error for blank text or self-feedback, or the gateway
/// error.
pub async fn feedback(app: &App, args: &SubmissionFeedbackArgs) -> Result<(), BattleError> {
    let submission = SubmissionId(args.submission);
    let outcome = app
        .board()
        .leave_feedback(UserId(args.author), submission, &args.text)
        .await?;

    match args.format {
        OutputFormat::Human => {
            println!("{outcome}");
            Ok(())
        }
        OutputFormat::Json => print_json(&json!({
            "submission": submission,
            "author": args.author,
            "result": outcome,
        })),
    }
}

fn placement_line(record: &Submission) -> String {
    match record.placement {
        Some(place) => format!("submission {} placed #{place}", record.id),
        None => format!("submission {} is unplaced", record.id),
    }
}

fn detail_lines(detail: &SubmissionDetail) -> Vec<String> {
    let submission = &detail.submission;
    let mut header = format!(
        "#{} by user {} in contest {}  {}",
        submission.id, submission.owner, submission.contest, submission.url
    );
    if !submission.qualified {
        header.push_str("  [disqualified]");
    }
    if let Some(place) = submission.placement {
        header.push_str(&format!("  [placed #{place}]"));
    }

    let mut lines = vec![
        header,
        format!(
            "{} vote{}, {} like{}",
            submission.votes,
            plural(submission.votes),
            detail.likes,
            plural(detail.likes)
        ),
    ];
    lines.extend(
        detail
            .feedback
            .iter()
            .map(|note| format!("  user {}: {}", note.author, note.text)),
    );
    lines
}
