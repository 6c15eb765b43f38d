//! `vote` command
//!
//! Applies one vote request and prints the outcome. Rejections are printed
//! like any other outcome and do not change the exit code.

use serde::Serialize;

use beatbattle_core::{SubmissionId, UserId, VoteOutcome};

use crate::app::App;
use crate::cli::args::{OutputFormat, VoteArgs};
use crate::error::BattleError;

use super::print_json;

#[derive(Serialize)]
struct VoteReport {
    voter: UserId,
    submission: SubmissionId,
    result: VoteOutcome,
}

/// Cast or withdraw a vote.
///
/// # Errors
///
/// Returns the gateway error if the vote could not be applied.
pub async fn run(app: &App, args: &VoteArgs) -> Result<(), BattleError> {
    let voter = UserId(args.voter);
    let submission = SubmissionId(args.submission);
    let outcome = app.engine().apply_vote(voter, submission).await?;

    match args.format {
        OutputFormat::Human => {
            println!("{outcome}");
            Ok(())
        }
        OutputFormat::Json => print_json(&VoteReport {
            voter,
            submission,
            result: outcome,
        }),
    }
}
