//! Persistence gateway abstraction.
//!
//! Provides the [`Gateway`] trait through which the status resolver and the
//! tally engine reach contest, submission and vote records, and the
//! [`VoteTransaction`] trait for the tally engine's atomic mutation.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryGateway`]: process-local tables, used by tests and demos
//! - [`SqliteGateway`]: `sqlx` over a SQLite database file

pub mod memory;
pub mod sqlite;

pub use memory::{Fault, MemoryGateway};
pub use sqlite::SqliteGateway;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use beatbattle_core::config::DatabaseConfig;
use beatbattle_core::{
    Contest, ContestDraft, ContestFilter, ContestId, Deadlines, Feedback, NewSubmission, Phase,
    Submission, SubmissionId, SubmissionOwner, UserId, VoteId,
};

use crate::error::GatewayError;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// The (voter, contest) pair a vote transaction is serialized on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BallotKey {
    /// Voting user
    pub voter: UserId,
    /// Contest the vote belongs to
    pub contest: ContestId,
}

/// Read/write access to contest, submission and vote records.
///
/// Plain methods are single statements with at least read-committed
/// visibility. Vote mutations go through [`Gateway::begin`].
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Reads the persisted phase of a contest.
    async fn contest_phase(&self, contest: ContestId) -> Result<Phase>;

    /// Moves a contest from `expected` to `new` if and only if it is still in
    /// `expected` and `new` is the next phase.
    ///
    /// Returns `false` without writing when the stored phase differs (another
    /// caller already advanced it) or the step is not a single forward move.
    async fn set_contest_phase(
        &self,
        contest: ContestId,
        expected: Phase,
        new: Phase,
    ) -> Result<bool>;

    /// Reads the entry and voting deadlines of a contest.
    async fn contest_deadlines(&self, contest: ContestId) -> Result<Deadlines>;

    /// Reads the votes-per-user cap of a contest.
    async fn max_votes(&self, contest: ContestId) -> Result<u32>;

    /// Looks up the owner and contest of a submission.
    async fn submission_owner(&self, submission: SubmissionId) -> Result<Option<SubmissionOwner>>;

    /// Finds the live vote of `voter` for `submission`.
    async fn find_vote(&self, voter: UserId, submission: SubmissionId) -> Result<Option<VoteId>>;

    /// Counts the live votes of `voter` within `contest`.
    async fn count_votes(&self, voter: UserId, contest: ContestId) -> Result<u32>;

    /// Opens a vote transaction.
    ///
    /// The transaction is serialized against every other transaction for the
    /// same [`BallotKey`]: a second `begin` for the key waits until the first
    /// commits or rolls back. Dropping the transaction rolls it back.
    async fn begin(&self, key: BallotKey) -> Result<Box<dyn VoteTransaction>>;

    /// Reads a full contest record, including its submission count.
    async fn contest(&self, contest: ContestId) -> Result<Contest>;

    /// Lists contests for a board view.
    ///
    /// `Open` is ordered by entry deadline ascending, `Past` descending.
    async fn list_contests(&self, filter: ContestFilter) -> Result<Vec<Contest>>;

    /// Lists the submissions of a contest, most votes first, ties by id.
    async fn submissions(&self, contest: ContestId) -> Result<Vec<Submission>>;

    /// Inserts a contest in the `Entry` phase.
    ///
    /// The draft is expected to be validated by the caller.
    async fn create_contest(&self, draft: &ContestDraft) -> Result<ContestId>;

    /// Registers a submission. A second submission by the same owner in the
    /// same contest replaces the media reference of the first.
    async fn create_submission(&self, submission: &NewSubmission) -> Result<SubmissionId>;

    /// Reads one submission.
    async fn submission(&self, submission: SubmissionId) -> Result<Submission>;

    /// Deletes a submission together with its votes, likes and feedback.
    ///
    /// The vote rows and the tally disappear in one atomic step. Returns
    /// the number of vote rows removed.
    async fn delete_submission(&self, submission: SubmissionId) -> Result<u32>;

    /// Marks a submission qualified or disqualified. Disqualifying also
    /// clears its placement.
    async fn set_qualified(&self, submission: SubmissionId, qualified: bool) -> Result<()>;

    /// Writes a set of placements for submissions of `contest` atomically.
    async fn set_placements(
        &self,
        contest: ContestId,
        placements: &[(SubmissionId, Option<u32>)],
    ) -> Result<()>;

    /// Adds the like of `user` on `submission`, or removes it if present.
    ///
    /// Returns `true` when the user likes the submission afterwards.
    async fn toggle_like(&self, user: UserId, submission: SubmissionId) -> Result<bool>;

    /// Counts likes on a submission.
    async fn like_count(&self, submission: SubmissionId) -> Result<u32>;

    /// Stores the feedback of `author` on `submission`, replacing earlier
    /// text by the same author.
    ///
    /// Returns `true` when no earlier feedback existed.
    async fn upsert_feedback(
        &self,
        author: UserId,
        submission: SubmissionId,
        text: &str,
    ) -> Result<bool>;

    /// Lists feedback on a submission ordered by author.
    async fn feedback(&self, submission: SubmissionId) -> Result<Vec<Feedback>>;
}

/// One atomic unit of vote mutations.
///
/// Nothing written through a transaction is visible to other readers until
/// [`commit`](VoteTransaction::commit) succeeds.
#[async_trait]
pub trait VoteTransaction: Send {
    /// Finds the live vote of `voter` for `submission`.
    async fn find_vote(
        &mut self,
        voter: UserId,
        submission: SubmissionId,
    ) -> Result<Option<VoteId>>;

    /// Counts the live votes of `voter` within `contest`.
    async fn count_votes(&mut self, voter: UserId, contest: ContestId) -> Result<u32>;

    /// Inserts a vote row.
    async fn insert_vote(
        &mut self,
        voter: UserId,
        submission: SubmissionId,
        contest: ContestId,
    ) -> Result<VoteId>;

    /// Deletes a vote row.
    async fn delete_vote(&mut self, vote: VoteId) -> Result<()>;

    /// Adds `delta` to a submission's tally and returns the new value.
    async fn adjust_tally(&mut self, submission: SubmissionId, delta: i64) -> Result<u32>;

    /// Makes every change of this transaction visible at once.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every change of this transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Runs `work` inside a vote transaction for `key`.
///
/// Acquisition is bounded by `timeout`; expiry yields
/// [`GatewayError::Timeout`]. The transaction commits only when `work`
/// returns `Ok`, and is rolled back on any error.
///
/// # Errors
///
/// Returns the acquisition, work or commit error.
pub async fn with_transaction<G, T, F>(
    gateway: &G,
    key: BallotKey,
    timeout: Duration,
    work: F,
) -> Result<T>
where
    G: Gateway + ?Sized,
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn VoteTransaction) -> BoxFuture<'t, Result<T>> + Send,
{
    let mut tx = tokio::time::timeout(timeout, gateway.begin(key))
        .await
        .map_err(|_| GatewayError::Timeout { waited: timeout })??;

    let outcome = work(tx.as_mut()).await;
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed after transaction error");
            }
            Err(err)
        }
    }
}

/// Logs and counts a failed gateway call.
pub(crate) fn report(err: &GatewayError) {
    if err.is_not_found() {
        debug!(error = %err, "gateway lookup missed");
    } else {
        warn!(kind = err.kind(), error = %err, "gateway call failed");
    }
    crate::observability::metrics::record_gateway_error(err.kind());
}

/// Opens the gateway selected by the database settings.
///
/// `write_timeout` bounds how long a write waits for another writer.
///
/// # Errors
///
/// Returns a database error if the SQLite pool cannot be created.
pub async fn open(config: &DatabaseConfig, write_timeout: Duration) -> Result<Arc<dyn Gateway>> {
    if config.is_memory() {
        return Ok(Arc::new(MemoryGateway::new()));
    }
    let gateway = SqliteGateway::connect(config, write_timeout).await?;
    gateway.migrate().await?;
    Ok(Arc::new(gateway))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    async fn seeded() -> (MemoryGateway, BallotKey, SubmissionId) {
        let gateway = MemoryGateway::new();
        let now = Utc::now();
        let contest = gateway
            .create_contest(&ContestDraft {
                title: "t".into(),
                rules: "r".into(),
                deadlines: Deadlines {
                    entry: now + ChronoDuration::hours(1),
                    voting: now + ChronoDuration::hours(2),
                },
                host: UserId(1),
                password: None,
                max_votes: 2,
            })
            .await
            .unwrap();
        let submission = gateway
            .create_submission(&NewSubmission {
                owner: UserId(2),
                contest,
                url: "https://soundcloud.com/a/b".into(),
            })
            .await
            .unwrap();
        let key = BallotKey {
            voter: UserId(3),
            contest,
        };
        (gateway, key, submission)
    }

    #[tokio::test]
    async fn commits_on_success() {
        let (gateway, key, submission) = seeded().await;
        let votes = with_transaction(&gateway, key, Duration::from_secs(1), |tx| {
            Box::pin(async move {
                tx.insert_vote(key.voter, submission, key.contest).await?;
                tx.adjust_tally(submission, 1).await
            })
        })
        .await
        .unwrap();

        assert_eq!(votes, 1);
        assert!(
            gateway
                .find_vote(key.voter, submission)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn rolls_back_on_error() {
        let (gateway, key, submission) = seeded().await;
        let result: Result<()> = with_transaction(&gateway, key, Duration::from_secs(1), |tx| {
            Box::pin(async move {
                tx.insert_vote(key.voter, submission, key.contest).await?;
                tx.adjust_tally(submission, 1).await?;
                Err(GatewayError::Database("boom".into()))
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(gateway.count_votes(key.voter, key.contest).await.unwrap(), 0);
        assert_eq!(gateway.submissions(key.contest).await.unwrap()[0].votes, 0);
    }

    #[tokio::test]
    async fn times_out_while_key_is_held() {
        let (gateway, key, _) = seeded().await;
        let _held = gateway.begin(key).await.unwrap();

        let result: Result<()> =
            with_transaction(&gateway, key, Duration::from_millis(50), |_tx| {
                Box::pin(async move { Ok(()) })
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Timeout { .. })));
    }

    #[tokio::test]
    async fn open_selects_memory_gateway() {
        let config = DatabaseConfig {
            url: "memory".into(),
            ..DatabaseConfig::default()
        };
        let gateway = open(&config, Duration::from_secs(1)).await.unwrap();
        assert!(gateway.list_contests(ContestFilter::Open).await.unwrap().is_empty());
    }
}
