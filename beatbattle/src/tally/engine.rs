//! Vote toggle with per-user caps.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use beatbattle_core::config::TallyConfig;
use beatbattle_core::{ContestId, Phase, Rejection, SubmissionId, UserId, VoteOutcome};

use crate::gateway::{self, BallotKey, Gateway, Result, with_transaction};
use crate::observability::{Event, metrics};
use crate::status::StatusResolver;

/// Applies vote toggles.
///
/// Phase checks go through the [`StatusResolver`], so a vote can be the
/// read that opens or closes voting on a contest.
#[derive(Debug, Clone)]
pub struct TallyEngine {
    resolver: StatusResolver,
    transaction_timeout: Duration,
}

impl TallyEngine {
    /// Creates an engine with the default transaction timeout.
    #[must_use]
    pub fn new(resolver: StatusResolver) -> Self {
        Self {
            resolver,
            transaction_timeout: TallyConfig::default().transaction_timeout,
        }
    }

    /// Bounds how long a vote waits for its transaction.
    #[must_use]
    pub const fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    /// Returns the resolver used for phase checks.
    #[must_use]
    pub const fn resolver(&self) -> &StatusResolver {
        &self.resolver
    }

    fn gateway(&self) -> &dyn Gateway {
        self.resolver.gateway().as_ref()
    }

    /// Casts or withdraws `voter`'s vote for `submission`.
    ///
    /// Checks, in order: the submission exists, its contest is in `Voting`
    /// (after resolution), the voter does not own it. Then, in one
    /// transaction: an existing vote is withdrawn; otherwise a vote is cast
    /// if the voter holds fewer than the contest's cap.
    ///
    /// # Errors
    ///
    /// Returns a gateway error if a read fails or the transaction cannot be
    /// acquired, applied or committed. Nothing is mutated in that case.
    #[instrument(skip(self))]
    pub async fn apply_vote(&self, voter: UserId, submission: SubmissionId) -> Result<VoteOutcome> {
        let started = Instant::now();
        let result = self.decide(voter, submission).await;
        let elapsed = started.elapsed();
        metrics::record_vote_duration(elapsed);

        match result {
            Ok((outcome, contest)) => {
                if outcome.is_mutation() {
                    info!(%voter, %submission, %outcome, "vote applied");
                } else {
                    debug!(%voter, %submission, %outcome, "vote rejected");
                }
                metrics::record_vote(&outcome);
                self.resolver.events().emit(Event::VoteApplied {
                    timestamp: self.resolver.clock().now(),
                    voter,
                    submission,
                    contest,
                    outcome: outcome.label().to_string(),
                    duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                });
                Ok(outcome)
            }
            Err(err) => {
                gateway::report(&err);
                Err(err)
            }
        }
    }

    async fn decide(
        &self,
        voter: UserId,
        submission: SubmissionId,
    ) -> Result<(VoteOutcome, Option<ContestId>)> {
        let Some(owner) = self.gateway().submission_owner(submission).await? else {
            return Ok((VoteOutcome::Rejected(Rejection::NotFound), None));
        };
        let contest = owner.contest;
        let reject = |reason| Ok((VoteOutcome::Rejected(reason), Some(contest)));

        let status = match self.resolver.advance(contest, false).await {
            Ok(status) => status,
            Err(err) if err.is_not_found() => return reject(Rejection::NotFound),
            Err(err) => return Err(err),
        };
        if status.phase != Phase::Voting {
            return reject(Rejection::NotVoting);
        }
        if owner.user == voter {
            return reject(Rejection::SelfVote);
        }

        let max_votes = self.gateway().max_votes(contest).await?;
        let key = BallotKey { voter, contest };
        let outcome = with_transaction(self.gateway(), key, self.transaction_timeout, move |tx| {
            Box::pin(async move {
                if let Some(vote) = tx.find_vote(voter, submission).await? {
                    tx.delete_vote(vote).await?;
                    tx.adjust_tally(submission, -1).await?;
                    return Ok(VoteOutcome::VoteWithdrawn);
                }
                if tx.count_votes(voter, contest).await? >= max_votes {
                    return Ok(VoteOutcome::Rejected(Rejection::MaxVotesReached));
                }
                tx.insert_vote(voter, submission, contest).await?;
                tx.adjust_tally(submission, 1).await?;
                Ok(VoteOutcome::VoteCast)
            })
        })
        .await;

        match outcome {
            Ok(outcome) => Ok((outcome, Some(contest))),
            // Withdrawn after the owner lookup
            Err(err) if err.is_not_found() => reject(Rejection::NotFound),
            Err(err) => Err(err),
        }
    }
}
