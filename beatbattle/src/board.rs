//! Contest board queries.
//!
//! Listing, standings, entry and moderation operations built on the
//! resolver. Every contest read here is resolved first, so board traffic
//! alone is enough to move contests through their phases.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use beatbattle_core::error::ContestError;
use beatbattle_core::{
    Contest, ContestDraft, ContestFilter, ContestId, Deadlines, Feedback, FeedbackOutcome,
    LikeOutcome, NewSubmission, Phase, Submission, SubmissionId, UserId, reorder_placements,
};

use crate::error::Result;
use crate::gateway::{self, Gateway};
use crate::observability::Event;
use crate::status::{DisplayStatus, StatusResolver};

/// One row of a contest listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContestSummary {
    /// Contest identifier
    pub id: ContestId,
    /// Display title
    pub title: String,
    /// Hosting user
    pub host: UserId,
    /// Phase after resolution
    pub phase: Phase,
    /// Entry and voting deadlines
    pub deadlines: Deadlines,
    /// Votes-per-user cap
    pub max_votes: u32,
    /// Number of submissions
    pub submission_count: u32,
    /// Whether entering requires a password
    pub password_protected: bool,
    /// Short display status
    pub status: String,
}

impl ContestSummary {
    fn new(contest: Contest, status: DisplayStatus) -> Self {
        Self {
            id: contest.id,
            title: contest.title,
            host: contest.host,
            phase: status.phase,
            deadlines: contest.deadlines,
            max_votes: contest.max_votes,
            submission_count: contest.submission_count,
            password_protected: contest.password.is_some(),
            status: status.text,
        }
    }
}

/// A ranked submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    /// Competition rank: 1 + number of submissions with strictly more votes
    pub rank: u32,
    /// The submission
    #[serde(flatten)]
    pub submission: Submission,
}

/// A submission with its likes and feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionDetail {
    /// The submission
    #[serde(flatten)]
    pub submission: Submission,
    /// Number of likes
    pub likes: u32,
    /// Feedback ordered by author
    pub feedback: Vec<Feedback>,
}

/// A withdrawn submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Withdrawal {
    /// Contest it was entered in
    pub contest: ContestId,
    /// The removed submission
    pub submission: SubmissionId,
    /// Votes removed with it
    pub votes_removed: u32,
}

/// Result of one sweep over open contests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Contests examined
    pub examined: usize,
    /// Contests whose phase advanced, with their new status
    pub advanced: Vec<DisplayStatus>,
}

/// Read and entry operations over all contests.
#[derive(Debug, Clone)]
pub struct ContestBoard {
    resolver: StatusResolver,
}

impl ContestBoard {
    /// Creates a board that resolves through `resolver`.
    #[must_use]
    pub const fn new(resolver: StatusResolver) -> Self {
        Self { resolver }
    }

    /// Returns the resolver.
    #[must_use]
    pub const fn resolver(&self) -> &StatusResolver {
        &self.resolver
    }

    fn gateway(&self) -> &dyn Gateway {
        self.resolver.gateway().as_ref()
    }

    fn now(&self) -> DateTime<Utc> {
        self.resolver.clock().now()
    }

    /// Validates and stores a new contest.
    ///
    /// # Errors
    ///
    /// Returns a contest error for an invalid draft, or the gateway error.
    pub async fn create(&self, draft: &ContestDraft) -> Result<ContestId> {
        draft.validate(self.now())?;
        let id = self
            .gateway()
            .create_contest(draft)
            .await
            .inspect_err(gateway::report)?;
        info!(contest = %id, title = %draft.title, "contest created");
        Ok(id)
    }

    /// Registers (or replaces) an entrant's submission.
    ///
    /// The contest is resolved first and must still accept entries. When
    /// the contest has a password, `password` must match it.
    ///
    /// # Errors
    ///
    /// Returns [`ContestError::InvalidUrl`], [`ContestError::EntriesClosed`]
    /// or [`ContestError::WrongPassword`], or the gateway error.
    pub async fn submit(
        &self,
        submission: &NewSubmission,
        password: Option<&str>,
    ) -> Result<SubmissionId> {
        submission.validate()?;

        let status = self.resolver.resolve(submission.contest, false).await?;
        if status.phase != Phase::Entry {
            return Err(ContestError::EntriesClosed {
                phase: status.phase,
            }
            .into());
        }

        let contest = self
            .gateway()
            .contest(submission.contest)
            .await
            .inspect_err(gateway::report)?;
        if let Some(expected) = contest.password.as_deref()
            && password != Some(expected)
        {
            return Err(ContestError::WrongPassword.into());
        }

        let id = self
            .gateway()
            .create_submission(submission)
            .await
            .inspect_err(gateway::report)?;
        info!(
            contest = %submission.contest,
            owner = %submission.owner,
            submission = %id,
            "submission registered"
        );
        Ok(id)
    }

    /// Lists contests with their short display status.
    ///
    /// Each contest is resolved while listed, so a row may report a later
    /// phase than the filter selected it by.
    ///
    /// # Errors
    ///
    /// Returns the first gateway error.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: ContestFilter) -> Result<Vec<ContestSummary>> {
        let contests = self
            .gateway()
            .list_contests(filter)
            .await
            .inspect_err(gateway::report)?;

        let mut rows = Vec::with_capacity(contests.len());
        for contest in contests {
            let status = self.resolver.resolve(contest.id, true).await?;
            rows.push(ContestSummary::new(contest, status));
        }
        Ok(rows)
    }

    /// Ranks the qualified submissions of a contest by votes.
    ///
    /// Ties share a rank and the next rank is skipped (1, 2, 2, 4).
    /// Disqualified submissions are left out.
    ///
    /// # Errors
    ///
    /// Returns the gateway error, including `NotFound` for unknown contests.
    pub async fn standings(&self, contest: ContestId) -> Result<Vec<Standing>> {
        self.resolver.resolve(contest, false).await?;
        let submissions = self
            .gateway()
            .submissions(contest)
            .await
            .inspect_err(gateway::report)?
            .into_iter()
            .filter(|s| s.qualified)
            .collect();
        Ok(rank(submissions))
    }

    /// Votes `voter` may still cast in `contest`.
    ///
    /// # Errors
    ///
    /// Returns the gateway error, including `NotFound` for unknown contests.
    pub async fn votes_remaining(&self, voter: UserId, contest: ContestId) -> Result<u32> {
        self.resolver.resolve(contest, false).await?;
        let max = self
            .gateway()
            .max_votes(contest)
            .await
            .inspect_err(gateway::report)?;
        let used = self
            .gateway()
            .count_votes(voter, contest)
            .await
            .inspect_err(gateway::report)?;
        Ok(max.saturating_sub(used))
    }

    /// Withdraws the submission `owner` entered in `contest`.
    ///
    /// Its votes, likes and feedback are removed with it, and the tally
    /// goes in the same step as the vote rows.
    ///
    /// # Errors
    ///
    /// Returns [`ContestError::ResultsFinal`] once the contest is complete,
    /// [`ContestError::NoSubmission`] if the owner never entered, or the
    /// gateway error.
    pub async fn withdraw(&self, owner: UserId, contest: ContestId) -> Result<Withdrawal> {
        let status = self.resolver.resolve(contest, false).await?;
        if status.phase == Phase::Complete {
            return Err(ContestError::ResultsFinal(contest).into());
        }

        let submission = self
            .gateway()
            .submissions(contest)
            .await
            .inspect_err(gateway::report)?
            .into_iter()
            .find(|s| s.owner == owner)
            .ok_or(ContestError::NoSubmission { owner, contest })?;
        let votes_removed = self
            .gateway()
            .delete_submission(submission.id)
            .await
            .inspect_err(gateway::report)?;

        info!(
            %contest,
            %owner,
            submission = %submission.id,
            votes_removed,
            "submission withdrawn"
        );
        self.resolver.events().emit(Event::SubmissionWithdrawn {
            timestamp: self.now(),
            contest,
            submission: submission.id,
            owner,
            votes_removed,
        });
        Ok(Withdrawal {
            contest,
            submission: submission.id,
            votes_removed,
        })
    }

    /// Removes a submission from the standings. Its placement is cleared
    /// and the placements behind it move up.
    ///
    /// # Errors
    ///
    /// Returns [`ContestError::NotHost`] unless `host` hosts the contest,
    /// or the gateway error.
    pub async fn disqualify(&self, host: UserId, submission: SubmissionId) -> Result<Submission> {
        self.set_qualification(host, submission, false).await
    }

    /// Puts a disqualified submission back into the standings.
    ///
    /// # Errors
    ///
    /// Returns [`ContestError::NotHost`] unless `host` hosts the contest,
    /// or the gateway error.
    pub async fn requalify(&self, host: UserId, submission: SubmissionId) -> Result<Submission> {
        self.set_qualification(host, submission, true).await
    }

    async fn set_qualification(
        &self,
        host: UserId,
        submission: SubmissionId,
        qualified: bool,
    ) -> Result<Submission> {
        let (contest, record) = self.hosted_submission(host, submission).await?;
        if record.qualified == qualified {
            return Ok(record);
        }

        if !qualified && record.placement.is_some() {
            let placed = placed(&self.submissions_of(contest.id).await?);
            let updates = reorder_placements(&placed, submission, None);
            self.gateway()
                .set_placements(contest.id, &updates)
                .await
                .inspect_err(gateway::report)?;
        }
        self.gateway()
            .set_qualified(submission, qualified)
            .await
            .inspect_err(gateway::report)?;

        info!(contest = %contest.id, %submission, qualified, "qualification changed");
        self.gateway()
            .submission(submission)
            .await
            .inspect_err(gateway::report)
            .map_err(Into::into)
    }

    /// Places a submission at `placement` among the placed submissions of
    /// a complete contest.
    ///
    /// Submissions at or behind that placement move back one. A placement
    /// past the end lands right after the last placed submission.
    ///
    /// # Errors
    ///
    /// Returns [`ContestError::PlacementOutOfRange`] for 0,
    /// [`ContestError::NotHost`], [`ContestError::ResultsPending`] before
    /// voting closes, [`ContestError::Disqualified`], or the gateway error.
    pub async fn set_placement(
        &self,
        host: UserId,
        submission: SubmissionId,
        placement: u32,
    ) -> Result<Submission> {
        if placement == 0 {
            return Err(ContestError::PlacementOutOfRange.into());
        }
        let (contest, record) = self.hosted_submission(host, submission).await?;

        let status = self.resolver.resolve(contest.id, false).await?;
        if status.phase != Phase::Complete {
            return Err(ContestError::ResultsPending {
                phase: status.phase,
            }
            .into());
        }
        if !record.qualified {
            return Err(ContestError::Disqualified(submission).into());
        }

        let placed = placed(&self.submissions_of(contest.id).await?);
        let updates = reorder_placements(&placed, submission, Some(placement));
        self.gateway()
            .set_placements(contest.id, &updates)
            .await
            .inspect_err(gateway::report)?;

        info!(contest = %contest.id, %submission, placement, "placement set");
        self.gateway()
            .submission(submission)
            .await
            .inspect_err(gateway::report)
            .map_err(Into::into)
    }

    /// Likes a submission, or takes the like back.
    ///
    /// # Errors
    ///
    /// Returns the gateway error, including `NotFound` for unknown
    /// submissions.
    pub async fn toggle_like(&self, user: UserId, submission: SubmissionId) -> Result<LikeOutcome> {
        let liked = self
            .gateway()
            .toggle_like(user, submission)
            .await
            .inspect_err(gateway::report)?;
        let outcome = LikeOutcome::from_liked(liked);
        debug!(%user, %submission, %outcome, "like toggled");
        Ok(outcome)
    }

    /// Leaves (or replaces) feedback on another entrant's submission.
    ///
    /// # Errors
    ///
    /// Returns [`ContestError::MissingField`] for blank text,
    /// [`ContestError::SelfFeedback`] on the author's own submission, or
    /// the gateway error.
    pub async fn leave_feedback(
        &self,
        author: UserId,
        submission: SubmissionId,
        text: &str,
    ) -> Result<FeedbackOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ContestError::MissingField("feedback").into());
        }
        let record = self
            .gateway()
            .submission(submission)
            .await
            .inspect_err(gateway::report)?;
        if record.owner == author {
            return Err(ContestError::SelfFeedback.into());
        }

        let added = self
            .gateway()
            .upsert_feedback(author, submission, text)
            .await
            .inspect_err(gateway::report)?;
        let outcome = if added {
            FeedbackOutcome::Added
        } else {
            FeedbackOutcome::Updated
        };
        debug!(%author, %submission, %outcome, "feedback stored");
        Ok(outcome)
    }

    /// Reads a submission with its likes and feedback.
    ///
    /// # Errors
    ///
    /// Returns the gateway error, including `NotFound` for unknown
    /// submissions.
    pub async fn submission(&self, submission: SubmissionId) -> Result<SubmissionDetail> {
        let gateway = self.gateway();
        let record = gateway
            .submission(submission)
            .await
            .inspect_err(gateway::report)?;
        let likes = gateway
            .like_count(submission)
            .await
            .inspect_err(gateway::report)?;
        let feedback = gateway
            .feedback(submission)
            .await
            .inspect_err(gateway::report)?;
        Ok(SubmissionDetail {
            submission: record,
            likes,
            feedback,
        })
    }

    async fn hosted_submission(
        &self,
        host: UserId,
        submission: SubmissionId,
    ) -> Result<(Contest, Submission)> {
        let record = self
            .gateway()
            .submission(submission)
            .await
            .inspect_err(gateway::report)?;
        let contest = self
            .gateway()
            .contest(record.contest)
            .await
            .inspect_err(gateway::report)?;
        if contest.host != host {
            return Err(ContestError::NotHost {
                user: host,
                contest: contest.id,
            }
            .into());
        }
        Ok((contest, record))
    }

    async fn submissions_of(&self, contest: ContestId) -> Result<Vec<Submission>> {
        self.gateway()
            .submissions(contest)
            .await
            .inspect_err(gateway::report)
            .map_err(Into::into)
    }

    /// Resolves every open contest once.
    ///
    /// # Errors
    ///
    /// Returns the first gateway error. Contests resolved before the error
    /// keep their transitions.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let contests = self
            .gateway()
            .list_contests(ContestFilter::Open)
            .await
            .inspect_err(gateway::report)?;

        let mut report = SweepReport {
            examined: contests.len(),
            advanced: Vec::new(),
        };
        for contest in contests {
            let status = self.resolver.resolve(contest.id, false).await?;
            if status.transition.is_some() {
                report.advanced.push(status);
            }
        }

        info!(
            examined = report.examined,
            advanced = report.advanced.len(),
            "sweep completed"
        );
        self.resolver.events().emit(Event::SweepCompleted {
            timestamp: self.now(),
            examined: report.examined,
            advanced: report.advanced.len(),
        });
        Ok(report)
    }
}

/// Current placements of qualified submissions.
fn placed(submissions: &[Submission]) -> Vec<(SubmissionId, u32)> {
    submissions
        .iter()
        .filter(|s| s.qualified)
        .filter_map(|s| s.placement.map(|p| (s.id, p)))
        .collect()
}

/// Assigns competition ranks to submissions sorted by votes descending.
fn rank(submissions: Vec<Submission>) -> Vec<Standing> {
    let mut standings: Vec<Standing> = Vec::with_capacity(submissions.len());
    for (position, submission) in submissions.into_iter().enumerate() {
        let rank = match standings.last() {
            Some(prev) if prev.submission.votes == submission.votes => prev.rank,
            _ => u32::try_from(position + 1).unwrap_or(u32::MAX),
        };
        standings.push(Standing { rank, submission });
    }
    standings
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::BattleError;
    use crate::gateway::MemoryGateway;
    use crate::observability::EventEmitter;
    use crate::observability::events::tests::TestWriter;
    use crate::tally::TallyEngine;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        gateway: Arc<MemoryGateway>,
        clock: Arc<ManualClock>,
        board: ContestBoard,
        events: TestWriter,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let gateway = Arc::new(MemoryGateway::new());
        let clock = Arc::new(ManualClock::new(start()));
        let events = TestWriter::default();
        let resolver = StatusResolver::new(gateway.clone(), clock.clone())
            .with_events(Arc::new(EventEmitter::new(Box::new(events.clone()))));
        Fixture {
            gateway,
            clock,
            board: ContestBoard::new(resolver),
            events,
        }
    }

    fn draft(entry_hours: i64, password: Option<&str>) -> ContestDraft {
        ContestDraft {
            title: format!("Battle closing in {entry_hours}h"),
            rules: "Use the sample".into(),
            deadlines: Deadlines {
                entry: start() + Duration::hours(entry_hours),
                voting: start() + Duration::hours(entry_hours + 24),
            },
            host: UserId(1),
            password: password.map(str::to_string),
            max_votes: 2,
        }
    }

    fn entry(contest: ContestId, owner: i64) -> NewSubmission {
        NewSubmission {
            owner: UserId(owner),
            contest,
            url: format!("https://soundcloud.com/u{owner}/beat"),
        }
    }

    fn submission(id: i64, votes: u32) -> Submission {
        Submission {
            id: SubmissionId(id),
            owner: UserId(id),
            contest: ContestId(1),
            url: String::new(),
            votes,
            qualified: true,
            placement: None,
        }
    }

    #[test]
    fn competition_ranking() {
        let ranks: Vec<u32> = rank(vec![
            submission(1, 9),
            submission(2, 5),
            submission(3, 5),
            submission(4, 2),
            submission(5, 0),
            submission(6, 0),
        ])
        .iter()
        .map(|s| s.rank)
        .collect();
        assert_eq!(ranks, vec![1, 2, 2, 4, 5, 5]);
    }

    #[test]
    fn ranking_all_tied() {
        let ranks: Vec<u32> = rank(vec![submission(1, 0), submission(2, 0)])
            .iter()
            .map(|s| s.rank)
            .collect();
        assert_eq!(ranks, vec![1, 1]);
    }

    #[tokio::test]
    async fn create_validates_draft() {
        let f = fixture();
        let mut bad = draft(1, None);
        bad.max_votes = 0;
        let err = f.board.create(&bad).await.unwrap_err();
        assert!(matches!(
            err,
            BattleError::Contest(ContestError::MaxVotesOutOfRange(0))
        ));

        let past = draft(-1, None);
        assert!(matches!(
            f.board.create(&past).await.unwrap_err(),
            BattleError::Contest(ContestError::EntryDeadlinePassed { .. })
        ));
    }

    #[tokio::test]
    async fn listing_resolves_each_contest() {
        let f = fixture();
        let later = f.board.create(&draft(48, None)).await.unwrap();
        let sooner = f.board.create(&draft(2, None)).await.unwrap();

        let rows = f.board.list(ContestFilter::Open).await.unwrap();
        let ids: Vec<ContestId> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![sooner, later]);
        assert_eq!(rows[0].status, "Open - 2 hours left");
        assert_eq!(rows[1].status, "Open - 2 days left");

        f.clock.advance(Duration::hours(3));
        let rows = f.board.list(ContestFilter::Open).await.unwrap();
        assert_eq!(rows[0].phase, Phase::Voting);
        assert!(rows[0].status.starts_with("Voting - "));
        assert_eq!(f.gateway.contest_phase(sooner).await.unwrap(), Phase::Voting);
    }

    #[tokio::test]
    async fn past_listing_shows_finished() {
        let f = fixture();
        let id = f.board.create(&draft(1, None)).await.unwrap();
        f.clock.advance(Duration::hours(2));
        f.board.sweep().await.unwrap();
        f.clock.advance(Duration::days(2));
        f.board.sweep().await.unwrap();

        let past = f.board.list(ContestFilter::Past).await.unwrap();
        assert_eq!(past.len(), 1);
        assert_eq!(past[0].id, id);
        assert_eq!(past[0].status, "Battle Finished");
        assert!(f.board.list(ContestFilter::Open).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_requires_entry_phase_and_password() {
        let f = fixture();
        let id = f.board.create(&draft(1, Some("crate"))).await.unwrap();

        assert!(matches!(
            f.board.submit(&entry(id, 7), None).await.unwrap_err(),
            BattleError::Contest(ContestError::WrongPassword)
        ));
        assert!(matches!(
            f.board.submit(&entry(id, 7), Some("nope")).await.unwrap_err(),
            BattleError::Contest(ContestError::WrongPassword)
        ));
        let first = f.board.submit(&entry(id, 7), Some("crate")).await.unwrap();

        let mut resubmit = entry(id, 7);
        resubmit.url = "https://bandcamp.com/u7/v2".into();
        assert_eq!(
            f.board.submit(&resubmit, Some("crate")).await.unwrap(),
            first
        );

        f.clock.advance(Duration::hours(2));
        assert!(matches!(
            f.board.submit(&entry(id, 8), Some("crate")).await.unwrap_err(),
            BattleError::Contest(ContestError::EntriesClosed {
                phase: Phase::Voting
            })
        ));
    }

    #[tokio::test]
    async fn submit_rejects_bad_url() {
        let f = fixture();
        let id = f.board.create(&draft(1, None)).await.unwrap();
        let mut bad = entry(id, 3);
        bad.url = "not a link".into();
        assert!(matches!(
            f.board.submit(&bad, None).await.unwrap_err(),
            BattleError::Contest(ContestError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn standings_and_votes_remaining() {
        let f = fixture();
        let id = f.board.create(&draft(1, None)).await.unwrap();
        let a = f.board.submit(&entry(id, 10), None).await.unwrap();
        let b = f.board.submit(&entry(id, 11), None).await.unwrap();
        let c = f.board.submit(&entry(id, 12), None).await.unwrap();
        f.clock.advance(Duration::hours(2));

        let engine = TallyEngine::new(f.board.resolver().clone());
        engine.apply_vote(UserId(20), b).await.unwrap();
        engine.apply_vote(UserId(21), b).await.unwrap();
        engine.apply_vote(UserId(20), c).await.unwrap();

        let standings = f.board.standings(id).await.unwrap();
        let order: Vec<(SubmissionId, u32, u32)> = standings
            .iter()
            .map(|s| (s.submission.id, s.submission.votes, s.rank))
            .collect();
        assert_eq!(order, vec![(b, 2, 1), (c, 1, 2), (a, 0, 3)]);

        assert_eq!(f.board.votes_remaining(UserId(20), id).await.unwrap(), 0);
        assert_eq!(f.board.votes_remaining(UserId(21), id).await.unwrap(), 1);
        assert_eq!(f.board.votes_remaining(UserId(99), id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sweep_reports_transitions() {
        let f = fixture();
        let first = f.board.create(&draft(1, None)).await.unwrap();
        f.board.create(&draft(10, None)).await.unwrap();
        f.clock.advance(Duration::hours(2));

        let report = f.board.sweep().await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.advanced.len(), 1);
        assert_eq!(report.advanced[0].contest, first);
        assert_eq!(report.advanced[0].phase, Phase::Voting);

        let again = f.board.sweep().await.unwrap();
        assert!(again.advanced.is_empty());

        let types: Vec<String> = f
            .events
            .lines()
            .iter()
            .map(|l| l["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            types,
            vec!["PhaseAdvanced", "SweepCompleted", "SweepCompleted"]
        );
    }

    #[tokio::test]
    async fn unknown_contest_standings_fail() {
        let f = fixture();
        let err = f.board.standings(ContestId(5)).await.unwrap_err();
        assert!(matches!(err, BattleError::Gateway(e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn votes_remaining_resolves_the_contest() {
        let f = fixture();
        let id = f.board.create(&draft(1, None)).await.unwrap();
        f.clock.advance(Duration::hours(2));

        assert_eq!(f.board.votes_remaining(UserId(20), id).await.unwrap(), 2);
        assert_eq!(f.gateway.contest_phase(id).await.unwrap(), Phase::Voting);
        assert_eq!(f.events.lines()[0]["type"], "PhaseAdvanced");
    }

    #[tokio::test]
    async fn withdrawal_takes_votes_with_it() {
        let f = fixture();
        let id = f.board.create(&draft(1, None)).await.unwrap();
        let kept = f.board.submit(&entry(id, 10), None).await.unwrap();
        let gone = f.board.submit(&entry(id, 11), None).await.unwrap();
        f.clock.advance(Duration::hours(2));

        let engine = TallyEngine::new(f.board.resolver().clone());
        engine.apply_vote(UserId(20), gone).await.unwrap();
        engine.apply_vote(UserId(20), kept).await.unwrap();
        engine.apply_vote(UserId(21), gone).await.unwrap();

        let withdrawal = f.board.withdraw(UserId(11), id).await.unwrap();
        assert_eq!(withdrawal.submission, gone);
        assert_eq!(withdrawal.votes_removed, 2);

        let standings = f.board.standings(id).await.unwrap();
        assert_eq!(standings.len(), 1);
        assert_eq!(standings[0].submission.id, kept);
        assert_eq!(f.board.votes_remaining(UserId(20), id).await.unwrap(), 1);
        assert_eq!(f.board.votes_remaining(UserId(21), id).await.unwrap(), 2);

        let last = f.events.lines().pop().unwrap();
        assert_eq!(last["type"], "SubmissionWithdrawn");
        assert_eq!(last["votes_removed"], 2);

        assert!(matches!(
            f.board.withdraw(UserId(11), id).await.unwrap_err(),
            BattleError::Contest(ContestError::NoSubmission { .. })
        ));
    }

    #[tokio::test]
    async fn withdrawal_closes_with_the_contest() {
        let f = fixture();
        let id = f.board.create(&draft(1, None)).await.unwrap();
        f.board.submit(&entry(id, 10), None).await.unwrap();
        f.clock.advance(Duration::days(3));
        f.board.sweep().await.unwrap();
        f.board.sweep().await.unwrap();

        assert!(matches!(
            f.board.withdraw(UserId(10), id).await.unwrap_err(),
            BattleError::Contest(ContestError::ResultsFinal(c)) if c == id
        ));
    }

    #[tokio::test]
    async fn disqualified_submissions_leave_the_standings() {
        let f = fixture();
        let id = f.board.create(&draft(1, None)).await.unwrap();
        let a = f.board.submit(&entry(id, 10), None).await.unwrap();
        let b = f.board.submit(&entry(id, 11), None).await.unwrap();
        let c = f.board.submit(&entry(id, 12), None).await.unwrap();
        f.clock.advance(Duration::hours(2));

        let engine = TallyEngine::new(f.board.resolver().clone());
        engine.apply_vote(UserId(20), a).await.unwrap();
        engine.apply_vote(UserId(21), a).await.unwrap();
        engine.apply_vote(UserId(20), b).await.unwrap();

        assert!(matches!(
            f.board.disqualify(UserId(10), a).await.unwrap_err(),
            BattleError::Contest(ContestError::NotHost { .. })
        ));
        let record = f.board.disqualify(UserId(1), a).await.unwrap();
        assert!(!record.qualified);

        let order: Vec<(SubmissionId, u32)> = f
            .board
            .standings(id)
            .await
            .unwrap()
            .iter()
            .map(|s| (s.submission.id, s.rank))
            .collect();
        assert_eq!(order, vec![(b, 1), (c, 2)]);

        assert!(f.board.requalify(UserId(1), a).await.unwrap().qualified);
        assert_eq!(f.board.standings(id).await.unwrap()[0].submission.id, a);
    }

    #[tokio::test]
    async fn placements_after_voting_closes() {
        let f = fixture();
        let id = f.board.create(&draft(1, None)).await.unwrap();
        let a = f.board.submit(&entry(id, 10), None).await.unwrap();
        let b = f.board.submit(&entry(id, 11), None).await.unwrap();
        let c = f.board.submit(&entry(id, 12), None).await.unwrap();

        assert!(matches!(
            f.board.set_placement(UserId(1), a, 1).await.unwrap_err(),
            BattleError::Contest(ContestError::ResultsPending {
                phase: Phase::Entry
            })
        ));
        f.clock.advance(Duration::days(3));
        f.board.sweep().await.unwrap();
        f.board.sweep().await.unwrap();

        assert!(matches!(
            f.board.set_placement(UserId(1), a, 0).await.unwrap_err(),
            BattleError::Contest(ContestError::PlacementOutOfRange)
        ));
        assert!(matches!(
            f.board.set_placement(UserId(2), a, 1).await.unwrap_err(),
            BattleError::Contest(ContestError::NotHost { .. })
        ));

        assert_eq!(f.board.set_placement(UserId(1), a, 1).await.unwrap().placement, Some(1));
        assert_eq!(f.board.set_placement(UserId(1), b, 9).await.unwrap().placement, Some(2));
        assert_eq!(f.board.set_placement(UserId(1), c, 1).await.unwrap().placement, Some(1));

        let placement = |id: SubmissionId| {
            let gateway = f.gateway.clone();
            async move { gateway.submission(id).await.unwrap().placement }
        };
        assert_eq!(placement(a).await, Some(2));
        assert_eq!(placement(b).await, Some(3));

        f.board.disqualify(UserId(1), a).await.unwrap();
        assert_eq!(placement(a).await, None);
        assert_eq!(placement(c).await, Some(1));
        assert_eq!(placement(b).await, Some(2));
        assert!(matches!(
            f.board.set_placement(UserId(1), a, 1).await.unwrap_err(),
            BattleError::Contest(ContestError::Disqualified(s)) if s == a
        ));
    }

    #[tokio::test]
    async fn likes_and_feedback() {
        let f = fixture();
        let id = f.board.create(&draft(1, None)).await.unwrap();
        let beat = f.board.submit(&entry(id, 10), None).await.unwrap();

        assert_eq!(
            f.board.toggle_like(UserId(30), beat).await.unwrap(),
            LikeOutcome::Liked
        );
        assert_eq!(
            f.board.toggle_like(UserId(10), beat).await.unwrap(),
            LikeOutcome::Liked
        );
        assert_eq!(
            f.board.toggle_like(UserId(30), beat).await.unwrap(),
            LikeOutcome::Unliked
        );

        assert!(matches!(
            f.board.leave_feedback(UserId(10), beat, "mine").await.unwrap_err(),
            BattleError::Contest(ContestError::SelfFeedback)
        ));
        assert!(matches!(
            f.board.leave_feedback(UserId(30), beat, "   ").await.unwrap_err(),
            BattleError::Contest(ContestError::MissingField("feedback"))
        ));
        assert_eq!(
            f.board.leave_feedback(UserId(30), beat, "nice swing").await.unwrap(),
            FeedbackOutcome::Added
        );
        assert_eq!(
            f.board.leave_feedback(UserId(30), beat, " nicer swing ").await.unwrap(),
            FeedbackOutcome::Updated
        );

        let detail = f.board.submission(beat).await.unwrap();
        assert_eq!(detail.likes, 1);
        assert_eq!(detail.feedback.len(), 1);
        assert_eq!(detail.feedback[0].text, "nicer swing");

        let err = f.board.toggle_like(UserId(30), SubmissionId(404)).await.unwrap_err();
        assert!(matches!(err, BattleError::Gateway(e) if e.is_not_found()));
    }
}
