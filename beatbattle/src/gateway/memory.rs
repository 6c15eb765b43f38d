//! In-memory persistence gateway.
//!
//! Tables live behind a single `std::sync::Mutex` held only for the
//! duration of one read or one commit. Vote transactions stage their
//! changes privately and apply them in one critical section on commit, so
//! readers never observe a vote without its tally change (or the reverse).
//!
//! Transactions for the same [`BallotKey`] are serialized by a per-key
//! async mutex, held from `begin` until the transaction is committed,
//! rolled back or dropped. A key's mutex is removed from the map when its
//! last transaction ends and nobody is waiting on it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, trace};

use beatbattle_core::{
    Contest, ContestDraft, ContestFilter, ContestId, Deadlines, Feedback, NewSubmission, Phase,
    Submission, SubmissionId, SubmissionOwner, UserId, Vote, VoteId,
};

use super::{BallotKey, Gateway, Result, VoteTransaction};
use crate::error::GatewayError;

/// A failure the memory gateway can be told to produce once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The next transaction commit fails before applying anything.
    Commit,
    /// The next tally adjustment inside a transaction fails.
    TallyAdjustment,
    /// The next read of a contest's phase fails.
    PhaseRead,
    /// The next conditional phase update fails without writing.
    PhaseUpdate,
}

#[derive(Debug, Default)]
struct FaultPlan {
    commit: AtomicBool,
    tally_adjustment: AtomicBool,
    phase_read: AtomicBool,
    phase_update: AtomicBool,
}

impl FaultPlan {
    const fn flag(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::Commit => &self.commit,
            Fault::TallyAdjustment => &self.tally_adjustment,
            Fault::PhaseRead => &self.phase_read,
            Fault::PhaseUpdate => &self.phase_update,
        }
    }

    fn arm(&self, fault: Fault) {
        self.flag(fault).store(true, Ordering::SeqCst);
    }

    fn take(&self, fault: Fault) -> Result<()> {
        if self.flag(fault).swap(false, Ordering::SeqCst) {
            return Err(GatewayError::Database(format!("injected fault: {fault:?}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    contests: BTreeMap<ContestId, Contest>,
    submissions: BTreeMap<SubmissionId, Submission>,
    votes: BTreeMap<VoteId, Vote>,
    likes: BTreeSet<(SubmissionId, UserId)>,
    feedback: BTreeMap<(SubmissionId, UserId), String>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn contest(&self, id: ContestId) -> Result<&Contest> {
        self.contests
            .get(&id)
            .ok_or(GatewayError::contest_not_found(id.0))
    }

    fn submission(&self, id: SubmissionId) -> Result<&Submission> {
        self.submissions
            .get(&id)
            .ok_or(GatewayError::submission_not_found(id.0))
    }

    fn with_submission_count(&self, contest: &Contest) -> Contest {
        let count = self
            .submissions
            .values()
            .filter(|s| s.contest == contest.id)
            .count();
        Contest {
            submission_count: u32::try_from(count).unwrap_or(u32::MAX),
            ..contest.clone()
        }
    }

    fn live_votes(&self, voter: UserId) -> impl Iterator<Item = &Vote> {
        self.votes.values().filter(move |v| v.voter == voter)
    }
}

/// Process-local gateway.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    tables: Arc<Mutex<Tables>>,
    ballots: Arc<DashMap<BallotKey, Arc<tokio::sync::Mutex<()>>>>,
    faults: Arc<FaultPlan>,
}

impl MemoryGateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot failure.
    pub fn inject(&self, fault: Fault) {
        self.faults.arm(fault);
    }

    /// Counts live vote rows referencing `submission`.
    ///
    /// Scans the vote table; the tally itself is never derived this way.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn live_vote_rows(&self, submission: SubmissionId) -> usize {
        self.lock()
            .votes
            .values()
            .filter(|v| v.submission == submission)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory gateway lock poisoned")
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn contest_phase(&self, contest: ContestId) -> Result<Phase> {
        self.faults.take(Fault::PhaseRead)?;
        Ok(self.lock().contest(contest)?.phase)
    }

    async fn set_contest_phase(
        &self,
        contest: ContestId,
        expected: Phase,
        new: Phase,
    ) -> Result<bool> {
        self.faults.take(Fault::PhaseUpdate)?;
        let mut tables = self.lock();
        let record = tables
            .contests
            .get_mut(&contest)
            .ok_or(GatewayError::contest_not_found(contest.0))?;

        if record.phase != expected || !expected.can_advance_to(new) {
            trace!(%contest, stored = %record.phase, %expected, %new, "phase update skipped");
            return Ok(false);
        }
        record.phase = new;
        Ok(true)
    }

    async fn contest_deadlines(&self, contest: ContestId) -> Result<Deadlines> {
        Ok(self.lock().contest(contest)?.deadlines)
    }

    async fn max_votes(&self, contest: ContestId) -> Result<u32> {
        Ok(self.lock().contest(contest)?.max_votes)
    }

    async fn submission_owner(&self, submission: SubmissionId) -> Result<Option<SubmissionOwner>> {
        Ok(self
            .lock()
            .submissions
            .get(&submission)
            .map(|s| SubmissionOwner {
                user: s.owner,
                contest: s.contest,
            }))
    }

    async fn find_vote(&self, voter: UserId, submission: SubmissionId) -> Result<Option<VoteId>> {
        Ok(self
            .lock()
            .live_votes(voter)
            .find(|v| v.submission == submission)
            .map(|v| v.id))
    }

    async fn count_votes(&self, voter: UserId, contest: ContestId) -> Result<u32> {
        let count = self
            .lock()
            .live_votes(voter)
            .filter(|v| v.contest == contest)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn begin(&self, key: BallotKey) -> Result<Box<dyn VoteTransaction>> {
        let ballot = Arc::clone(self.ballots.entry(key).or_default().value());
        let guard = ballot.lock_owned().await;
        debug!(voter = %key.voter, contest = %key.contest, "memory transaction opened");

        Ok(Box::new(MemoryTransaction {
            _ballot: guard,
            key,
            ballots: Arc::clone(&self.ballots),
            tables: Arc::clone(&self.tables),
            faults: Arc::clone(&self.faults),
            inserted: Vec::new(),
            deleted: Vec::new(),
            deltas: BTreeMap::new(),
        }))
    }

    async fn contest(&self, contest: ContestId) -> Result<Contest> {
        let tables = self.lock();
        let record = tables.contest(contest)?;
        Ok(tables.with_submission_count(record))
    }

    async fn list_contests(&self, filter: ContestFilter) -> Result<Vec<Contest>> {
        let tables = self.lock();
        let mut contests: Vec<Contest> = tables
            .contests
            .values()
            .filter(|c| filter.matches(c.phase))
            .map(|c| tables.with_submission_count(c))
            .collect();

        match filter {
            ContestFilter::Open => {
                contests.sort_by(|a, b| {
                    (a.deadlines.entry, a.id).cmp(&(b.deadlines.entry, b.id))
                });
            }
            ContestFilter::Past => {
                contests.sort_by(|a, b| {
                    (b.deadlines.entry, b.id).cmp(&(a.deadlines.entry, a.id))
                });
            }
        }
        Ok(contests)
    }

    async fn submissions(&self, contest: ContestId) -> Result<Vec<Submission>> {
        let tables = self.lock();
        tables.contest(contest)?;
        let mut submissions: Vec<Submission> = tables
            .submissions
            .values()
            .filter(|s| s.contest == contest)
            .cloned()
            .collect();
        submissions.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.id.cmp(&b.id)));
        Ok(submissions)
    }

    async fn create_contest(&self, draft: &ContestDraft) -> Result<ContestId> {
        let mut tables = self.lock();
        let id = ContestId(tables.allocate_id());
        tables.contests.insert(
            id,
            Contest {
                id,
                title: draft.title.clone(),
                rules: draft.rules.clone(),
                deadlines: draft.deadlines,
                phase: Phase::Entry,
                host: draft.host,
                password: draft.password.clone(),
                max_votes: draft.max_votes,
                submission_count: 0,
            },
        );
        Ok(id)
    }

    async fn create_submission(&self, submission: &NewSubmission) -> Result<SubmissionId> {
        let mut tables = self.lock();
        tables.contest(submission.contest)?;

        if let Some(existing) = tables
            .submissions
            .values_mut()
            .find(|s| s.contest == submission.contest && s.owner == submission.owner)
        {
            existing.url.clone_from(&submission.url);
            return Ok(existing.id);
        }

        let id = SubmissionId(tables.allocate_id());
        tables.submissions.insert(
            id,
            Submission {
                id,
                owner: submission.owner,
                contest: submission.contest,
                url: submission.url.clone(),
                votes: 0,
                qualified: true,
                placement: None,
            },
        );
        Ok(id)
    }

    async fn submission(&self, submission: SubmissionId) -> Result<Submission> {
        self.lock().submission(submission).cloned()
    }

    async fn delete_submission(&self, submission: SubmissionId) -> Result<u32> {
        let mut tables = self.lock();
        tables
            .submissions
            .remove(&submission)
            .ok_or(GatewayError::submission_not_found(submission.0))?;

        let before = tables.votes.len();
        tables.votes.retain(|_, v| v.submission != submission);
        let removed = before - tables.votes.len();
        tables.likes.retain(|(s, _)| *s != submission);
        tables.feedback.retain(|(s, _), _| *s != submission);
        drop(tables);

        debug!(%submission, votes = removed, "submission deleted");
        Ok(u32::try_from(removed).unwrap_or(u32::MAX))
    }

    async fn set_qualified(&self, submission: SubmissionId, qualified: bool) -> Result<()> {
        let mut tables = self.lock();
        let record = tables
            .submissions
            .get_mut(&submission)
            .ok_or(GatewayError::submission_not_found(submission.0))?;
        record.qualified = qualified;
        if !qualified {
            record.placement = None;
        }
        Ok(())
    }

    async fn set_placements(
        &self,
        contest: ContestId,
        placements: &[(SubmissionId, Option<u32>)],
    ) -> Result<()> {
        let mut tables = self.lock();
        tables.contest(contest)?;
        // Validate everything before touching any row
        for (id, _) in placements {
            if tables.submission(*id)?.contest != contest {
                return Err(GatewayError::submission_not_found(id.0));
            }
        }
        for (id, placement) in placements {
            if let Some(record) = tables.submissions.get_mut(id) {
                record.placement = *placement;
            }
        }
        Ok(())
    }

    async fn toggle_like(&self, user: UserId, submission: SubmissionId) -> Result<bool> {
        let mut tables = self.lock();
        tables.submission(submission)?;
        if tables.likes.remove(&(submission, user)) {
            return Ok(false);
        }
        tables.likes.insert((submission, user));
        Ok(true)
    }

    async fn like_count(&self, submission: SubmissionId) -> Result<u32> {
        let tables = self.lock();
        tables.submission(submission)?;
        let count = tables
            .likes
            .iter()
            .filter(|(s, _)| *s == submission)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn upsert_feedback(
        &self,
        author: UserId,
        submission: SubmissionId,
        text: &str,
    ) -> Result<bool> {
        let mut tables = self.lock();
        tables.submission(submission)?;
        Ok(tables
            .feedback
            .insert((submission, author), text.to_owned())
            .is_none())
    }

    async fn feedback(&self, submission: SubmissionId) -> Result<Vec<Feedback>> {
        let tables = self.lock();
        tables.submission(submission)?;
        Ok(tables
            .feedback
            .range((submission, UserId(i64::MIN))..=(submission, UserId(i64::MAX)))
            .map(|((submission, author), text)| Feedback {
                author: *author,
                submission: *submission,
                text: text.clone(),
            })
            .collect())
    }
}

/// Staged vote mutations for one [`BallotKey`].
struct MemoryTransaction {
    _ballot: OwnedMutexGuard<()>,
    key: BallotKey,
    ballots: Arc<DashMap<BallotKey, Arc<tokio::sync::Mutex<()>>>>,
    tables: Arc<Mutex<Tables>>,
    faults: Arc<FaultPlan>,
    inserted: Vec<Vote>,
    deleted: Vec<VoteId>,
    deltas: BTreeMap<SubmissionId, i64>,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        // Two references remain when nobody waits: the map's and our guard's
        self.ballots
            .remove_if(&self.key, |_, ballot| Arc::strong_count(ballot) <= 2);
    }
}

impl MemoryTransaction {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory gateway lock poisoned")
    }

    fn staged_vote(&self, voter: UserId, submission: SubmissionId) -> Option<VoteId> {
        if let Some(vote) = self
            .inserted
            .iter()
            .find(|v| v.voter == voter && v.submission == submission)
        {
            return Some(vote.id);
        }
        self.lock()
            .live_votes(voter)
            .find(|v| v.submission == submission && !self.deleted.contains(&v.id))
            .map(|v| v.id)
    }
}

#[async_trait]
impl VoteTransaction for MemoryTransaction {
    async fn find_vote(
        &mut self,
        voter: UserId,
        submission: SubmissionId,
    ) -> Result<Option<VoteId>> {
        Ok(self.staged_vote(voter, submission))
    }

    async fn count_votes(&mut self, voter: UserId, contest: ContestId) -> Result<u32> {
        let live = self
            .lock()
            .live_votes(voter)
            .filter(|v| v.contest == contest && !self.deleted.contains(&v.id))
            .count();
        let staged = self
            .inserted
            .iter()
            .filter(|v| v.voter == voter && v.contest == contest)
            .count();
        Ok(u32::try_from(live + staged).unwrap_or(u32::MAX))
    }

    async fn insert_vote(
        &mut self,
        voter: UserId,
        submission: SubmissionId,
        contest: ContestId,
    ) -> Result<VoteId> {
        if self.staged_vote(voter, submission).is_some() {
            return Err(GatewayError::Database(format!(
                "duplicate vote by {voter} for submission {submission}"
            )));
        }
        let id = {
            let mut tables = self.lock();
            if !tables.submissions.contains_key(&submission) {
                return Err(GatewayError::submission_not_found(submission.0));
            }
            VoteId(tables.allocate_id())
        };
        self.inserted.push(Vote {
            id,
            voter,
            submission,
            contest,
        });
        Ok(id)
    }

    async fn delete_vote(&mut self, vote: VoteId) -> Result<()> {
        if let Some(pos) = self.inserted.iter().position(|v| v.id == vote) {
            self.inserted.remove(pos);
            return Ok(());
        }
        let exists = self.lock().votes.contains_key(&vote);
        if !exists || self.deleted.contains(&vote) {
            return Err(GatewayError::NotFound {
                entity: "vote",
                id: vote.0,
            });
        }
        self.deleted.push(vote);
        Ok(())
    }

    async fn adjust_tally(&mut self, submission: SubmissionId, delta: i64) -> Result<u32> {
        self.faults.take(Fault::TallyAdjustment)?;

        let stored = self
            .lock()
            .submissions
            .get(&submission)
            .map(|s| i64::from(s.votes))
            .ok_or(GatewayError::submission_not_found(submission.0))?;
        let pending = self.deltas.get(&submission).copied().unwrap_or(0) + delta;

        let updated = u32::try_from(stored + pending).map_err(|_| {
            GatewayError::Corrupt(format!("tally of submission {submission} would go negative"))
        })?;
        self.deltas.insert(submission, pending);
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.faults.take(Fault::Commit)?;

        let mut tables = self.lock();
        // The submission may have been withdrawn since the vote was staged
        if let Some(orphan) = self
            .inserted
            .iter()
            .find(|v| !tables.submissions.contains_key(&v.submission))
        {
            return Err(GatewayError::submission_not_found(orphan.submission.0));
        }
        for id in &self.deleted {
            tables.votes.remove(id);
        }
        for vote in &self.inserted {
            tables.votes.insert(vote.id, *vote);
        }
        for (submission, delta) in &self.deltas {
            if let Some(record) = tables.submissions.get_mut(submission) {
                let updated = i64::from(record.votes) + delta;
                record.votes = u32::try_from(updated).unwrap_or(0);
            }
        }
        drop(tables);
        trace!(
            inserted = self.inserted.len(),
            deleted = self.deleted.len(),
            "memory transaction committed"
        );
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        trace!("memory transaction rolled back");
        Ok(())
    }
}
