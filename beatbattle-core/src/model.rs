//! Domain records for beat battles
//!
//! Contests (battles), submissions (beats) and votes, plus the closed
//! [`Phase`] enumeration that drives the contest lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContestError;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

record_id!(
    /// Identifier of a contest (battle).
    ContestId
);
record_id!(
    /// Identifier of a submission (beat).
    SubmissionId
);
record_id!(
    /// Identifier of a user, either a host, an entrant or a voter.
    UserId
);
record_id!(
    /// Identifier of a live vote row.
    VoteId
);

// ============================================================================
// Phase
// ============================================================================

/// Lifecycle phase of a contest.
///
/// Phases are totally ordered and only ever advance forward:
/// `Entry < Voting < Complete`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Entrants may submit; voting has not opened.
    #[default]
    Entry,
    /// Submissions are closed and the community votes.
    Voting,
    /// Voting has closed; the tally is final.
    Complete,
}

impl Phase {
    /// All phases in lifecycle order.
    pub const ALL: [Self; 3] = [Self::Entry, Self::Voting, Self::Complete];

    /// Returns the storage form of the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Voting => "voting",
            Self::Complete => "complete",
        }
    }

    /// Returns the phase that follows this one, or `None` for `Complete`.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Entry => Some(Self::Voting),
            Self::Voting => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    /// Returns `true` if moving from `self` to `to` is a single forward step.
    #[must_use]
    pub fn can_advance_to(self, to: Self) -> bool {
        self.next() == Some(to)
    }

    /// Returns `true` once the contest can no longer change phase.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ContestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Self::Entry),
            "voting" => Ok(Self::Voting),
            "complete" => Ok(Self::Complete),
            other => Err(ContestError::UnknownPhase(other.to_owned())),
        }
    }
}

// ============================================================================
// Contest
// ============================================================================

/// Smallest cap a contest may set on votes per user.
pub const MIN_MAX_VOTES: u32 = 1;

/// Largest cap a contest may set on votes per user.
pub const MAX_MAX_VOTES: u32 = 10;

/// The two deadlines of a contest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadlines {
    /// End of the entry window.
    pub entry: DateTime<Utc>,
    /// End of the voting window.
    pub voting: DateTime<Utc>,
}

impl Deadlines {
    /// Returns the deadline that ends `phase`, or `None` for `Complete`.
    #[must_use]
    pub const fn for_phase(&self, phase: Phase) -> Option<DateTime<Utc>> {
        match phase {
            Phase::Entry => Some(self.entry),
            Phase::Voting => Some(self.voting),
            Phase::Complete => None,
        }
    }
}

/// A timed voting contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contest {
    /// Contest identifier.
    pub id: ContestId,
    /// Display title.
    pub title: String,
    /// Rules text (markdown in the presentation layer).
    pub rules: String,
    /// Entry and voting deadlines.
    pub deadlines: Deadlines,
    /// Persisted phase.
    pub phase: Phase,
    /// User hosting the contest.
    pub host: UserId,
    /// Optional password required to enter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Maximum live votes one user may hold in this contest.
    pub max_votes: u32,
    /// Number of submissions, derived at read time.
    pub submission_count: u32,
}

/// Filter for contest listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContestFilter {
    /// Contests in `Entry` or `Voting`, soonest entry deadline first.
    #[default]
    Open,
    /// Contests in `Complete`, most recent entry deadline first.
    Past,
}

impl ContestFilter {
    /// Returns `true` if a contest in `phase` belongs to this listing.
    #[must_use]
    pub const fn matches(self, phase: Phase) -> bool {
        match self {
            Self::Open => !phase.is_terminal(),
            Self::Past => phase.is_terminal(),
        }
    }
}

/// Input for creating a contest.
///
/// Contest creation belongs to the external submission flow; the draft is
/// validated here so every gateway applies the same rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestDraft {
    /// Display title.
    pub title: String,
    /// Rules text.
    pub rules: String,
    /// Entry and voting deadlines.
    pub deadlines: Deadlines,
    /// Hosting user.
    pub host: UserId,
    /// Optional entry password.
    #[serde(default)]
    pub password: Option<String>,
    /// Votes-per-user cap, within `MIN_MAX_VOTES..=MAX_MAX_VOTES`.
    pub max_votes: u32,
}

impl ContestDraft {
    /// Checks the draft against the contest creation rules.
    ///
    /// # Errors
    ///
    /// Returns the first rule the draft violates.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ContestError> {
        if self.title.trim().is_empty() {
            return Err(ContestError::MissingField("title"));
        }
        if self.rules.trim().is_empty() {
            return Err(ContestError::MissingField("rules"));
        }
        if self.deadlines.entry <= now {
            return Err(ContestError::EntryDeadlinePassed {
                deadline: self.deadlines.entry,
            });
        }
        if self.deadlines.voting <= self.deadlines.entry {
            return Err(ContestError::VotingBeforeEntry {
                entry: self.deadlines.entry,
                voting: self.deadlines.voting,
            });
        }
        if !(MIN_MAX_VOTES..=MAX_MAX_VOTES).contains(&self.max_votes) {
            return Err(ContestError::MaxVotesOutOfRange(self.max_votes));
        }
        Ok(())
    }
}

// ============================================================================
// Submissions and votes
// ============================================================================

/// An entrant's item within a contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Submission identifier.
    pub id: SubmissionId,
    /// Entrant who owns the submission.
    pub owner: UserId,
    /// Contest the submission belongs to.
    pub contest: ContestId,
    /// External media reference.
    pub url: String,
    /// Running tally of live votes.
    pub votes: u32,
    /// `false` once the host has disqualified the submission.
    #[serde(default = "qualified_default")]
    pub qualified: bool,
    /// Host-assigned final placement, 1 for the winner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<u32>,
}

const fn qualified_default() -> bool {
    true
}

/// Input for registering a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubmission {
    /// Entrant who owns the submission.
    pub owner: UserId,
    /// Contest to enter.
    pub contest: ContestId,
    /// External media reference.
    pub url: String,
}

impl NewSubmission {
    /// Checks that the media reference is an absolute `http`/`https` URL.
    ///
    /// # Errors
    ///
    /// Returns [`ContestError::InvalidUrl`] otherwise.
    pub fn validate(&self) -> Result<(), ContestError> {
        let url = self.url.trim();
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .ok_or_else(|| ContestError::InvalidUrl(self.url.clone()))?;
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(ContestError::InvalidUrl(self.url.clone()));
        }
        Ok(())
    }
}

/// Text one user left on another user's submission.
///
/// Each author holds at most one feedback entry per submission; writing
/// again replaces the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// User who wrote the feedback.
    pub author: UserId,
    /// Submission the feedback is about.
    pub submission: SubmissionId,
    /// Feedback text.
    pub text: String,
}

/// Computes dense placements after moving `target` to `placement`.
///
/// `placed` holds the currently placed submissions of a contest. The target
/// is taken out, then inserted at `placement` (clamped to one past the last
/// place) unless `placement` is `None`, and every placed submission is
/// renumbered from 1. Returns the full new assignment, target included.
#[must_use]
pub fn reorder_placements(
    placed: &[(SubmissionId, u32)],
    target: SubmissionId,
    placement: Option<u32>,
) -> Vec<(SubmissionId, Option<u32>)> {
    let mut order: Vec<(SubmissionId, u32)> = placed
        .iter()
        .copied()
        .filter(|(id, _)| *id != target)
        .collect();
    order.sort_by_key(|&(id, place)| (place, id));
    let mut order: Vec<SubmissionId> = order.into_iter().map(|(id, _)| id).collect();

    let mut assignment = Vec::with_capacity(order.len() + 1);
    match placement {
        Some(place) => {
            let index = usize::try_from(place.saturating_sub(1))
                .unwrap_or(usize::MAX)
                .min(order.len());
            order.insert(index, target);
        }
        None => assignment.push((target, None)),
    }
    for (index, id) in order.into_iter().enumerate() {
        assignment.push((id, Some(u32::try_from(index + 1).unwrap_or(u32::MAX))));
    }
    assignment
}

/// Owner and contest of a submission, as needed by the tally engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionOwner {
    /// Entrant who owns the submission.
    pub user: UserId,
    /// Contest the submission belongs to.
    pub contest: ContestId,
}

/// A live vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Vote identifier.
    pub id: VoteId,
    /// Voting user.
    pub voter: UserId,
    /// Submission voted for.
    pub submission: SubmissionId,
    /// Contest of the submission.
    pub contest: ContestId,
}
