//! Vote, like and feedback outcomes
//!
//! What the tally engine reports back for a single vote request. Rejections
//! are ordinary outcomes, not errors: the caller maps them to messaging.
//! Likes and feedback report which way their upsert or toggle went.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of applying one vote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum VoteOutcome {
    /// A new vote was recorded and the submission's tally incremented.
    VoteCast,
    /// An existing vote was removed and the submission's tally decremented.
    VoteWithdrawn,
    /// Nothing changed.
    Rejected(Rejection),
}

impl VoteOutcome {
    /// Returns `true` if the request changed a tally.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(self, Self::VoteCast | Self::VoteWithdrawn)
    }

    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::VoteCast => "cast",
            Self::VoteWithdrawn => "withdrawn",
            Self::Rejected(reason) => reason.as_str(),
        }
    }
}

impl fmt::Display for VoteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VoteCast => f.write_str("vote cast"),
            Self::VoteWithdrawn => f.write_str("vote withdrawn"),
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

/// Why a vote request was refused.
///
/// Variants are listed in the order the preconditions are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The submission or its contest does not exist.
    NotFound,
    /// The contest is not in its voting phase.
    NotVoting,
    /// The voter owns the submission.
    SelfVote,
    /// The voter already holds the contest's maximum number of votes.
    MaxVotesReached,
}

impl Rejection {
    /// Stable machine-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotVoting => "not_voting",
            Self::SelfVote => "self_vote",
            Self::MaxVotesReached => "max_votes_reached",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotFound => "submission not found",
            Self::NotVoting => "contest is not in its voting phase",
            Self::SelfVote => "cannot vote for your own submission",
            Self::MaxVotesReached => "maximum votes for this contest reached",
        };
        f.write_str(text)
    }
}

/// Result of toggling a like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeOutcome {
    /// The user now likes the submission.
    Liked,
    /// The user's like was removed.
    Unliked,
}

impl LikeOutcome {
    /// Maps the stored state after a toggle to an outcome.
    #[must_use]
    pub const fn from_liked(liked: bool) -> Self {
        if liked { Self::Liked } else { Self::Unliked }
    }
}

impl fmt::Display for LikeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Liked => "liked",
            Self::Unliked => "unliked",
        })
    }
}

/// Result of leaving feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    /// First feedback by this author on the submission.
    Added,
    /// The author's earlier feedback was replaced.
    Updated,
}

impl fmt::Display for FeedbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Added => "feedback added",
            Self::Updated => "feedback updated",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutations_are_cast_and_withdrawn() {
        assert!(VoteOutcome::VoteCast.is_mutation());
        assert!(VoteOutcome::VoteWithdrawn.is_mutation());
        assert!(!VoteOutcome::Rejected(Rejection::SelfVote).is_mutation());
    }

    #[test]
    fn labels() {
        assert_eq!(VoteOutcome::VoteCast.label(), "cast");
        assert_eq!(
            VoteOutcome::Rejected(Rejection::MaxVotesReached).label(),
            "max_votes_reached"
        );
    }

    #[test]
    fn outcome_serializes_with_reason() {
        let json = serde_json::to_value(VoteOutcome::Rejected(Rejection::NotVoting)).unwrap();
        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["reason"], "not_voting");

        let json = serde_json::to_value(VoteOutcome::VoteCast).unwrap();
        assert_eq!(json["outcome"], "vote_cast");
    }

    #[test]
    fn display_text() {
        assert_eq!(
            VoteOutcome::Rejected(Rejection::SelfVote).to_string(),
            "rejected: cannot vote for your own submission"
        );
    }

    #[test]
    fn like_and_feedback_outcomes() {
        assert_eq!(LikeOutcome::from_liked(true), LikeOutcome::Liked);
        assert_eq!(LikeOutcome::from_liked(false).to_string(), "unliked");
        assert_eq!(
            serde_json::to_value(FeedbackOutcome::Updated).unwrap(),
            "updated"
        );
    }
}
