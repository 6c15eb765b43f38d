//! beatbattle core: shared domain types and configuration schema
//!
//! This crate provides the contest, submission and vote records, the
//! [`Phase`](model::Phase) lifecycle enum, vote outcomes, configuration types
//! and error types shared by the `beatbattle` library and CLI.

pub mod config;
pub mod error;
pub mod model;
pub mod outcome;

pub use model::{
    Contest, ContestDraft, ContestFilter, ContestId, Deadlines, Feedback, NewSubmission, Phase,
    Submission, SubmissionId, SubmissionOwner, UserId, Vote, VoteId, reorder_placements,
};
pub use outcome::{FeedbackOutcome, LikeOutcome, Rejection, VoteOutcome};
