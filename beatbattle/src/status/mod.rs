//! Battle status resolution.
//!
//! Every read of a contest goes through the [`StatusResolver`], which
//! advances the persisted phase once its deadline has passed and renders
//! the display text shown next to the contest.

pub mod remaining;
pub mod resolver;

pub use remaining::format_remaining;
pub use resolver::StatusResolver;

use std::fmt;

use serde::Serialize;

use beatbattle_core::{ContestId, Phase};

/// Display value for a contest in the `Complete` phase.
pub const FINISHED: &str = "Battle Finished";

/// A phase change written during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// Phase before the write
    pub from: Phase,
    /// Phase after the write
    pub to: Phase,
}

/// Result of resolving one contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayStatus {
    /// Resolved contest
    pub contest: ContestId,
    /// Phase after resolution
    pub phase: Phase,
    /// Display text
    pub text: String,
    /// Transition this call persisted, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
}

impl DisplayStatus {
    /// Returns `true` if the contest can no longer change.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
