//! Vote tally engine.
//!
//! Applies one user's vote toggle against a submission with per-contest
//! caps, keeping each submission's counter equal to its live vote rows.

pub mod engine;

pub use engine::TallyEngine;
