//! beatbattle - timed beat battles
//!
//! Contests move through `Entry`, `Voting` and `Complete` as their
//! deadlines pass. The [`status`] resolver advances a contest's persisted
//! phase on read and renders its display text; the [`tally`] engine toggles
//! votes under a per-user cap with atomic counter updates. Persistence sits
//! behind the [`gateway`] traits, with SQLite and in-memory backends.

pub mod app;
pub mod board;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod observability;
pub mod status;
pub mod tally;

pub use app::App;
pub use board::ContestBoard;
pub use status::{DisplayStatus, StatusResolver};
pub use tally::TallyEngine;
