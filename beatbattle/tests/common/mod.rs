//! Shared integration-test harness: a pinned clock, seeded contests on the
//! in-memory gateway, and helpers for running the `beatbattle` binary.

#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use beatbattle::App;
use beatbattle::clock::ManualClock;
use beatbattle::config::BattleConfig;
use beatbattle::gateway::{Gateway, MemoryGateway};
use beatbattle::observability::EventEmitter;
use beatbattle_core::{ContestDraft, ContestId, Deadlines, NewSubmission, SubmissionId, UserId};

/// Host of every seeded contest.
pub const HOST: UserId = UserId(1);

/// Fixed starting time for pinned-clock tests.
#[must_use]
pub fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// A contest draft whose entry window closes in `entry` and voting window
/// in `voting`, both measured from `now`.
#[must_use]
pub fn draft(now: DateTime<Utc>, entry: Duration, voting: Duration, max_votes: u32) -> ContestDraft {
    ContestDraft {
        title: "Flip Friday".into(),
        rules: "Flip the sample. No drum kits from the pack.".into(),
        deadlines: Deadlines {
            entry: now + entry,
            voting: now + voting,
        },
        host: HOST,
        password: None,
        max_votes,
    }
}

/// Services over a memory gateway with a pinned clock.
pub struct Harness {
    pub app: App,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<MemoryGateway>,
}

impl Harness {
    /// Creates a harness at [`start`] with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BattleConfig::default())
    }

    /// Creates a harness at [`start`] with `config`'s display and tally
    /// settings.
    #[must_use]
    pub fn with_config(config: BattleConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let gateway = Arc::new(MemoryGateway::new());
        let app = App::with_parts(
            config,
            gateway.clone() as Arc<dyn Gateway>,
            clock.clone(),
            Arc::new(EventEmitter::noop()),
        );
        Self {
            app,
            clock,
            gateway,
        }
    }

    /// Creates a contest with entry closing in one hour and voting closing
    /// one day later.
    #[allow(clippy::missing_panics_doc)]
    pub async fn contest(&self, max_votes: u32) -> ContestId {
        self.app
            .board()
            .create(&draft(
                start(),
                Duration::hours(1),
                Duration::hours(25),
                max_votes,
            ))
            .await
            .expect("seed contest")
    }

    /// Enters one submission per owner.
    #[allow(clippy::missing_panics_doc)]
    pub async fn submissions(&self, contest: ContestId, owners: &[i64]) -> Vec<SubmissionId> {
        let mut ids = Vec::with_capacity(owners.len());
        for &owner in owners {
            let id = self
                .app
                .board()
                .submit(
                    &NewSubmission {
                        owner: UserId(owner),
                        contest,
                        url: format!("https://soundcloud.com/user{owner}/flip"),
                    },
                    None,
                )
                .await
                .expect("seed submission");
            ids.push(id);
        }
        ids
    }

    /// Moves the clock past the entry deadline of a [`contest`](Self::contest).
    pub fn open_voting(&self) {
        self.clock.advance(Duration::minutes(61));
    }

    /// Moves the clock past the voting deadline of a
    /// [`contest`](Self::contest).
    pub fn close_voting(&self) {
        self.clock.advance(Duration::hours(26));
    }

    /// Sum of the tallies of `contest`'s submissions.
    #[allow(clippy::missing_panics_doc)]
    pub async fn tally_total(&self, contest: ContestId) -> usize {
        self.gateway
            .submissions(contest)
            .await
            .expect("list submissions")
            .iter()
            .map(|s| s.votes as usize)
            .sum()
    }
}

/// Runs the `beatbattle` binary with `args` against the database at `db`.
#[allow(clippy::missing_panics_doc)]
pub fn run_cli(db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_beatbattle"))
        .arg("--database")
        .arg(format!("sqlite://{}", db.display()))
        .arg("--quiet")
        .args(args)
        .env_remove("BEATBATTLE_CONFIG")
        .env_remove("BEATBATTLE_DATABASE_URL")
        .output()
        .expect("failed to run beatbattle")
}

/// Parses the stdout of a `--format json` invocation.
#[allow(clippy::missing_panics_doc)]
pub fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({e}): {stdout}"))
}
