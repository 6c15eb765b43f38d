//! Structured event stream for beatbattle.
//!
//! Discrete, typed events emitted when contests change phase, votes are
//! applied and submissions are withdrawn. Events are serialized as newline-delimited JSON (JSONL) and
//! include a monotonically increasing sequence number for ordering.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use beatbattle_core::{ContestId, Phase, SubmissionId, UserId};

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during beatbattle operation.
///
/// Each variant is tagged with `"type"` when serialized to JSON so consumers
/// can dispatch on the event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A contest's persisted phase moved forward.
    PhaseAdvanced {
        /// When the transition was written.
        timestamp: DateTime<Utc>,
        /// Contest that moved.
        contest: ContestId,
        /// Phase before the transition.
        from: Phase,
        /// Phase after the transition.
        to: Phase,
    },

    /// A vote request was decided.
    VoteApplied {
        /// When the decision was made.
        timestamp: DateTime<Utc>,
        /// Voting user.
        voter: UserId,
        /// Target submission.
        submission: SubmissionId,
        /// Contest of the submission, when it exists.
        #[serde(skip_serializing_if = "Option::is_none")]
        contest: Option<ContestId>,
        /// Outcome label (`cast`, `withdrawn` or a rejection reason).
        outcome: String,
        /// Processing time in milliseconds.
        duration_ms: u64,
    },

    /// An entrant withdrew a submission.
    SubmissionWithdrawn {
        /// When the submission was removed.
        timestamp: DateTime<Utc>,
        /// Contest it belonged to.
        contest: ContestId,
        /// Removed submission.
        submission: SubmissionId,
        /// Entrant who withdrew it.
        owner: UserId,
        /// Votes removed along with it.
        votes_removed: u32,
    },

    /// A sweep over open contests finished.
    SweepCompleted {
        /// When the sweep finished.
        timestamp: DateTime<Utc>,
        /// Contests examined.
        examined: usize,
        /// Contests whose phase advanced.
        advanced: usize,
    },
}

/// Wire envelope adding a sequence number to each event.
#[derive(Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit`](Self::emit) atomically increments the sequence
/// counter, serializes the event as a single JSON line, and flushes the
/// underlying writer. Serialization or I/O failures are dropped.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::noop()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that appends to the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock()
            && let Ok(line) = serde_json::to_string(&envelope)
        {
            let _ = writeln!(w, "{line}");
            let _ = w.flush();
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
