//! Deadline-driven phase resolver.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use beatbattle_core::config::RemainderMode;
use beatbattle_core::{ContestId, Deadlines, Phase};

use super::remaining::{OPEN_PREFIX, VOTING_PREFIX, format_remaining};
use super::{DisplayStatus, FINISHED, Transition};
use crate::clock::Clock;
use crate::gateway::{self, Gateway, Result};
use crate::observability::{Event, EventEmitter, metrics};

/// Computes and advances contest phases.
///
/// Holds no mutable state; all contest state lives behind the gateway.
#[derive(Clone)]
pub struct StatusResolver {
    gateway: Arc<dyn Gateway>,
    clock: Arc<dyn Clock>,
    remainder: RemainderMode,
    events: Arc<EventEmitter>,
}

impl std::fmt::Debug for StatusResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusResolver")
            .field("remainder", &self.remainder)
            .finish_non_exhaustive()
    }
}

impl StatusResolver {
    /// Creates a resolver in `Literal` remainder mode that emits no events.
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway,
            clock,
            remainder: RemainderMode::default(),
            events: Arc::new(EventEmitter::noop()),
        }
    }

    /// Selects the deadline used for the text on the read that opens voting.
    #[must_use]
    pub const fn with_remainder(mut self, remainder: RemainderMode) -> Self {
        self.remainder = remainder;
        self
    }

    /// Sends `PhaseAdvanced` events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventEmitter>) -> Self {
        self.events = events;
        self
    }

    /// Returns the gateway this resolver reads through.
    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    /// Returns the clock deadlines are compared against.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<EventEmitter> {
        &self.events
    }

    /// Resolves a contest and returns only its display text.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub async fn resolve_display_status(
        &self,
        contest: ContestId,
        short_form: bool,
    ) -> Result<String> {
        Ok(self.resolve(contest, short_form).await?.text)
    }

    /// Re-reads the persisted phase, advances it if its deadline has passed
    /// and renders the display text.
    ///
    /// At most one conditional phase write is issued per call.
    ///
    /// # Errors
    ///
    /// Returns the gateway error of any failed read or write. No text is
    /// produced in that case.
    #[instrument(skip(self))]
    pub async fn resolve(&self, contest: ContestId, short_form: bool) -> Result<DisplayStatus> {
        self.advance(contest, short_form)
            .await
            .inspect_err(gateway::report)
    }

    /// [`resolve`](Self::resolve) without failure reporting, for callers
    /// that report their own errors.
    pub(crate) async fn advance(
        &self,
        contest: ContestId,
        short_form: bool,
    ) -> Result<DisplayStatus> {
        let phase = self.gateway.contest_phase(contest).await?;
        if phase == Phase::Complete {
            return Ok(finished(contest, None));
        }

        let deadlines = self.gateway.contest_deadlines(contest).await?;
        let (Some(deadline), Some(next)) = (deadlines.for_phase(phase), phase.next()) else {
            return Ok(finished(contest, None));
        };

        let now = self.clock.now();
        if now <= deadline {
            return Ok(self.render(contest, phase, deadline, now, short_form, None));
        }

        let (phase_now, transition) = if self
            .gateway
            .set_contest_phase(contest, phase, next)
            .await?
        {
            self.record_transition(contest, phase, next, now);
            (
                next,
                Some(Transition {
                    from: phase,
                    to: next,
                }),
            )
        } else {
            let stored = self.gateway.contest_phase(contest).await?;
            debug!(expected = %phase, %stored, "phase already advanced by another reader");
            (stored, None)
        };

        if phase_now == Phase::Complete {
            return Ok(finished(contest, transition));
        }

        let shown = self.display_deadline(phase, deadline, &deadlines);
        Ok(self.render(contest, phase_now, shown, now, short_form, transition))
    }

    /// Deadline the text counts down to after the stored phase's deadline
    /// has passed.
    fn display_deadline(
        &self,
        checked: Phase,
        elapsed: DateTime<Utc>,
        deadlines: &Deadlines,
    ) -> DateTime<Utc> {
        match (self.remainder, checked) {
            (RemainderMode::Corrected, Phase::Entry) => deadlines.voting,
            _ => elapsed,
        }
    }

    fn render(
        &self,
        contest: ContestId,
        phase: Phase,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
        short_form: bool,
        transition: Option<Transition>,
    ) -> DisplayStatus {
        let prefix = if phase == Phase::Entry {
            OPEN_PREFIX
        } else {
            VOTING_PREFIX
        };
        DisplayStatus {
            contest,
            phase,
            text: format_remaining(prefix, deadline - now, short_form),
            transition,
        }
    }

    fn record_transition(&self, contest: ContestId, from: Phase, to: Phase, now: DateTime<Utc>) {
        info!(%contest, %from, %to, "contest phase advanced");
        metrics::record_phase_transition(from, to);
        self.events.emit(Event::PhaseAdvanced {
            timestamp: now,
            contest,
            from,
            to,
        });
    }
}

fn finished(contest: ContestId, transition: Option<Transition>) -> DisplayStatus {
    DisplayStatus {
        contest,
        phase: Phase::Complete,
        text: FINISHED.to_string(),
        transition,
    }
}
