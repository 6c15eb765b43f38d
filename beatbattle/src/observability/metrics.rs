//! Metrics collection for beatbattle.
//!
//! Provides Prometheus-compatible metrics with label cardinality protection
//! and typed convenience functions for recording measurements.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use beatbattle_core::{Phase, VoteOutcome};

use crate::error::BattleError;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Gateway error kinds accepted as label values.
const KNOWN_ERROR_KINDS: [&str; 4] = ["timeout", "not_found", "database", "corrupt"];

/// Sanitizes an error kind for use as a metrics label.
///
/// Returns the original string when it is a known kind, `"__unknown__"`
/// otherwise.
#[must_use]
pub fn sanitize_error_kind(kind: &str) -> &str {
    if KNOWN_ERROR_KINDS.contains(&kind) {
        kind
    } else {
        "__unknown__"
    }
}

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without
/// an HTTP endpoint.
///
/// # Errors
///
/// Returns `BattleError::Io` if the recorder or HTTP listener
/// cannot be installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), BattleError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| BattleError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

/// Registers metric descriptions with the global recorder.
fn describe_metrics() {
    describe_counter!("beatbattle_votes_total", "Vote requests by outcome label");
    describe_counter!(
        "beatbattle_phase_transitions_total",
        "Persisted contest phase transitions"
    );
    describe_histogram!(
        "beatbattle_vote_duration_ms",
        "Vote request processing duration in milliseconds"
    );
    describe_counter!(
        "beatbattle_gateway_errors_total",
        "Persistence gateway failures by kind"
    );
}

/// Records a vote request by outcome.
pub fn record_vote(outcome: &VoteOutcome) {
    counter!("beatbattle_votes_total", "outcome" => outcome.label()).increment(1);
}

/// Records vote processing duration.
pub fn record_vote_duration(duration: Duration) {
    histogram!("beatbattle_vote_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// Records a persisted phase transition.
pub fn record_phase_transition(from: Phase, to: Phase) {
    counter!(
        "beatbattle_phase_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Records a gateway failure.
pub fn record_gateway_error(kind: &str) {
    counter!(
        "beatbattle_gateway_errors_total",
        "kind" => sanitize_error_kind(kind).to_owned()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatbattle_core::Rejection;

    #[test]
    fn sanitize_known_kinds() {
        for kind in &KNOWN_ERROR_KINDS {
            assert_eq!(sanitize_error_kind(kind), *kind);
        }
    }

    #[test]
    fn sanitize_unknown_kind() {
        assert_eq!(sanitize_error_kind("disk_on_fire"), "__unknown__");
        assert_eq!(sanitize_error_kind(""), "__unknown__");
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_vote(&VoteOutcome::VoteCast);
        record_vote(&VoteOutcome::Rejected(Rejection::SelfVote));
        record_vote_duration(Duration::from_millis(3));
        record_phase_transition(Phase::Entry, Phase::Voting);
        record_gateway_error("timeout");
    }
}
