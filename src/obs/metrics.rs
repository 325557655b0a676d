// self
use crate::{
	notify::TerminationReason,
	obs::{FlowKind, FlowOutcome},
};

/// Increments `session_broker_flow_total{flow, outcome}` (when `metrics` is enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"session_broker_flow_total",
		"flow" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Increments `session_broker_refresh_joins_total` for a caller served by a refresh it did not
/// start.
pub fn record_refresh_join() {
	#[cfg(feature = "metrics")]
	metrics::counter!("session_broker_refresh_joins_total").increment(1);
}

/// Increments `session_broker_terminations_total{reason}`.
pub fn record_termination(reason: &TerminationReason) {
	#[cfg(feature = "metrics")]
	metrics::counter!("session_broker_terminations_total", "reason" => reason.label())
		.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = reason;
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::RefreshFailure;

	#[test]
	fn recording_without_a_recorder_is_harmless() {
		record_flow_outcome(FlowKind::Refresh, FlowOutcome::Failure);
		record_refresh_join();
		record_termination(&TerminationReason::RefreshFailed(RefreshFailure::Abandoned));
	}
}
