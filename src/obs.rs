//! Optional observability helpers for broker flows.
//!
//! # Feature Flags
//!
//! - `tracing` (default) wraps each flow in a `session_broker.flow` span. Request spans also
//!   carry the HTTP method and URL path; tokens and query strings never reach a field.
//! - `metrics` exports `session_broker_flow_total{flow, outcome}`,
//!   `session_broker_refresh_joins_total`, and `session_broker_terminations_total{reason}`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Session flows observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Login exchange.
	Login,
	/// Signup exchange.
	Signup,
	/// Single-flight access-token refresh.
	Refresh,
	/// Session termination and its logout notification.
	Logout,
	/// Authenticated request through the pipeline.
	Request,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Login => "login",
			FlowKind::Signup => "signup",
			FlowKind::Refresh => "refresh",
			FlowKind::Logout => "logout",
			FlowKind::Request => "request",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
