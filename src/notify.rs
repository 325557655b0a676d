//! Application notification channel for session termination.

// self
use crate::{_prelude::*, error::RefreshFailure};

/// Why a session was terminated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationReason {
	/// The user asked to log out.
	Logout,
	/// The access token could not be refreshed.
	RefreshFailed(RefreshFailure),
}
impl TerminationReason {
	/// Returns a low-cardinality label for metric fields.
	pub const fn label(&self) -> &'static str {
		match self {
			Self::Logout => "logout",
			Self::RefreshFailed(
				RefreshFailure::MissingRefreshToken | RefreshFailure::RefreshTokenExpired,
			) => "refresh_token_unusable",
			Self::RefreshFailed(_) => "refresh_failed",
		}
	}
}
impl Display for TerminationReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Logout => f.write_str("logout"),
			Self::RefreshFailed(failure) => write!(f, "refresh failed: {failure}"),
		}
	}
}

/// Receives the "return to the unauthenticated state" signal.
///
/// Called after the session store has been cleared, at most once per termination. Listeners
/// run on the terminating task and should hand off any slow work.
pub trait SessionListener
where
	Self: Send + Sync,
{
	/// Invoked once the session has been cleared.
	fn session_terminated(&self, reason: &TerminationReason);
}
impl<F> SessionListener for F
where
	F: Send + Sync + Fn(&TerminationReason),
{
	fn session_terminated(&self, reason: &TerminationReason) {
		self(reason)
	}
}

/// Listener that ignores every signal.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;
impl SessionListener for NoopListener {
	fn session_terminated(&self, _: &TerminationReason) {}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	#[test]
	fn closures_act_as_listeners() {
		let calls = Arc::new(AtomicUsize::new(0));
		let listener: Arc<dyn SessionListener> = {
			let calls = calls.clone();

			Arc::new(move |reason: &TerminationReason| {
				assert_eq!(reason, &TerminationReason::Logout);

				calls.fetch_add(1, Ordering::SeqCst);
			})
		};

		listener.session_terminated(&TerminationReason::Logout);
		NoopListener.session_terminated(&TerminationReason::Logout);

		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn reasons_render_their_cause() {
		let reason = TerminationReason::RefreshFailed(RefreshFailure::Rejected { status: 403 });

		assert_eq!(
			reason.to_string(),
			"refresh failed: Refresh endpoint rejected the request with status 403."
		);
		assert_eq!(reason.label(), "refresh_failed");
		assert_eq!(
			TerminationReason::RefreshFailed(RefreshFailure::RefreshTokenExpired).label(),
			"refresh_token_unusable"
		);
		assert_eq!(TerminationReason::Logout.label(), "logout");
	}
}
