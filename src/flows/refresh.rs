//! Single-flight access-token refresh with FIFO fan-out to waiting callers.
//!
//! The first caller that finds no refresh in flight becomes the leader: it checks the refresh
//! token locally, calls the refresh endpoint, and installs the new access token with a
//! compare-and-swap against the refresh token it used. Every caller arriving while the leader
//! is busy queues a continuation and receives the leader's outcome, in arrival order. A failed
//! refresh terminates the session before any waiter is released.
//!
//! Cancellation is not a failure. If the leader's future is dropped mid-refresh, its waiters are
//! released with [`RefreshFailure::Abandoned`] and the session is left as it was, so the next
//! caller starts a new refresh.

mod metrics;

pub use metrics::{RefreshCounts, RefreshMetrics};

// crates.io
use futures::channel::oneshot;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::RefreshFailure,
	flows::SessionBroker,
	http::{ApiRequest, HttpTransport},
	notify::TerminationReason,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::AccessTokenSwap,
};

type RefreshOutcome = std::result::Result<TokenSecret, RefreshFailure>;
type Continuation = Box<dyn FnOnce(&RefreshOutcome) + Send>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
	access_token: TokenSecret,
}

impl<T> SessionBroker<T>
where
	T: ?Sized + HttpTransport,
{
	/// Resolves to a fresh access token, refreshing at most once across concurrent callers.
	///
	/// A failure means the session has already been terminated, except for
	/// [`RefreshFailure::Abandoned`], which leaves the session untouched.
	pub async fn ensure_fresh_token(&self) -> Result<TokenSecret> {
		self.ensure_fresh_token_after(None).await.map_err(Error::from)
	}

	/// Like [`ensure_fresh_token`](Self::ensure_fresh_token), but reuses the current access
	/// token when it already replaced `stale` and is not known to be expired.
	pub(crate) async fn ensure_fresh_token_after(
		&self,
		stale: Option<&TokenSecret>,
	) -> std::result::Result<TokenSecret, RefreshFailure> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "ensure_fresh_token");
		let entry = self.refresh.enter(|| {
			let stale = stale?;
			let current = self.store.access_token()?;

			// Opaque tokens carry no claim and count as live here.
			(current != *stale
				&& !self.config.expiry_checker().is_known_expired(current.expose()))
			.then_some(current)
		});

		match entry {
			Entry::Reuse(token) => {
				self.refresh_metrics.record_reuse();
				obs::debug("ensure_fresh_token", "Reusing the token installed by a finished refresh.");

				Ok(token)
			},
			Entry::Join(receiver) => {
				self.refresh_metrics.record_join();
				obs::record_refresh_join();
				obs::debug("ensure_fresh_token", "Joining the refresh already in flight.");

				span.instrument(receiver).await.unwrap_or(Err(RefreshFailure::Abandoned))
			},
			Entry::Lead(leader) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

				let outcome = span
					.instrument(async {
						let outcome = self.refresh_access_token().await;

						if let Err(failure) = &outcome {
							obs::warn(
								"ensure_fresh_token",
								format_args!("Refresh failed; terminating the session: {failure}"),
							);

							self.terminate(TerminationReason::RefreshFailed(failure.clone())).await;
						}

						outcome
					})
					.await;

				match &outcome {
					Ok(_) => {
						self.refresh_metrics.record_success();
						obs::record_flow_outcome(KIND, FlowOutcome::Success);
					},
					Err(_) => {
						self.refresh_metrics.record_failure();
						obs::record_flow_outcome(KIND, FlowOutcome::Failure);
					},
				}

				leader.settle(&outcome);

				outcome
			},
		}
	}

	async fn refresh_access_token(&self) -> RefreshOutcome {
		let refresh_token = self.store.refresh_token().ok_or(RefreshFailure::MissingRefreshToken)?;

		if self.config.expiry_checker().is_expired(Some(refresh_token.expose())) {
			return Err(RefreshFailure::RefreshTokenExpired);
		}

		self.refresh_metrics.record_attempt();

		let request = ApiRequest::get(self.config.endpoints.refresh.clone())
			.with_bearer(Some(refresh_token.clone()));
		let response = self
			.dispatch(request)
			.await
			.map_err(|e| RefreshFailure::Network { message: e.describe() })?;

		if !response.is_success() {
			return Err(RefreshFailure::Rejected { status: response.status });
		}

		let body = response.json::<RefreshResponse>().map_err(|e| {
			let message = StdError::source(&e).map_or_else(|| e.to_string(), ToString::to_string);

			RefreshFailure::MalformedResponse { message }
		})?;

		if body.access_token.expose().trim().is_empty() {
			return Err(RefreshFailure::MalformedResponse {
				message: "accessToken is empty".into(),
			});
		}

		match self.store.compare_and_swap_access_token(&refresh_token, body.access_token.clone()) {
			Ok(AccessTokenSwap::Updated) => Ok(body.access_token),
			// A new login replaced the session mid-flight; its token is the fresh one.
			Ok(AccessTokenSwap::RefreshMismatch) =>
				self.store.access_token().ok_or(RefreshFailure::SessionCleared),
			Ok(AccessTokenSwap::Missing) => Err(RefreshFailure::SessionCleared),
			Err(e) => Err(RefreshFailure::Storage { message: e.to_string() }),
		}
	}
}

enum Entry<'a> {
	Reuse(TokenSecret),
	Join(oneshot::Receiver<RefreshOutcome>),
	Lead(Leader<'a>),
}

/// The `pending` flag and FIFO waiter queue of the refresh coordinator.
#[derive(Default)]
pub(crate) struct RefreshState(Mutex<InFlight>);
impl RefreshState {
	pub(crate) fn is_pending(&self) -> bool {
		self.0.lock().pending
	}

	/// Joins the refresh in flight, or else reuses a token, or else starts a refresh.
	fn enter(&self, reusable: impl FnOnce() -> Option<TokenSecret>) -> Entry<'_> {
		let mut in_flight = self.0.lock();

		if in_flight.pending {
			let (sender, receiver) = oneshot::channel();

			in_flight.waiters.push_back(Box::new(move |outcome: &RefreshOutcome| {
				let _ = sender.send(outcome.clone());
			}));

			return Entry::Join(receiver);
		}
		if let Some(token) = reusable() {
			return Entry::Reuse(token);
		}

		in_flight.pending = true;

		Entry::Lead(Leader { state: self, settled: false })
	}

	fn settle(&self, outcome: &RefreshOutcome) {
		let waiters = {
			let mut in_flight = self.0.lock();

			in_flight.pending = false;

			std::mem::take(&mut in_flight.waiters)
		};

		for waiter in waiters {
			waiter(outcome);
		}
	}
}
impl Debug for RefreshState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let in_flight = self.0.lock();

		f.debug_struct("RefreshState")
			.field("pending", &in_flight.pending)
			.field("waiters", &in_flight.waiters.len())
			.finish()
	}
}

#[derive(Default)]
struct InFlight {
	pending: bool,
	waiters: VecDeque<Continuation>,
}

/// Leadership of the current refresh; dropping it unsettled releases waiters as abandoned.
struct Leader<'a> {
	state: &'a RefreshState,
	settled: bool,
}
impl Leader<'_> {
	fn settle(mut self, outcome: &RefreshOutcome) {
		self.settled = true;
		self.state.settle(outcome);
	}
}
impl Drop for Leader<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.state.settle(&Err(RefreshFailure::Abandoned));
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lead(state: &RefreshState) -> Leader<'_> {
		match state.enter(|| None) {
			Entry::Lead(leader) => leader,
			_ => panic!("An idle coordinator should hand out leadership."),
		}
	}

	#[test]
	fn waiters_are_released_in_enqueue_order() {
		let state = RefreshState::default();
		let order = Arc::new(Mutex::new(Vec::new()));
		let leader = lead(&state);

		for id in 1..=3 {
			let order = order.clone();

			state.0.lock().waiters.push_back(Box::new(move |outcome: &RefreshOutcome| {
				assert_eq!(outcome.as_ref().map(TokenSecret::expose), Ok("T2"));

				order.lock().push(id);
			}));
		}

		leader.settle(&Ok("T2".into()));

		assert_eq!(*order.lock(), vec![1, 2, 3]);
		assert!(!state.is_pending());
	}

	#[test]
	fn joiners_share_the_leader_outcome() {
		let state = RefreshState::default();
		let leader = lead(&state);
		let receivers = (0..3)
			.map(|_| match state.enter(|| panic!("Joiners never consider reuse.")) {
				Entry::Join(receiver) => receiver,
				_ => panic!("A pending refresh should be joined."),
			})
			.collect::<Vec<_>>();

		assert!(state.is_pending());

		leader.settle(&Err(RefreshFailure::Rejected { status: 401 }));

		for mut receiver in receivers {
			assert_eq!(
				receiver.try_recv().expect("Waiter should be settled."),
				Some(Err(RefreshFailure::Rejected { status: 401 }))
			);
		}
	}

	#[test]
	fn dropped_leader_abandons_waiters() {
		let state = RefreshState::default();
		let leader = lead(&state);
		let Entry::Join(mut receiver) = state.enter(|| None) else {
			panic!("A pending refresh should be joined.");
		};

		drop(leader);

		assert_eq!(
			receiver.try_recv().expect("Waiter should be settled."),
			Some(Err(RefreshFailure::Abandoned))
		);
		assert!(!state.is_pending());
	}

	#[test]
	fn idle_coordinator_prefers_reusable_token() {
		let state = RefreshState::default();

		assert!(matches!(state.enter(|| Some("T2".into())), Entry::Reuse(token) if token.expose() == "T2"));
		assert!(!state.is_pending());
	}
}
