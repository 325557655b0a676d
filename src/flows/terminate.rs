//! Session terminator: best-effort logout notification, unconditional local clearing.

// self
use crate::{
	_prelude::*,
	auth::Session,
	flows::SessionBroker,
	http::{ApiRequest, HttpTransport},
	notify::TerminationReason,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutNotice<'a> {
	email: &'a str,
	session_id: Option<&'a str>,
}

impl<T> SessionBroker<T>
where
	T: ?Sized + HttpTransport,
{
	/// Logs the user out; equivalent to terminating with [`TerminationReason::Logout`].
	pub async fn logout(&self) {
		self.terminate(TerminationReason::Logout).await
	}

	/// Ends the session.
	///
	/// The server is told about the logout whenever the session carries a user identity, with a
	/// `null` session id when none was issued; that call is never retried and its outcome never blocks clearing. The store
	/// is then cleared and the listener notified. Calls are serialized, and terminating an
	/// already-empty session does nothing, so repeated calls are harmless.
	pub async fn terminate(&self, reason: TerminationReason) {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "terminate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let cleared = span
			.instrument(async {
				let _serialized = self.termination.lock().await;
				let session = self.store.get();

				if session.is_empty() {
					obs::debug("terminate", "Session is already cleared.");

					return true;
				}

				self.notify_logout(&session).await;

				let cleared = match self.store.clear() {
					Ok(()) => true,
					Err(e) => {
						obs::warn(
							"terminate",
							format_args!("Persisted session could not be removed: {e}"),
						);

						false
					},
				};

				obs::record_termination(&reason);
				self.listener.session_terminated(&reason);

				cleared
			})
			.await;

		obs::record_flow_outcome(
			KIND,
			if cleared { FlowOutcome::Success } else { FlowOutcome::Failure },
		);
	}

	async fn notify_logout(&self, session: &Session) {
		let Some(user) = session.user.as_ref() else {
			obs::debug("terminate", "Skipping logout notification without a user identity.");

			return;
		};
		// A missing session id is sent as `null`.
		let notice = LogoutNotice { email: &user.email, session_id: session.session_id.as_deref() };
		let request = match ApiRequest::post(self.config.endpoints.logout.clone()).json(&notice) {
			Ok(request) => request.with_bearer(session.access_token.clone()),
			Err(e) => {
				obs::warn("terminate", format_args!("Logout notification not sent: {e}"));

				return;
			},
		};

		match self.dispatch(request).await {
			Ok(response) if response.is_success() => {},
			Ok(response) => obs::warn(
				"terminate",
				format_args!("Logout notification rejected with status {}.", response.status),
			),
			Err(e) => obs::warn(
				"terminate",
				format_args!("Logout notification failed: {}", e.describe()),
			),
		}
	}
}
