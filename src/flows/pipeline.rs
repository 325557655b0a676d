//! Request pipeline: credential selection, dispatch, and the single retry after a refresh.

// self
use crate::{
	_prelude::*,
	config::EndpointKind,
	error::{RequestFailure, RequestFailureKind, TransportError},
	flows::SessionBroker,
	http::{ApiRequest, ApiResponse, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<T> SessionBroker<T>
where
	T: ?Sized + HttpTransport,
{
	/// Sends `request` with the session's credential attached.
	///
	/// Login and signup go out without a credential, the refresh endpoint bears the refresh
	/// token, and everything else bears the access token. A protected request rejected with
	/// 401 while it carried an access token triggers one refresh and exactly one retry; every
	/// other failure is returned as is. At most two network attempts are made.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::request(request.method, &request.url);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.send_with_recovery(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn send_with_recovery(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		let kind = self.config.classify(&request.url);

		request.bearer = match kind {
			EndpointKind::Public => None,
			EndpointKind::Refresh => self.store.refresh_token(),
			EndpointKind::Logout | EndpointKind::Protected => self.store.access_token(),
		};

		if kind == EndpointKind::Protected
			&& self.config.expiry.proactive_refresh
			&& let Some(token) = request.bearer.as_ref()
			&& self.config.expiry_checker().is_expired(Some(token.expose()))
		{
			obs::debug("send", "Access token is expired; refreshing before dispatch.");

			let token = self.ensure_fresh_token_after(Some(token)).await?;

			request.bearer = Some(token);
		}

		let response = self.dispatch(request.clone()).await.map_err(RequestFailure::network)?;

		if response.is_success() {
			return Ok(response);
		}

		let recoverable = kind == EndpointKind::Protected
			&& !request.is_retry()
			&& RequestFailureKind::from_status(response.status)
				== Some(RequestFailureKind::Unauthorized);
		let Some(stale) = request.bearer.as_ref().filter(|_| recoverable) else {
			return Err(failure_from(&response).into());
		};

		match self.ensure_fresh_token_after(Some(stale)).await {
			Ok(token) => {
				obs::debug("send", "Retrying once with the refreshed access token.");

				let retry = request.retry_with(token);
				let response = self.dispatch(retry).await.map_err(RequestFailure::network)?;

				if response.is_success() {
					Ok(response)
				} else {
					Err(failure_from(&response).into())
				}
			},
			Err(failure) => {
				obs::debug("send", format_args!("Not retrying after failed refresh: {failure}"));

				Err(failure_from(&response).into())
			},
		}
	}

	/// Performs one network attempt without credential selection or recovery.
	pub(crate) async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
		self.transport.execute(request).await
	}
}

fn failure_from(response: &ApiResponse) -> RequestFailure {
	let kind = RequestFailureKind::from_status(response.status).unwrap_or(RequestFailureKind::Server);

	RequestFailure::from_status(kind, response.status, response.message())
}
