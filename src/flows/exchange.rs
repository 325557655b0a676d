//! Login and signup exchanges, the only way a fresh session enters the broker.

// self
use crate::{
	_prelude::*,
	auth::{Session, TokenSecret, UserIdentity},
	flows::SessionBroker,
	http::{ApiRequest, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Credentials posted to the login endpoint.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
	/// Account email.
	pub email: String,
	/// Account password.
	pub password: String,
}
impl LoginRequest {
	/// Creates login credentials.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into() }
	}
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Registration details posted to the signup endpoint.
#[derive(Clone, Serialize)]
pub struct SignupRequest {
	/// Display name.
	pub name: String,
	/// Account email.
	pub email: String,
	/// Account password.
	pub password: String,
}
impl SignupRequest {
	/// Creates registration details.
	pub fn new(
		name: impl Into<String>,
		email: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		Self { name: name.into(), email: email.into(), password: password.into() }
	}
}
impl Debug for SignupRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SignupRequest")
			.field("name", &self.name)
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Body returned by a successful login.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
	access_token: TokenSecret,
	refresh_token: TokenSecret,
	current_user: UserIdentity,
	#[serde(default)]
	session_id: Option<String>,
}

/// Body returned by a successful signup; the token pair is optional.
#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SignupResponse {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	current_user: Option<UserIdentity>,
	session_id: Option<String>,
}

impl<T> SessionBroker<T>
where
	T: ?Sized + HttpTransport,
{
	/// Exchanges credentials for a session and installs it, replacing any previous one.
	///
	/// Failures carry the server's `message` when it sent one.
	pub async fn login(&self, credentials: &LoginRequest) -> Result<Session> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let request =
					ApiRequest::post(self.config.endpoints.login.clone()).json(credentials)?;
				let body = self.send(request).await?.json::<LoginResponse>()?;
				let session = Session::authenticated(
					body.access_token,
					body.refresh_token,
					body.current_user,
					body.session_id.filter(|id| !id.trim().is_empty()),
				);

				self.store.set(session.clone())?;

				Ok(session)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Registers an account.
	///
	/// When the response carries a complete token pair and identity the session is installed
	/// and returned; otherwise the account exists but the caller still has to log in.
	pub async fn signup(&self, details: &SignupRequest) -> Result<Option<Session>> {
		const KIND: FlowKind = FlowKind::Signup;

		let span = FlowSpan::new(KIND, "signup");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let request =
					ApiRequest::post(self.config.endpoints.signup.clone()).json(details)?;
				let response = self.send(request).await?;
				let body = if response.body.iter().all(u8::is_ascii_whitespace) {
					SignupResponse::default()
				} else {
					response.json::<SignupResponse>()?
				};
				let (Some(access), Some(refresh), Some(user)) =
					(body.access_token, body.refresh_token, body.current_user)
				else {
					obs::debug("signup", "Signup response carried no session.");

					return Ok(None);
				};
				let session = Session::authenticated(
					access,
					refresh,
					user,
					body.session_id.filter(|id| !id.trim().is_empty()),
				);

				self.store.set(session.clone())?;

				Ok(Some(session))
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}
