//! The persisted session record and the access-token validity states derived from it.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Authenticated identity attached to a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
	/// Account email; also sent with the logout notification.
	pub email: String,
	/// Display name.
	pub name: String,
}
impl UserIdentity {
	/// Creates an identity from an email and a display name.
	pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
		Self { email: email.into(), name: name.into() }
	}
}

/// The single logical session of the process.
///
/// `access_token` and `refresh_token` travel together on login and logout; only the access
/// token is replaced in place by a refresh. A present access token implies a present `user`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
	/// Short-lived bearer credential for ordinary API calls.
	pub access_token: Option<TokenSecret>,
	/// Longer-lived credential used only by the refresh call.
	pub refresh_token: Option<TokenSecret>,
	/// Identity the tokens were issued for.
	pub user: Option<UserIdentity>,
	/// Server-side session correlation id, sent on logout.
	pub session_id: Option<String>,
}
impl Session {
	/// Builds a fully authenticated session as produced by a login or signup exchange.
	pub fn authenticated(
		access_token: impl Into<TokenSecret>,
		refresh_token: impl Into<TokenSecret>,
		user: UserIdentity,
		session_id: Option<String>,
	) -> Self {
		Self {
			access_token: Some(access_token.into()),
			refresh_token: Some(refresh_token.into()),
			user: Some(user),
			session_id,
		}
	}

	/// Returns `true` when every field is absent.
	pub fn is_empty(&self) -> bool {
		self.access_token.is_none()
			&& self.refresh_token.is_none()
			&& self.user.is_none()
			&& self.session_id.is_none()
	}

	/// Returns `true` when an access token is installed.
	pub fn is_authenticated(&self) -> bool {
		self.access_token.is_some()
	}

	/// Checks the record-level invariants, returning a description of the first violation.
	pub fn invariant_violation(&self) -> Option<&'static str> {
		if self.access_token.is_some() != self.refresh_token.is_some() {
			return Some("access and refresh tokens must be set together");
		}
		if self.access_token.is_some() && self.user.is_none() {
			return Some("an access token requires an authenticated user");
		}

		None
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("user", &self.user)
			.field("session_id", &self.session_id)
			.finish()
	}
}

/// Access-token validity as seen by the broker.
///
/// `Valid -> Expired -> Refreshing -> (Valid | Terminated)`; `Terminated` is left only by a new
/// login.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenState {
	/// The access token is installed and not known to be expired.
	Valid,
	/// The access token is installed but its expiry claim has passed.
	Expired,
	/// A refresh call is in flight.
	Refreshing,
	/// No session is installed.
	Terminated,
}
