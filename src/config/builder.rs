// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	config::{
		DEFAULT_LOGIN_PATH, DEFAULT_LOGOUT_PATH, DEFAULT_REFRESH_PATH, DEFAULT_SIGNUP_PATH,
		ExpiryPolicy, SessionConfig, SessionEndpoints,
	},
};

const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

/// Errors raised while constructing or validating session configurations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SessionConfigError {
	/// The base URL cannot have relative paths joined onto it.
	#[error("Base URL `{url}` cannot be used as a base.")]
	InvalidBase {
		/// Offending base URL.
		url: String,
	},
	/// An endpoint path does not resolve against the base URL.
	#[error("The {endpoint} endpoint path `{path}` is invalid: {message}.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path that failed to resolve.
		path: String,
		/// Parser message.
		message: String,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// The expiry leeway must not be negative.
	#[error("Expiry leeway must not be negative.")]
	NegativeLeeway,
}

/// Builder for [`SessionConfig`] values.
#[derive(Debug)]
pub struct SessionConfigBuilder {
	/// Base URL for every endpoint and request path.
	pub base_url: Url,
	/// Login route relative to the base URL.
	pub login_path: String,
	/// Signup route relative to the base URL.
	pub signup_path: String,
	/// Logout route relative to the base URL.
	pub logout_path: String,
	/// Refresh route relative to the base URL.
	pub refresh_path: String,
	/// Expiry policy.
	pub expiry: ExpiryPolicy,
	/// Optional transport timeout.
	pub request_timeout: Option<StdDuration>,
}
impl SessionConfigBuilder {
	/// Creates a new builder with the default routes.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			login_path: DEFAULT_LOGIN_PATH.into(),
			signup_path: DEFAULT_SIGNUP_PATH.into(),
			logout_path: DEFAULT_LOGOUT_PATH.into(),
			refresh_path: DEFAULT_REFRESH_PATH.into(),
			expiry: ExpiryPolicy::default(),
			request_timeout: None,
		}
	}

	/// Overrides the login route.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Overrides the signup route.
	pub fn signup_path(mut self, path: impl Into<String>) -> Self {
		self.signup_path = path.into();

		self
	}

	/// Overrides the logout route.
	pub fn logout_path(mut self, path: impl Into<String>) -> Self {
		self.logout_path = path.into();

		self
	}

	/// Overrides the refresh route.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Sets the clock-skew leeway applied by expiry checks.
	pub fn expiry_leeway(mut self, leeway: Duration) -> Self {
		self.expiry.leeway = leeway;

		self
	}

	/// Enables or disables refreshing before dispatch.
	pub fn proactive_refresh(mut self, enabled: bool) -> Self {
		self.expiry.proactive_refresh = enabled;

		self
	}

	/// Sets the transport timeout.
	pub fn request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = Some(timeout);

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<SessionConfig, SessionConfigError> {
		let mut base_url = self.base_url;

		if base_url.cannot_be_a_base() {
			return Err(SessionConfigError::InvalidBase { url: base_url.to_string() });
		}
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		validate_endpoint("base", &base_url)?;

		if self.expiry.leeway.is_negative() {
			return Err(SessionConfigError::NegativeLeeway);
		}

		let endpoints = SessionEndpoints {
			login: resolve_endpoint(&base_url, "login", &self.login_path)?,
			signup: resolve_endpoint(&base_url, "signup", &self.signup_path)?,
			logout: resolve_endpoint(&base_url, "logout", &self.logout_path)?,
			refresh: resolve_endpoint(&base_url, "refresh", &self.refresh_path)?,
		};

		Ok(SessionConfig {
			base_url,
			endpoints,
			expiry: self.expiry,
			request_timeout: self.request_timeout,
		})
	}
}

fn resolve_endpoint(
	base: &Url,
	name: &'static str,
	path: &str,
) -> Result<Url, SessionConfigError> {
	let url = base.join(path).map_err(|e| SessionConfigError::InvalidEndpoint {
		endpoint: name,
		path: path.to_owned(),
		message: e.to_string(),
	})?;

	validate_endpoint(name, &url)?;

	Ok(url)
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), SessionConfigError> {
	let loopback = url.host_str().is_some_and(|host| LOOPBACK_HOSTS.contains(&host));

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(SessionConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}
