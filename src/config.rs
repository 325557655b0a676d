//! Session configuration: API endpoints, expiry policy, and transport timeout.
//!
//! Configurations are assembled through [`SessionConfigBuilder`], which resolves endpoint
//! paths against a base URL and validates the result, and can be persisted with serde.

/// Builder API for assembling session configurations.
pub mod builder;

pub use builder::*;

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, auth::ExpiryChecker, error::ConfigError};

/// Default login route, relative to the base URL.
pub const DEFAULT_LOGIN_PATH: &str = "auth/login";
/// Default signup route, relative to the base URL.
pub const DEFAULT_SIGNUP_PATH: &str = "auth/signup";
/// Default logout route, relative to the base URL.
pub const DEFAULT_LOGOUT_PATH: &str = "auth/logout";
/// Default refresh route, relative to the base URL.
pub const DEFAULT_REFRESH_PATH: &str = "auth/refresh";

/// Resolved endpoints of the authentication API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEndpoints {
	/// Login exchange endpoint (public).
	pub login: Url,
	/// Signup exchange endpoint (public).
	pub signup: Url,
	/// Logout notification endpoint.
	pub logout: Url,
	/// Refresh endpoint; the only endpoint that authenticates with the refresh token.
	pub refresh: Url,
}

/// How an outbound request is authenticated and recovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointKind {
	/// Login or signup: no credential, never refreshed.
	Public,
	/// Refresh endpoint: bears the refresh token, never refreshed.
	Refresh,
	/// Logout endpoint: bears the access token, never refreshed.
	Logout,
	/// Any other endpoint: bears the access token, refreshed once on 401.
	Protected,
}

/// Expiry handling knobs; the defaults keep the purely reactive, zero-leeway behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryPolicy {
	/// Treat tokens as expired this long before their `exp` claim.
	pub leeway: Duration,
	/// Refresh before dispatch when the access token is already known to be expired.
	pub proactive_refresh: bool,
}

/// Immutable session configuration consumed by the broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
	/// Base URL that relative request paths resolve against.
	pub base_url: Url,
	/// Authentication endpoints.
	pub endpoints: SessionEndpoints,
	/// Expiry policy.
	pub expiry: ExpiryPolicy,
	/// Timeout applied to every call made by the default transport.
	pub request_timeout: Option<StdDuration>,
}
impl SessionConfig {
	/// Creates a new builder rooted at `base_url`.
	pub fn builder(base_url: Url) -> SessionConfigBuilder {
		SessionConfigBuilder::new(base_url)
	}

	/// Resolves a request path against the base URL.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		self.base_url
			.join(path)
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })
	}

	/// Classifies a request URL; queries and fragments are ignored.
	pub fn classify(&self, url: &Url) -> EndpointKind {
		let endpoints = &self.endpoints;

		if same_endpoint(url, &endpoints.refresh) {
			EndpointKind::Refresh
		} else if same_endpoint(url, &endpoints.login) || same_endpoint(url, &endpoints.signup) {
			EndpointKind::Public
		} else if same_endpoint(url, &endpoints.logout) {
			EndpointKind::Logout
		} else {
			EndpointKind::Protected
		}
	}

	/// Builds the expiry checker described by the policy.
	pub fn expiry_checker(&self) -> ExpiryChecker {
		ExpiryChecker::with_leeway(self.expiry.leeway)
	}
}

fn same_endpoint(a: &Url, b: &Url) -> bool {
	a.origin() == b.origin() && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
}
