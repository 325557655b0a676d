//! Broker-level error types shared across the pipeline, coordinator, and stores.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Message surfaced when neither the server nor the transport explains a failure.
pub const FALLBACK_FAILURE_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS) outside the request pipeline.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The current access token is expired; informational, drives a refresh.
	#[error("Access token has expired.")]
	TokenExpired,
	/// No authenticated session is installed.
	#[error("No authenticated session is available.")]
	NotAuthenticated,
	/// The access token could not be refreshed; the session has been terminated.
	#[error("Session refresh failed: {0}")]
	RefreshFailed(RefreshFailure),
	/// The request pipeline gave up on a request.
	#[error(transparent)]
	RequestFailed(#[from] RequestFailure),
	/// A response body could not be decoded into the expected shape.
	#[error("Response body (status {status}) is not valid JSON for the expected shape.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
}
impl Error {
	/// Returns `true` when the failure means the user must authenticate again.
	pub fn is_auth_failure(&self) -> bool {
		match self {
			Self::NotAuthenticated | Self::RefreshFailed(_) => true,
			Self::RequestFailed(failure) => failure.kind == RequestFailureKind::Unauthorized,
			_ => false,
		}
	}
}
impl From<RefreshFailure> for Error {
	fn from(failure: RefreshFailure) -> Self {
		Self::RefreshFailed(failure)
	}
}
impl From<crate::config::SessionConfigError> for Error {
	fn from(e: crate::config::SessionConfigError) -> Self {
		Self::Config(e.into())
	}
}

/// Configuration and request-construction failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Session configuration failed validation.
	#[error(transparent)]
	Session(#[from] crate::config::SessionConfigError),
	/// Request path cannot be resolved against the configured base URL.
	#[error("Request path `{path}` cannot be resolved against the base URL.")]
	InvalidPath {
		/// Path supplied by the caller.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized to JSON.")]
	RequestBody(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure (including timeouts).
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Renders the error together with its source chain on one line.
	pub fn describe(&self) -> String {
		let mut message = self.to_string();
		let mut source = StdError::source(self);

		while let Some(cause) = source {
			message.push_str(": ");
			message.push_str(&cause.to_string());

			source = cause.source();
		}

		message
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Reasons a refresh attempt can fail; broadcast to every waiter of the attempt.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshFailure {
	/// No refresh token is stored.
	#[error("No refresh token is available.")]
	MissingRefreshToken,
	/// The refresh token is expired or undecodable; no network call was made.
	#[error("Refresh token has expired.")]
	RefreshTokenExpired,
	/// The refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the request with status {status}.")]
	Rejected {
		/// HTTP status code returned by the refresh endpoint.
		status: u16,
	},
	/// The refresh call failed before a response arrived (includes timeouts).
	#[error("Refresh call failed: {message}.")]
	Network {
		/// Transport error summary.
		message: String,
	},
	/// The refresh endpoint answered successfully but without a usable access token.
	#[error("Refresh response is malformed: {message}.")]
	MalformedResponse {
		/// Decoding failure summary.
		message: String,
	},
	/// The session was cleared or replaced while the refresh was in flight.
	#[error("Session was cleared while the refresh was in flight.")]
	SessionCleared,
	/// The refreshed token could not be persisted.
	#[error("Refreshed token could not be stored: {message}.")]
	Storage {
		/// Storage failure summary.
		message: String,
	},
	/// The task driving the refresh was dropped before the attempt settled.
	#[error("Refresh attempt was abandoned before it completed.")]
	Abandoned,
}

/// Classification of a failed pipeline request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestFailureKind {
	/// The server rejected the credential (HTTP 401).
	Unauthorized,
	/// No response arrived (connection, TLS, timeout).
	Network,
	/// The server failed (HTTP 5xx).
	Server,
	/// Any other client error (HTTP 4xx except 401).
	Client,
}
impl RequestFailureKind {
	/// Classifies an HTTP status code, returning `None` for non-failure statuses.
	pub fn from_status(status: u16) -> Option<Self> {
		match status {
			401 => Some(Self::Unauthorized),
			400..=499 => Some(Self::Client),
			500..=599 => Some(Self::Server),
			_ => None,
		}
	}

	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unauthorized => "unauthorized",
			Self::Network => "network",
			Self::Server => "server",
			Self::Client => "client",
		}
	}
}
impl Display for RequestFailureKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Failure returned by the request pipeline.
#[derive(Debug, ThisError)]
#[error("Request failed ({kind}): {message}")]
pub struct RequestFailure {
	/// Failure classification.
	pub kind: RequestFailureKind,
	/// HTTP status code, when a response arrived.
	pub status: Option<u16>,
	/// Human-readable message, preferring the server's own `message` field.
	pub message: String,
	/// Transport failure behind a [`RequestFailureKind::Network`] failure.
	#[source]
	pub source: Option<TransportError>,
}
impl RequestFailure {
	/// Builds a failure from an HTTP status and the server-provided message, if any.
	pub fn from_status(kind: RequestFailureKind, status: u16, message: Option<String>) -> Self {
		let message = message
			.filter(|m| !m.trim().is_empty())
			.unwrap_or_else(|| FALLBACK_FAILURE_MESSAGE.to_owned());

		Self { kind, status: Some(status), message, source: None }
	}

	/// Builds a network failure from a transport error.
	pub fn network(source: TransportError) -> Self {
		Self {
			kind: RequestFailureKind::Network,
			status: None,
			message: source.describe(),
			source: Some(source),
		}
	}
}
