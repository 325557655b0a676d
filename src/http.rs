//! Transport primitives for session-aware API calls.
//!
//! The module exposes [`HttpTransport`], the broker's only dependency on an HTTP stack, along
//! with the transport-agnostic [`ApiRequest`] and [`ApiResponse`] values that flow through the
//! request pipeline. [`ReqwestTransport`] is the default implementation; custom stacks (or
//! scripted fakes in tests) implement the trait directly.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, TransportError},
};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing one request.
///
/// Implementations perform exactly one network attempt per call and report any received
/// response, whatever its status, as `Ok`; only failures to obtain a response are errors.
/// Retries and credential handling belong to the broker. Implementations must be
/// `Send + Sync + 'static` so a single transport can be shared by every in-flight request.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves to the raw response.
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP methods supported by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outbound API request.
///
/// The bearer credential is kept apart from `headers` so the pipeline can swap it on retry
/// and so it stays redacted in `Debug` output.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Extra headers, excluding `Authorization`.
	pub headers: BTreeMap<String, String>,
	/// Raw request body.
	pub body: Option<Vec<u8>>,
	/// Credential attached as `Authorization: Bearer ...`.
	pub bearer: Option<TokenSecret>,
	pub(crate) retried: bool,
}
impl ApiRequest {
	/// Creates a request without body or credential.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: BTreeMap::new(), body: None, bearer: None, retried: false }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::Get, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::Post, url)
	}

	/// Adds or replaces a header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into().to_ascii_lowercase(), value.into());

		self
	}

	/// Serializes `body` as JSON and sets the content type.
	pub fn json<T>(mut self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body)?);

		Ok(self.header("content-type", "application/json"))
	}

	/// Replaces the bearer credential.
	pub fn with_bearer(mut self, token: Option<TokenSecret>) -> Self {
		self.bearer = token;

		self
	}

	/// Returns `true` when this is the pipeline's second and final attempt.
	pub fn is_retry(&self) -> bool {
		self.retried
	}

	/// Clones the request for its single retry, bearing `token`.
	pub(crate) fn retry_with(&self, token: TokenSecret) -> Self {
		let mut retry = self.clone();

		retry.bearer = Some(token);
		retry.retried = true;

		retry
	}
}

/// Raw response returned by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers with lowercase names; non-UTF-8 values are dropped.
	pub headers: BTreeMap<String, String>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response from a status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.into() }
	}

	/// Returns `true` for statuses below 400.
	pub fn is_success(&self) -> bool {
		self.status < 400
	}

	/// Returns the body as text, replacing invalid UTF-8.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::Decode { source, status: self.status })
	}

	/// Extracts the server's `message` field from a JSON error body, if any.
	pub fn message(&self) -> Option<String> {
		#[derive(Deserialize)]
		struct ErrorBody {
			message: Option<serde_json::Value>,
		}

		let body = serde_json::from_slice::<ErrorBody>(&self.body).ok()?;

		match body.message? {
			serde_json::Value::String(message) => Some(message),
			serde_json::Value::Array(items) => {
				let parts = items
					.iter()
					.filter_map(|item| item.as_str())
					.collect::<Vec<_>>();

				(!parts.is_empty()).then(|| parts.join("; "))
			},
			_ => None,
		}
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that aborts every call after `timeout`.
	pub fn with_timeout(timeout: std::time::Duration) -> Result<Self, ConfigError> {
		Ok(Self(ReqwestClient::builder().timeout(timeout).build()?))
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Patch => reqwest::Method::PATCH,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut builder = client.request(method, request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(token) = request.bearer.as_ref() {
				builder = builder.bearer_auth(token.expose());
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retry_clone_swaps_credential_and_marks_attempt() {
		let url = Url::parse("https://api.example.com/quote").expect("Fixture URL should parse.");
		let original = ApiRequest::post(url)
			.header("X-Trace", "abc")
			.json(&serde_json::json!({ "n": 1 }))
			.expect("JSON body should serialize.")
			.with_bearer(Some("stale".into()));
		let retry = original.retry_with("fresh".into());

		assert!(!original.is_retry());
		assert!(retry.is_retry());
		assert_eq!(retry.bearer.as_ref().map(TokenSecret::expose), Some("fresh"));
		assert_eq!(retry.body, original.body);
		assert_eq!(retry.headers.get("x-trace").map(String::as_str), Some("abc"));
		assert_eq!(
			retry.headers.get("content-type").map(String::as_str),
			Some("application/json")
		);
		assert!(!format!("{retry:?}").contains("fresh"));
	}

	#[test]
	fn response_message_prefers_server_text() {
		assert_eq!(
			ApiResponse::new(401, r#"{"message":"Invalid credentials"}"#).message(),
			Some("Invalid credentials".into())
		);
		assert_eq!(
			ApiResponse::new(400, r#"{"message":["email must be an email","password too short"]}"#)
				.message(),
			Some("email must be an email; password too short".into())
		);
		assert_eq!(ApiResponse::new(500, "Internal Server Error").message(), None);
		assert_eq!(ApiResponse::new(500, r#"{"message":42}"#).message(), None);
	}

	#[test]
	fn json_decode_reports_path() {
		#[derive(Debug, Deserialize)]
		#[allow(dead_code)]
		struct Quote {
			quote: String,
		}

		let err = ApiResponse::new(200, r#"{"quote":7}"#)
			.json::<Quote>()
			.expect_err("Numeric quote should fail to decode.");

		match err {
			Error::Decode { source, status } => {
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "quote");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}
}
