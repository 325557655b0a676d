//! Session flows powered by the [`SessionBroker`] facade.

pub mod exchange;
pub mod pipeline;
pub mod refresh;
pub mod terminate;

pub use exchange::*;
pub use refresh::{RefreshCounts, RefreshMetrics};

// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, TokenState},
	config::SessionConfig,
	flows::refresh::RefreshState,
	http::{ApiRequest, HttpTransport, Method},
	notify::{NoopListener, SessionListener},
	store::SessionStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestTransport, store::KvStore};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport.
pub type ReqwestBroker = SessionBroker<ReqwestTransport>;

/// Keeps API calls authenticated for the single session of the process.
///
/// The broker owns the transport, the session store, the configuration, and the refresh
/// coordinator state. Clones share all of them, so one broker can be handed to every task that
/// issues requests; the single-flight and termination guarantees hold across clones.
pub struct SessionBroker<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for every outbound call.
	pub transport: Arc<T>,
	/// Session store holding the current credentials.
	pub store: Arc<SessionStore>,
	/// Endpoints and expiry policy.
	pub config: SessionConfig,
	/// Receiver of termination signals.
	pub listener: Arc<dyn SessionListener>,
	/// Shared counters for refresh coordination.
	pub refresh_metrics: Arc<RefreshMetrics>,
	refresh: Arc<RefreshState>,
	termination: Arc<AsyncMutex<()>>,
}
impl<T> SessionBroker<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a broker over a caller-provided transport.
	pub fn with_transport(
		config: SessionConfig,
		store: impl Into<Arc<SessionStore>>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			store: store.into(),
			config,
			listener: Arc::new(NoopListener),
			refresh_metrics: Default::default(),
			refresh: Default::default(),
			termination: Default::default(),
		}
	}

	/// Sets the listener notified when the session is terminated.
	pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
		self.listener = listener;

		self
	}

	/// Builds a request for `path`, resolved against the configured base URL.
	pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest> {
		Ok(ApiRequest::new(method, self.config.resolve(path)?))
	}

	/// Reports where the access token stands in its validity cycle.
	pub fn token_state(&self) -> TokenState {
		let Some(token) = self.store.access_token() else {
			return TokenState::Terminated;
		};

		if self.refresh.is_pending() {
			TokenState::Refreshing
		} else if self.config.expiry_checker().is_expired(Some(token.expose())) {
			TokenState::Expired
		} else {
			TokenState::Valid
		}
	}

	/// Returns the current access token if it is installed and not known to be expired.
	pub fn access_token(&self) -> Result<TokenSecret> {
		let token = self.store.access_token().ok_or(Error::NotAuthenticated)?;

		if self.config.expiry_checker().is_expired(Some(token.expose())) {
			return Err(Error::TokenExpired);
		}

		Ok(token)
	}
}
#[cfg(feature = "reqwest")]
impl SessionBroker<ReqwestTransport> {
	/// Creates a broker with its own reqwest transport, rehydrating the session from `kv`.
	///
	/// The configured request timeout, if any, is applied to every call.
	pub fn new(config: SessionConfig, kv: Arc<dyn KvStore>) -> Result<Self> {
		let transport = match config.request_timeout {
			Some(timeout) => ReqwestTransport::with_timeout(timeout)?,
			None => ReqwestTransport::default(),
		};

		Ok(Self::with_transport(config, SessionStore::open(kv), transport))
	}
}
impl<T> Clone for SessionBroker<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			config: self.config.clone(),
			listener: self.listener.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			refresh: self.refresh.clone(),
			termination: self.termination.clone(),
		}
	}
}
impl<T> Debug for SessionBroker<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBroker")
			.field("base_url", &self.config.base_url.as_str())
			.field("session", &self.store.get())
			.field("refresh_pending", &self.refresh.is_pending())
			.finish()
	}
}
