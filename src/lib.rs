//! Client-side session broker that keeps API calls authenticated with a short-lived access token
//! and a longer-lived refresh token, refreshing single-flight under concurrent pressure, retrying
//! stale requests once, and terminating the session safely when recovery is impossible.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod notify;
pub mod obs;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and fixtures shared by integration tests and demos; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use crate::{
		auth::{Session, UserIdentity},
		config::SessionConfig,
		flows::{ReqwestBroker, SessionBroker},
		http::ReqwestTransport,
		notify::{SessionListener, TerminationReason},
		store::{MemoryKv, SessionStore},
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = ReqwestBroker;

	/// Listener that remembers every termination signal it receives.
	#[derive(Debug, Default)]
	pub struct RecordingListener(Mutex<Vec<TerminationReason>>);
	impl RecordingListener {
		/// Returns the reasons recorded so far, oldest first.
		pub fn reasons(&self) -> Vec<TerminationReason> {
			self.0.lock().clone()
		}
	}
	impl SessionListener for RecordingListener {
		fn session_terminated(&self, reason: &TerminationReason) {
			self.0.lock().push(reason.clone());
		}
	}

	/// Mints an unsigned JWT-shaped token whose `exp` claim is `exp` (unix seconds).
	pub fn mint_token(subject: &str, exp: i64) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
		let claims = serde_json::json!({ "sub": subject, "exp": exp });
		let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

		format!("{header}.{payload}.signature")
	}

	/// Mints a token that expires `ttl` from now (negative values yield an expired token).
	pub fn token_expiring_in(subject: &str, ttl: Duration) -> String {
		mint_token(subject, (OffsetDateTime::now_utc() + ttl).unix_timestamp())
	}

	/// Builds a [`SessionConfig`] rooted at a mock server base URL.
	pub fn test_config(base_url: &str) -> SessionConfig {
		let base = Url::parse(base_url).expect("Mock server base URL should parse.");

		SessionConfig::builder(base).build().expect("Test session config should build.")
	}

	/// Constructs a [`SessionBroker`] backed by an in-memory key-value store, a recording
	/// listener, and the default reqwest transport.
	pub fn build_reqwest_test_broker(
		config: SessionConfig,
	) -> (ReqwestTestBroker, Arc<MemoryKv>, Arc<RecordingListener>) {
		let kv = Arc::new(MemoryKv::default());
		let store = SessionStore::open(kv.clone());
		let listener = Arc::new(RecordingListener::default());
		let broker = SessionBroker::with_transport(config, store, ReqwestTransport::default())
			.with_listener(listener.clone());

		(broker, kv, listener)
	}

	/// Installs an authenticated session for `demo@example.com`.
	pub fn seed_session<T>(broker: &SessionBroker<T>, access: &str, refresh: &str)
	where
		T: ?Sized + crate::http::HttpTransport,
	{
		let session = Session::authenticated(
			access,
			refresh,
			UserIdentity::new("demo@example.com", "Demo User"),
			Some("session-demo".into()),
		);

		broker.store.set(session).expect("Seeding the session store should succeed.");
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tokio as _};
