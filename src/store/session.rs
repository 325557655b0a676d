//! The process-wide [`Session`] record persisted through a [`KvStore`].

// self
use crate::{
	_prelude::*,
	auth::{Session, TokenSecret, UserIdentity},
	obs,
	store::{KvStore, KvWrite, StoreError},
};

/// Storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Storage key for the JSON-encoded user identity.
pub const CURRENT_USER_KEY: &str = "currentUser";
/// Storage key for the server-side session id.
pub const SESSION_ID_KEY: &str = "sessionId";

const ALL_KEYS: [&str; 4] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, CURRENT_USER_KEY, SESSION_ID_KEY];

/// Result of [`SessionStore::compare_and_swap_access_token`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessTokenSwap {
	/// The refresh token matched and the access token was replaced.
	Updated,
	/// A different session (new login) replaced the one the refresh was made for.
	RefreshMismatch,
	/// The session was cleared while the refresh was in flight.
	Missing,
}

/// Owns the in-memory [`Session`] and keeps it in step with durable storage.
///
/// Every mutation is written to the backend first and published in memory only after the
/// write succeeded, all under one lock, so readers never observe a half-written session.
/// [`clear`](Self::clear) is the exception: memory is always cleared, even when the backend
/// refuses the removal.
pub struct SessionStore {
	kv: Arc<dyn KvStore>,
	current: RwLock<Session>,
}
impl SessionStore {
	/// Opens the store, rehydrating the session from `kv`.
	///
	/// Fields that are absent, unreadable, or malformed are treated as absent. Tokens are only
	/// kept when both are present together with the user identity.
	pub fn open(kv: Arc<dyn KvStore>) -> Self {
		let current = RwLock::new(Self::rehydrate(kv.as_ref()));

		Self { kv, current }
	}

	/// Returns a snapshot of the current session.
	pub fn get(&self) -> Session {
		self.current.read().clone()
	}

	/// Returns the current access token, if any.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.current.read().access_token.clone()
	}

	/// Returns the current refresh token, if any.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.current.read().refresh_token.clone()
	}

	/// Replaces the whole session.
	pub fn set(&self, session: Session) -> Result<(), StoreError> {
		if let Some(violation) = session.invariant_violation() {
			return Err(StoreError::InvalidSession { message: violation.into() });
		}

		let writes = Self::writes_for(&session)?;
		let mut guard = self.current.write();

		self.kv.apply(&writes)?;

		*guard = session;

		Ok(())
	}

	/// Replaces only the access token, leaving the refresh token and identity untouched.
	pub fn set_access_token(&self, token: TokenSecret) -> Result<(), StoreError> {
		let mut guard = self.current.write();

		if guard.refresh_token.is_none() || guard.user.is_none() {
			return Err(StoreError::InvalidSession {
				message: "no authenticated session to update".into(),
			});
		}

		self.kv.set(ACCESS_TOKEN_KEY, token.expose())?;

		guard.access_token = Some(token);

		Ok(())
	}

	/// Replaces the access token only if the stored refresh token is still `expected_refresh`.
	pub fn compare_and_swap_access_token(
		&self,
		expected_refresh: &TokenSecret,
		token: TokenSecret,
	) -> Result<AccessTokenSwap, StoreError> {
		let mut guard = self.current.write();

		match guard.refresh_token.as_ref() {
			None => return Ok(AccessTokenSwap::Missing),
			Some(current) if current != expected_refresh => {
				return Ok(AccessTokenSwap::RefreshMismatch);
			},
			Some(_) => {},
		}

		self.kv.set(ACCESS_TOKEN_KEY, token.expose())?;

		guard.access_token = Some(token);

		Ok(AccessTokenSwap::Updated)
	}

	/// Removes every session field from memory and storage.
	///
	/// Memory is cleared unconditionally; a backend failure is still reported.
	pub fn clear(&self) -> Result<(), StoreError> {
		let writes = ALL_KEYS.map(|key| KvWrite::Remove { key });
		let mut guard = self.current.write();
		let result = self.kv.apply(&writes);

		*guard = Session::default();

		result
	}

	fn writes_for(session: &Session) -> Result<Vec<KvWrite>, StoreError> {
		fn write(key: &'static str, value: Option<String>) -> KvWrite {
			match value {
				Some(value) => KvWrite::Set { key, value },
				None => KvWrite::Remove { key },
			}
		}

		let user = session
			.user
			.as_ref()
			.map(serde_json::to_string)
			.transpose()
			.map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize current user: {e}"),
			})?;

		Ok(vec![
			write(ACCESS_TOKEN_KEY, session.access_token.as_ref().map(|t| t.expose().to_owned())),
			write(REFRESH_TOKEN_KEY, session.refresh_token.as_ref().map(|t| t.expose().to_owned())),
			write(CURRENT_USER_KEY, user),
			write(SESSION_ID_KEY, session.session_id.clone()),
		])
	}

	fn rehydrate(kv: &dyn KvStore) -> Session {
		let user = read_field(kv, CURRENT_USER_KEY).and_then(|raw| {
			serde_json::from_str::<UserIdentity>(&raw)
				.inspect_err(|e| {
					obs::warn("rehydrate", format_args!("Dropping malformed persisted user: {e}."))
				})
				.ok()
		});
		let mut session = Session {
			access_token: read_field(kv, ACCESS_TOKEN_KEY).map(TokenSecret::new),
			refresh_token: read_field(kv, REFRESH_TOKEN_KEY).map(TokenSecret::new),
			user,
			session_id: read_field(kv, SESSION_ID_KEY),
		};

		if let Some(violation) = session.invariant_violation() {
			obs::warn(
				"rehydrate",
				format_args!("Dropping persisted tokens because {violation}."),
			);

			session.access_token = None;
			session.refresh_token = None;
		}

		session
	}
}
impl Debug for SessionStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionStore").field("current", &*self.current.read()).finish()
	}
}

fn read_field(kv: &dyn KvStore, key: &'static str) -> Option<String> {
	match kv.get(key) {
		Ok(value) => value.filter(|v| !v.trim().is_empty()),
		Err(e) => {
			obs::warn("rehydrate", format_args!("Ignoring unreadable `{key}`: {e}"));

			None
		},
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryKv;

	fn user() -> UserIdentity {
		UserIdentity::new("ada@example.com", "Ada")
	}

	fn store_with(entries: &[(&str, &str)]) -> (Arc<MemoryKv>, SessionStore) {
		let kv = Arc::new(MemoryKv::default());

		for (key, value) in entries {
			kv.set(key, value).expect("Seeding the memory backend should succeed.");
		}

		let store = SessionStore::open(kv.clone());

		(kv, store)
	}

	#[test]
	fn set_persists_every_field() {
		let (kv, store) = store_with(&[]);

		store
			.set(Session::authenticated("access", "refresh", user(), Some("sid".into())))
			.expect("Setting a valid session should succeed.");

		let snapshot = kv.snapshot();

		assert_eq!(snapshot.get(ACCESS_TOKEN_KEY).map(String::as_str), Some("access"));
		assert_eq!(snapshot.get(REFRESH_TOKEN_KEY).map(String::as_str), Some("refresh"));
		assert_eq!(snapshot.get(SESSION_ID_KEY).map(String::as_str), Some("sid"));
		assert_eq!(
			snapshot.get(CURRENT_USER_KEY).map(String::as_str),
			Some(r#"{"email":"ada@example.com","name":"Ada"}"#)
		);
		assert_eq!(store.get().user, Some(user()));
	}

	#[test]
	fn set_rejects_invariant_violations() {
		let (kv, store) = store_with(&[]);
		let err = store
			.set(Session { access_token: Some("access".into()), ..Session::default() })
			.expect_err("A lone access token should be rejected.");

		assert!(matches!(err, StoreError::InvalidSession { .. }));
		assert!(kv.snapshot().is_empty());
		assert!(store.get().is_empty());
	}

	#[test]
	fn access_token_update_keeps_other_fields() {
		let (kv, store) = store_with(&[]);

		store
			.set(Session::authenticated("access", "refresh", user(), Some("sid".into())))
			.expect("Setting a valid session should succeed.");
		store.set_access_token("access-2".into()).expect("Access token update should succeed.");

		let session = store.get();

		assert_eq!(session.access_token.as_ref().map(TokenSecret::expose), Some("access-2"));
		assert_eq!(session.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh"));
		assert_eq!(session.session_id.as_deref(), Some("sid"));
		assert_eq!(kv.snapshot().get(ACCESS_TOKEN_KEY).map(String::as_str), Some("access-2"));
	}

	#[test]
	fn access_token_update_requires_a_session() {
		let (kv, store) = store_with(&[]);

		assert!(store.set_access_token("orphan".into()).is_err());
		assert!(kv.snapshot().is_empty());
	}

	#[test]
	fn compare_and_swap_guards_against_replaced_sessions() {
		let (_, store) = store_with(&[]);
		let expected = TokenSecret::new("refresh");

		assert_eq!(
			store.compare_and_swap_access_token(&expected, "a-1".into()),
			Ok(AccessTokenSwap::Missing)
		);

		store
			.set(Session::authenticated("access", "refresh-other", user(), None))
			.expect("Setting a valid session should succeed.");

		assert_eq!(
			store.compare_and_swap_access_token(&expected, "a-2".into()),
			Ok(AccessTokenSwap::RefreshMismatch)
		);
		assert_eq!(store.access_token().as_ref().map(TokenSecret::expose), Some("access"));

		store
			.set(Session::authenticated("access", "refresh", user(), None))
			.expect("Setting a valid session should succeed.");

		assert_eq!(
			store.compare_and_swap_access_token(&expected, "a-3".into()),
			Ok(AccessTokenSwap::Updated)
		);
		assert_eq!(store.access_token().as_ref().map(TokenSecret::expose), Some("a-3"));
	}

	#[test]
	fn clear_removes_all_fields() {
		let (kv, store) = store_with(&[]);

		store
			.set(Session::authenticated("access", "refresh", user(), Some("sid".into())))
			.expect("Setting a valid session should succeed.");
		store.clear().expect("Clearing should succeed.");

		assert!(store.get().is_empty());
		assert!(kv.snapshot().is_empty());

		store.clear().expect("Clearing twice should succeed.");
	}

	#[test]
	fn rehydrate_restores_persisted_session() {
		let (_, store) = store_with(&[
			(ACCESS_TOKEN_KEY, "access"),
			(REFRESH_TOKEN_KEY, "refresh"),
			(CURRENT_USER_KEY, r#"{"email":"ada@example.com","name":"Ada"}"#),
			(SESSION_ID_KEY, "sid"),
		]);
		let session = store.get();

		assert_eq!(session.access_token.as_ref().map(TokenSecret::expose), Some("access"));
		assert_eq!(session.user, Some(user()));
		assert_eq!(session.session_id.as_deref(), Some("sid"));
	}

	#[test]
	fn rehydrate_treats_malformed_fields_as_absent() {
		let (_, store) = store_with(&[
			(ACCESS_TOKEN_KEY, "access"),
			(REFRESH_TOKEN_KEY, "refresh"),
			(CURRENT_USER_KEY, "{not json"),
			(SESSION_ID_KEY, "sid"),
		]);
		let session = store.get();

		assert_eq!(session.user, None);
		assert_eq!(session.access_token, None);
		assert_eq!(session.refresh_token, None);
		assert_eq!(session.session_id.as_deref(), Some("sid"));
	}

	#[test]
	fn rehydrate_drops_unpaired_tokens() {
		let (_, store) = store_with(&[
			(ACCESS_TOKEN_KEY, "access"),
			(CURRENT_USER_KEY, r#"{"email":"ada@example.com","name":"Ada"}"#),
		]);
		let session = store.get();

		assert!(!session.is_authenticated());
		assert_eq!(session.user, Some(user()));
	}
}
