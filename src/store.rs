//! Durable key-value contract, built-in backends, and the session store layered on top.

pub mod file;
pub mod memory;
pub mod session;

pub use file::FileKv;
pub use memory::MemoryKv;
pub use session::{AccessTokenSwap, SessionStore};

// self
use crate::_prelude::*;

/// Single mutation applied through [`KvStore::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KvWrite {
	/// Stores `value` under `key`.
	Set {
		/// Storage key.
		key: &'static str,
		/// Raw string value.
		value: String,
	},
	/// Removes `key`.
	Remove {
		/// Storage key.
		key: &'static str,
	},
}

/// Flat string key-value storage that survives process restarts.
///
/// Operations are synchronous; the session store calls them while holding its own lock, so
/// implementations must not call back into the session store.
pub trait KvStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`, if any.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

	/// Removes `key`; removing an absent key succeeds.
	fn remove(&self, key: &str) -> Result<(), StoreError>;

	/// Applies a batch of writes.
	///
	/// The default applies them one by one and stops at the first failure; backends that can
	/// commit a batch atomically should override it.
	fn apply(&self, writes: &[KvWrite]) -> Result<(), StoreError> {
		for write in writes {
			match write {
				KvWrite::Set { key, value } => self.set(key, value)?,
				KvWrite::Remove { key } => self.remove(key)?,
			}
		}

		Ok(())
	}
}

/// Error type produced by [`KvStore`] implementations and the session store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// The session handed to the store violates a record invariant.
	#[error("Session rejected: {message}.")]
	InvalidSession {
		/// Violated invariant.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_broker_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unavailable".into() };
		let broker_error: Error = store_error.clone().into();

		assert!(matches!(broker_error, Error::Storage(_)));
		assert!(broker_error.to_string().contains("disk unavailable"));

		let source = StdError::source(&broker_error)
			.expect("Broker error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn default_apply_stops_at_first_failure() {
		struct FailingOnSecond(Mutex<Vec<String>>);
		impl KvStore for FailingOnSecond {
			fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
				Ok(None)
			}

			fn set(&self, key: &str, _value: &str) -> Result<(), StoreError> {
				let mut seen = self.0.lock();

				if !seen.is_empty() {
					return Err(StoreError::Backend { message: format!("refused {key}") });
				}

				seen.push(key.to_owned());

				Ok(())
			}

			fn remove(&self, key: &str) -> Result<(), StoreError> {
				self.0.lock().push(key.to_owned());

				Ok(())
			}
		}

		let kv = FailingOnSecond(Mutex::new(Vec::new()));
		let err = kv
			.apply(&[
				KvWrite::Set { key: "first", value: "1".into() },
				KvWrite::Set { key: "second", value: "2".into() },
				KvWrite::Remove { key: "third" },
			])
			.expect_err("Second write should fail.");

		assert_eq!(err, StoreError::Backend { message: "refused second".into() });
		assert_eq!(kv.0.lock().as_slice(), ["first".to_owned()]);
	}
}
