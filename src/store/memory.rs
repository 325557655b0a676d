//! Thread-safe in-memory [`KvStore`] for tests, demos, and processes without durable storage.

// self
use crate::{
	_prelude::*,
	store::{KvStore, KvWrite, StoreError},
};

/// In-process key-value backend; `apply` commits a batch under one lock.
#[derive(Clone, Debug, Default)]
pub struct MemoryKv(Arc<RwLock<HashMap<String, String>>>);
impl MemoryKv {
	/// Returns a copy of every stored entry.
	pub fn snapshot(&self) -> BTreeMap<String, String> {
		self.0.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
	}
}
impl KvStore for MemoryKv {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.0.write().insert(key.to_owned(), value.to_owned());

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.0.write().remove(key);

		Ok(())
	}

	fn apply(&self, writes: &[KvWrite]) -> Result<(), StoreError> {
		let mut guard = self.0.write();

		for write in writes {
			match write {
				KvWrite::Set { key, value } => {
					guard.insert((*key).to_owned(), value.clone());
				},
				KvWrite::Remove { key } => {
					guard.remove(*key);
				},
			}
		}

		Ok(())
	}
}
