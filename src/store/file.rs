//! Simple file-backed [`KvStore`] for desktop clients and CLIs.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	obs,
	store::{KvStore, KvWrite, StoreError},
};

/// Persists every entry to a JSON file after each mutation.
///
/// Loading is lenient: a snapshot that is not a JSON object opens empty, and entries whose
/// value is not a string are dropped. Both cases emit a warning instead of failing.
///
/// Writes go to a sibling `.tmp` file that is synced and renamed over the target, so a crash
/// leaves either the previous or the next snapshot on disk, never a torn one.
#[derive(Clone, Debug)]
pub struct FileKv {
	path: PathBuf,
	inner: Arc<RwLock<BTreeMap<String, String>>>,
}
impl FileKv {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Returns the backing file path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
		if !path.exists() {
			return Ok(BTreeMap::new());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(BTreeMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		let entries = match serde_json::from_slice::<BTreeMap<String, Value>>(&bytes) {
			Ok(entries) => entries,
			Err(e) => {
				obs::warn(
					"file_kv",
					format_args!("Ignoring unreadable snapshot {}: {e}", path.display()),
				);

				return Ok(BTreeMap::new());
			},
		};

		Ok(entries
			.into_iter()
			.filter_map(|(key, value)| match value {
				Value::String(value) => Some((key, value)),
				_ => {
					obs::warn(
						"file_kv",
						format_args!("Dropping non-string entry `{key}` from {}.", path.display()),
					);

					None
				},
			})
			.collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, contents: &BTreeMap<String, String>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	/// Applies `mutate` to a copy, persists the copy, and only then publishes it in memory.
	fn commit(
		&self,
		mutate: impl FnOnce(&mut BTreeMap<String, String>),
	) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();

		mutate(&mut next);

		if next == *guard {
			return Ok(());
		}

		self.persist(&next)?;

		*guard = next;

		Ok(())
	}
}
impl KvStore for FileKv {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.inner.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.commit(|map| {
			map.insert(key.to_owned(), value.to_owned());
		})
	}

	fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.commit(|map| {
			map.remove(key);
		})
	}

	fn apply(&self, writes: &[KvWrite]) -> Result<(), StoreError> {
		self.commit(|map| {
			for write in writes {
				match write {
					KvWrite::Set { key, value } => {
						map.insert((*key).to_owned(), value.clone());
					},
					KvWrite::Remove { key } => {
						map.remove(*key);
					},
				}
			}
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;

	fn temp_path(label: &str) -> PathBuf {
		let unique = format!(
			"session_broker_file_kv_{label}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[test]
	fn save_and_reload_round_trip() {
		let path = temp_path("reload");
		let store = FileKv::open(&path).expect("Failed to open file store snapshot.");

		store
			.apply(&[
				KvWrite::Set { key: "accessToken", value: "access".into() },
				KvWrite::Set { key: "refreshToken", value: "refresh".into() },
			])
			.expect("Failed to apply batch to file store.");
		store.remove("refreshToken").expect("Failed to remove key from file store.");
		drop(store);

		let reopened = FileKv::open(&path).expect("Failed to reopen file store snapshot.");

		assert_eq!(
			reopened.get("accessToken").expect("Read should succeed."),
			Some("access".to_owned())
		);
		assert_eq!(reopened.get("refreshToken").expect("Read should succeed."), None);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn unreadable_snapshot_opens_empty() {
		let path = temp_path("corrupt");

		fs::write(&path, b"{not json").expect("Failed to write corrupt snapshot fixture.");

		let store = FileKv::open(&path).expect("Unreadable snapshots should open empty.");

		assert_eq!(store.get("accessToken").expect("Read should succeed."), None);

		store.set("accessToken", "access").expect("Writes should replace the unreadable snapshot.");
		drop(store);

		let reopened = FileKv::open(&path).expect("Failed to reopen file store snapshot.");

		assert_eq!(
			reopened.get("accessToken").expect("Read should succeed."),
			Some("access".to_owned())
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn non_string_entries_are_dropped_on_load() {
		let path = temp_path("mixed");

		fs::write(
			&path,
			br#"{"accessToken":"a","refreshToken":"b","currentUser":"{\"email\":\"a@b.c\",\"name\":\"A\"}","sessionId":7,"flags":[1]}"#,
		)
		.expect("Failed to write mixed snapshot fixture.");

		let store = FileKv::open(&path).expect("Mixed snapshots should still open.");

		assert_eq!(store.get("accessToken").expect("Read should succeed."), Some("a".to_owned()));
		assert_eq!(store.get("refreshToken").expect("Read should succeed."), Some("b".to_owned()));
		assert_eq!(
			store.get("currentUser").expect("Read should succeed."),
			Some(r#"{"email":"a@b.c","name":"A"}"#.to_owned())
		);
		assert_eq!(store.get("sessionId").expect("Read should succeed."), None);
		assert_eq!(store.get("flags").expect("Read should succeed."), None);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn failed_persist_leaves_memory_untouched() {
		let dir = env::temp_dir().join(format!(
			"session_broker_file_kv_dir_{}_{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		));
		let store = FileKv::open(dir.join("kv.json")).expect("Failed to open file store.");

		store.set("sessionId", "sid-1").expect("First write should succeed.");

		// Replacing the parent directory with a file makes every later persist fail.
		fs::remove_dir_all(&dir).expect("Failed to remove store directory.");
		fs::write(&dir, b"").expect("Failed to block store directory.");

		assert!(store.set("sessionId", "sid-2").is_err());
		assert_eq!(store.get("sessionId").expect("Read should succeed."), Some("sid-1".to_owned()));

		fs::remove_file(&dir).unwrap_or_else(|e| {
			panic!("Failed to remove blocking file {}: {e}", dir.display())
		});
	}
}
