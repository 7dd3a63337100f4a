//! File-backed [`TokenStore`] that survives process restarts.

// std
use std::{
	fs::{self, OpenOptions},
	io::{ErrorKind, Write},
};
// self
use crate::{
	_prelude::*,
	auth::StoreKey,
	store::{StoreError, StoreFuture, TokenStore},
};

#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
	value: String,
	#[serde(with = "time::serde::timestamp")]
	saved_at: OffsetDateTime,
}

/// Persists each key as `<dir>/<key>.json`, replacing files via write-then-rename.
#[derive(Clone, Debug)]
pub struct FileStore {
	dir: PathBuf,
}
impl FileStore {
	/// Opens (or creates) a store rooted at `dir`.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let dir = dir.into();

		fs::create_dir_all(&dir).map_err(|e| StoreError::Backend {
			message: format!("Failed to create store directory {}: {e}", dir.display()),
		})?;

		Ok(Self { dir })
	}

	/// Directory holding the store's files.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// File backing `key`.
	pub fn path_for(&self, key: &StoreKey) -> PathBuf {
		self.dir.join(format!("{key}.json"))
	}

	fn save_now(&self, key: &StoreKey, value: &str) -> Result<(), StoreError> {
		let path = self.path_for(key);
		let serialized = serde_json::to_vec_pretty(&StoredValue {
			value: value.to_owned(),
			saved_at: OffsetDateTime::now_utc(),
		})
		.map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize value for {key}: {e}"),
		})?;
		let tmp_path = self.dir.join(format!(".{key}.{:016x}.tmp", rand::random::<u64>()));

		{
			let mut file = Self::create_private(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &path).map_err(|e| {
			let _ = fs::remove_file(&tmp_path);

			StoreError::Backend { message: format!("Failed to replace {}: {e}", path.display()) }
		})
	}

	fn load_now(&self, key: &StoreKey) -> Result<String, StoreError> {
		let path = self.path_for(key);
		let bytes = match fs::read(&path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::not_found(key)),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", path.display()),
				}),
		};

		if bytes.is_empty() {
			return Err(StoreError::not_found(key));
		}

		let stored: StoredValue =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(stored.value)
	}

	fn remove_now(&self, key: &StoreKey) -> Result<(), StoreError> {
		let path = self.path_for(key);

		match fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StoreError::Backend {
				message: format!("Failed to remove {}: {e}", path.display()),
			}),
		}
	}

	fn create_private(path: &Path) -> std::io::Result<fs::File> {
		let mut options = OpenOptions::new();

		options.write(true).create_new(true);

		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;

			options.mode(0o600);
		}

		options.open(path)
	}
}
impl TokenStore for FileStore {
	fn save<'a>(&'a self, key: &'a StoreKey, value: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.save_now(key, value) })
	}

	fn load<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, String> {
		Box::pin(async move { self.load_now(key) })
	}

	fn remove<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.remove_now(key) })
	}
}
