//! Durable storage contract and built-in stores for per-connection refresh tokens.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::StoreKey};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for values that must survive a process restart.
///
/// One store instance belongs to exactly one connection. Writes replace the previous value
/// atomically: a concurrent reader sees either the old or the new value, never a torn one.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists `value` under `key`, overwriting any prior value.
	fn save<'a>(&'a self, key: &'a StoreKey, value: &'a str) -> StoreFuture<'a, ()>;

	/// Returns the value saved under `key`, or [`StoreError::NotFound`].
	fn load<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, String>;

	/// Deletes the value saved under `key`; succeeds when nothing was saved.
	fn remove<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Nothing has been saved under the key.
	#[error("Value for key `{key}` not found.")]
	NotFound {
		/// Requested key.
		key: String,
	},
	/// Serialization failures (corrupt or foreign content) surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage medium.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	/// Builds a [`StoreError::NotFound`] for `key`.
	pub fn not_found(key: &StoreKey) -> Self {
		Self::NotFound { key: key.to_string() }
	}

	/// Returns `true` if the error means "no value saved".
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}
