//! Expiring in-memory maps backing the credential cache and the connection registry.
//!
//! Entries carry an optional absolute expiry. Reads treat expired entries as absent
//! (passive eviction) and [`ExpiringCache::purge_expired`] drops them to bound memory, so no
//! background sweeper is needed for correctness.

pub mod credential;

pub use credential::*;

// self
use crate::_prelude::*;

/// Default lifetime applied by [`Expiration::Default`].
pub const DEFAULT_TTL: Duration = Duration::minutes(10);

/// Expiry selector used when writing an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiration {
	/// Use the cache's default TTL.
	Default,
	/// Never expire on its own.
	Never,
	/// Expire after the provided duration, measured from the write.
	After(Duration),
	/// Expire at the provided instant.
	At(OffsetDateTime),
}
impl Expiration {
	fn resolve(self, default_ttl: Duration, now: OffsetDateTime) -> Option<OffsetDateTime> {
		match self {
			Self::Default => Some(now + default_ttl),
			Self::Never => None,
			Self::After(ttl) => Some(now + ttl),
			Self::At(instant) => Some(instant),
		}
	}
}

#[derive(Clone, Debug)]
struct Entry<V> {
	value: V,
	expires_at: Option<OffsetDateTime>,
}
impl<V> Entry<V> {
	fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|at| now < at)
	}
}

/// Thread-safe map whose entries expire after a per-entry or default TTL.
#[derive(Debug)]
pub struct ExpiringCache<K, V> {
	default_ttl: Duration,
	entries: RwLock<HashMap<K, Entry<V>>>,
}
impl<K, V> ExpiringCache<K, V>
where
	K: Eq + Hash,
	V: Clone,
{
	/// Creates an empty cache applying `default_ttl` to [`Expiration::Default`] writes.
	pub fn new(default_ttl: Duration) -> Self {
		Self { default_ttl, entries: RwLock::new(HashMap::new()) }
	}

	/// Stores `value` under `key`, replacing any prior entry.
	pub fn set(&self, key: K, value: V, expiration: Expiration) {
		self.set_at(key, value, expiration, OffsetDateTime::now_utc());
	}

	/// Same as [`set`](Self::set) with an explicit clock reading.
	pub fn set_at(&self, key: K, value: V, expiration: Expiration, now: OffsetDateTime) {
		let expires_at = expiration.resolve(self.default_ttl, now);

		self.entries.write().insert(key, Entry { value, expires_at });
	}

	/// Returns the live value stored under `key`.
	pub fn get(&self, key: &K) -> Option<V> {
		self.get_at(key, OffsetDateTime::now_utc())
	}

	/// Same as [`get`](Self::get) with an explicit clock reading.
	pub fn get_at(&self, key: &K, now: OffsetDateTime) -> Option<V> {
		self.get_with_expiration_at(key, now).map(|(value, _)| value)
	}

	/// Returns the live value stored under `key` with its expiry (`None` = never expires).
	pub fn get_with_expiration(&self, key: &K) -> Option<(V, Option<OffsetDateTime>)> {
		self.get_with_expiration_at(key, OffsetDateTime::now_utc())
	}

	/// Same as [`get_with_expiration`](Self::get_with_expiration) with an explicit clock reading.
	pub fn get_with_expiration_at(
		&self,
		key: &K,
		now: OffsetDateTime,
	) -> Option<(V, Option<OffsetDateTime>)> {
		self.entries
			.read()
			.get(key)
			.filter(|entry| entry.is_live_at(now))
			.map(|entry| (entry.value.clone(), entry.expires_at))
	}

	/// Returns the live value under `key` and pushes its expiry `ttl` past `now`, or builds
	/// one with `make` and stores it with the same expiry.
	///
	/// The whole operation runs under the write lock: concurrent callers missing the same key
	/// observe exactly one invocation of `make`, and a failed `make` stores nothing.
	pub fn get_or_try_insert_sliding<E, F>(
		&self,
		key: K,
		ttl: Duration,
		now: OffsetDateTime,
		make: F,
	) -> Result<V, E>
	where
		F: FnOnce() -> Result<V, E>,
	{
		let mut entries = self.entries.write();

		if let Some(entry) = entries.get_mut(&key).filter(|entry| entry.is_live_at(now)) {
			entry.expires_at = Some(now + ttl);

			return Ok(entry.value.clone());
		}

		let value = make()?;

		entries.insert(key, Entry { value: value.clone(), expires_at: Some(now + ttl) });

		Ok(value)
	}

	/// Removes `key`, returning the previous value if it was still live.
	pub fn remove(&self, key: &K) -> Option<V> {
		let now = OffsetDateTime::now_utc();

		self.entries.write().remove(key).filter(|entry| entry.is_live_at(now)).map(|e| e.value)
	}

	/// Drops every entry.
	pub fn clear(&self) {
		self.entries.write().clear();
	}

	/// Drops entries expired at `now`, returning how many were removed.
	pub fn purge_expired_at(&self, now: OffsetDateTime) -> usize {
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|_, entry| entry.is_live_at(now));

		before - entries.len()
	}

	/// Drops entries expired by the current clock.
	pub fn purge_expired(&self) -> usize {
		self.purge_expired_at(OffsetDateTime::now_utc())
	}

	/// Number of stored entries, including expired ones not yet purged.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
impl<K, V> Default for ExpiringCache<K, V>
where
	K: Eq + Hash,
	V: Clone,
{
	fn default() -> Self {
		Self::new(DEFAULT_TTL)
	}
}
