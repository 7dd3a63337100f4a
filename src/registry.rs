//! Lazily populated cache of live connections keyed by [`ConnectionIdentity`].

// self
use crate::{
	_prelude::*,
	cache::ExpiringCache,
	config::DEFAULT_CONNECTION_IDLE_TIMEOUT,
	connection::{Connection, ConnectionIdentity},
	http::HttpTransport,
	oauth::TransportErrorMapper,
};

/// Owns every live [`Connection`] and evicts those idle for longer than the timeout.
///
/// Any change to a connection's configuration changes its identity, so an edited
/// connection gets a fresh instance and the stale one ages out.
pub struct ConnectionRegistry<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	entries: ExpiringCache<ConnectionIdentity, Arc<Connection<C, M>>>,
	idle_timeout: Duration,
}
impl<C, M> ConnectionRegistry<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an empty registry whose entries expire after `idle_timeout` without use.
	pub fn new(idle_timeout: Duration) -> Self {
		Self { entries: ExpiringCache::new(idle_timeout), idle_timeout }
	}

	/// Returns the connection for `identity`, building it with `factory` on a miss.
	///
	/// A hit pushes the entry's expiry forward. A miss first purges expired entries and then
	/// runs `factory` while holding the registry lock, so concurrent misses for the same
	/// identity build exactly one connection. A failing factory caches nothing.
	pub fn get_or_create<F>(
		&self,
		identity: ConnectionIdentity,
		factory: F,
	) -> Result<Arc<Connection<C, M>>>
	where
		F: FnOnce() -> Result<Connection<C, M>>,
	{
		self.get_or_create_at(identity, OffsetDateTime::now_utc(), factory)
	}

	/// Same as [`get_or_create`](Self::get_or_create) with an explicit clock reading.
	pub fn get_or_create_at<F>(
		&self,
		identity: ConnectionIdentity,
		now: OffsetDateTime,
		factory: F,
	) -> Result<Arc<Connection<C, M>>>
	where
		F: FnOnce() -> Result<Connection<C, M>>,
	{
		if self.entries.get_at(&identity, now).is_none() {
			let purged = self.entries.purge_expired_at(now);

			tracing::debug!(%identity, purged, "Connection registry miss.");
		}

		self.entries.get_or_try_insert_sliding(identity, self.idle_timeout, now, || {
			factory().map(Arc::new)
		})
	}

	/// Returns the live connection for `identity` without creating or touching it.
	pub fn get(&self, identity: &ConnectionIdentity) -> Option<Arc<Connection<C, M>>> {
		self.entries.get(identity)
	}

	/// Evicts every expired connection and returns how many were dropped.
	pub fn purge_expired(&self) -> usize {
		self.entries.purge_expired()
	}

	/// Same as [`purge_expired`](Self::purge_expired) with an explicit clock reading.
	pub fn purge_expired_at(&self, now: OffsetDateTime) -> usize {
		self.entries.purge_expired_at(now)
	}

	/// Number of stored connections, expired ones included until purged.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns `true` when no connection is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
impl<C, M> Default for ConnectionRegistry<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn default() -> Self {
		Self::new(DEFAULT_CONNECTION_IDLE_TIMEOUT)
	}
}
impl<C, M> Debug for ConnectionRegistry<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConnectionRegistry")
			.field("len", &self.entries.len())
			.field("idle_timeout", &self.idle_timeout)
			.finish()
	}
}
