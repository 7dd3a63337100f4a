//! Helpers shared by both exchanges.

// crates.io
use async_lock::MutexGuard;
// self
use crate::{
	_prelude::*,
	auth::TokenExchange,
	config::RefreshPolicy,
	flows::TokenManager,
	http::HttpTransport,
	oauth::{TokenEndpoint, TransportErrorMapper},
};

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Token endpoint client bound to this manager's transport.
	pub(crate) fn token_endpoint_client(&self) -> TokenEndpoint<'_, C, M> {
		TokenEndpoint {
			url: &self.token_endpoint,
			http_client: &*self.http_client,
			error_mapper: &*self.transport_mapper,
		}
	}

	/// Acquires the exchange guard; `None` under [`RefreshPolicy::Unguarded`].
	pub(crate) async fn exchange_guard(&self) -> Option<MutexGuard<'_, ()>> {
		match self.refresh_policy() {
			RefreshPolicy::SingleFlight => Some(self.refresh_guard.lock().await),
			RefreshPolicy::Unguarded => None,
		}
	}

	/// Persists the refresh token of `exchange`. The cache has already been updated and is
	/// not rolled back when the write fails.
	pub(crate) async fn persist_refresh_token(&self, exchange: &TokenExchange) -> Result<()> {
		self.store.save(self.store_key(), exchange.refresh_token.expose()).await.map_err(|err| {
			tracing::warn!(error = %err, "Failed to persist refresh token.");

			Error::from(err)
		})
	}
}
