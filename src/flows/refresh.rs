//! Access token retrieval with cache fast path, durable refresh token fallback and rotation.

mod metrics;

pub use self::metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenSecret},
	flows::TokenManager,
	http::HttpTransport,
	oauth::{self, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> TokenManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a non-expired access token, refreshing it when needed.
	///
	/// A cached token is returned without any I/O. Otherwise the refresh token is taken
	/// from the cache or, failing that, from the durable store; when neither has one the
	/// call fails with [`Error::Unauthorized`] before touching the network. A rotated
	/// refresh token replaces the cached and persisted value; an unchanged one leaves the
	/// store untouched.
	pub async fn get_access_token(&self) -> Result<AccessToken> {
		const KIND: FlowKind = FlowKind::Refresh;

		if let Some(token) = self.cache().access_token() {
			self.refresh_metrics.record_cache_hit();

			return Ok(token);
		}

		let span = FlowSpan::new(KIND, "get_access_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.refresh_access_token()).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	async fn refresh_access_token(&self) -> Result<AccessToken> {
		let _guard = self.exchange_guard().await;

		// Another caller may have refreshed while this one waited on the guard.
		if let Some(token) = self.cache().access_token() {
			self.refresh_metrics.record_cache_hit();

			return Ok(token);
		}

		let refresh_token = self.load_refresh_token().await?;

		self.refresh_metrics.record_attempt();

		let form = oauth::refresh_form(&self.credentials, &refresh_token);
		let exchange = self.token_endpoint_client().exchange(form).await.inspect_err(|_| {
			self.refresh_metrics.record_failure();
		})?;

		self.cache().store_access_token(&exchange.access());

		if exchange.rotated_from(&refresh_token) {
			tracing::debug!("Refresh token rotated.");

			self.cache().store_refresh_token(exchange.refresh_token.clone());
			self.persist_refresh_token(&exchange).await.inspect_err(|_| {
				self.refresh_metrics.record_failure();
			})?;
		}

		self.refresh_metrics.record_success();

		Ok(exchange.access())
	}

	async fn load_refresh_token(&self) -> Result<TokenSecret> {
		if let Some(token) = self.cache().refresh_token() {
			return Ok(token);
		}

		tracing::debug!("Refresh token not cached, loading it from the store.");

		match self.store.load(self.store_key()).await {
			Ok(value) if !value.is_empty() => {
				let token = TokenSecret::new(value);

				self.cache().store_refresh_token(token.clone());

				Ok(token)
			},
			Ok(_) =>
				Err(Error::Unauthorized { reason: "the stored refresh token is empty".into() }),
			Err(err) => {
				tracing::debug!(error = %err, "No usable refresh token in the store.");

				let reason = err.to_string().trim_end_matches('.').to_owned();

				Err(Error::Unauthorized { reason })
			},
		}
	}
}
