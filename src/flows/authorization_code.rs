//! Initial exchange turning an authorization code into an access/refresh token pair.

// self
use crate::{
	_prelude::*,
	auth::TokenExchange,
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
	/// Exchanges `code` for tokens and seeds both the credential cache and the durable store.
	///
	/// The form carries `client_id`, `client_secret` and the configured grant. For the
	/// `authorization_code` grant it also carries `code` and `redirect_uri`, the latter with
	/// any trailing `/` removed. The refresh token is always persisted, rotated or not.
	pub async fn exchange_authorization_code(
		&self,
		code: &str,
		redirect_uri: &str,
	) -> Result<TokenExchange> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "exchange_authorization_code");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let _guard = self.exchange_guard().await;
				let form = oauth::initial_exchange_form(&self.credentials, code, redirect_uri);
				let exchange = self.token_endpoint_client().exchange(form).await?;

				self.cache().store_exchange(&exchange);
				self.persist_refresh_token(&exchange).await?;

				tracing::debug!(expires_at = %exchange.expires_at, "Authorization code exchanged.");

				Ok(exchange)
			})
			.await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}
}
