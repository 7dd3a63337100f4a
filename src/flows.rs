//! Token lifecycle orchestration for a single connection.

pub mod authorization_code;
pub mod common;
pub mod refresh;

pub use refresh::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, StoreKey},
	cache::CredentialCache,
	config::RefreshPolicy,
	http::HttpTransport,
	oauth::TransportErrorMapper,
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Token manager specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Keeps one connection supplied with a valid access token.
///
/// The manager owns the connection's credential cache, its durable store handle, the
/// client credentials and the HTTP transport. Both exchanges (authorization code and
/// refresh) run through the same guard so that, under [`RefreshPolicy::SingleFlight`],
/// at most one exchange per connection is in flight.
pub struct TokenManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Client identity and configured grant used for every exchange.
	pub credentials: ClientCredentials,
	/// Token endpoint receiving both exchanges.
	pub token_endpoint: Url,
	/// HTTP transport used for every exchange.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Durable store holding the refresh token.
	pub store: Arc<dyn TokenStore>,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	cache: Arc<CredentialCache>,
	store_key: StoreKey,
	refresh_policy: RefreshPolicy,
	refresh_guard: Arc<AsyncMutex<()>>,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager with the default [`RefreshPolicy`].
	pub fn new(
		credentials: ClientCredentials,
		token_endpoint: Url,
		cache: Arc<CredentialCache>,
		store: Arc<dyn TokenStore>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			credentials,
			token_endpoint,
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			refresh_metrics: Default::default(),
			cache,
			store_key: StoreKey::refresh_token(),
			refresh_policy: RefreshPolicy::default(),
			refresh_guard: Default::default(),
		}
	}

	/// Replaces the refresh concurrency policy.
	pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
		self.refresh_policy = policy;

		self
	}

	/// Credential cache shared with this manager.
	pub fn cache(&self) -> &Arc<CredentialCache> {
		&self.cache
	}

	/// Key under which the refresh token is persisted.
	pub fn store_key(&self) -> &StoreKey {
		&self.store_key
	}

	/// Active refresh concurrency policy.
	pub fn refresh_policy(&self) -> RefreshPolicy {
		self.refresh_policy
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("credentials", &self.credentials)
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("refresh_policy", &self.refresh_policy)
			.finish()
	}
}
