//! Typed per-connection credential cache.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenExchange, TokenSecret},
	cache::{DEFAULT_TTL, Expiration, ExpiringCache},
};

/// Slots held by a [`CredentialCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialSlot {
	/// Current access token; expires with the lifetime reported by the token endpoint.
	AccessToken,
	/// Current refresh token; never expires on its own.
	RefreshToken,
}

/// Fast-path cache for one connection's access and refresh tokens.
///
/// The durable store stays the source of truth for the refresh token; this cache only
/// spares a storage read on every query.
#[derive(Debug)]
pub struct CredentialCache(ExpiringCache<CredentialSlot, TokenSecret>);
impl CredentialCache {
	/// Creates an empty cache whose default TTL is `default_ttl`.
	pub fn new(default_ttl: Duration) -> Self {
		Self(ExpiringCache::new(default_ttl))
	}

	/// Returns the cached access token if it has not expired.
	pub fn access_token(&self) -> Option<AccessToken> {
		self.access_token_at(OffsetDateTime::now_utc())
	}

	/// Same as [`access_token`](Self::access_token) with an explicit clock reading.
	pub fn access_token_at(&self, now: OffsetDateTime) -> Option<AccessToken> {
		match self.0.get_with_expiration_at(&CredentialSlot::AccessToken, now)? {
			(secret, Some(expires_at)) => Some(AccessToken { secret, expires_at }),
			// Access tokens are always written with an expiry.
			(_, None) => None,
		}
	}

	/// Caches an access token until `expires_at`.
	pub fn store_access_token(&self, token: &AccessToken) {
		self.0.set(
			CredentialSlot::AccessToken,
			token.secret.clone(),
			Expiration::At(token.expires_at),
		);
	}

	/// Returns the cached refresh token.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.0.get(&CredentialSlot::RefreshToken)
	}

	/// Caches a refresh token without expiry.
	pub fn store_refresh_token(&self, token: TokenSecret) {
		self.0.set(CredentialSlot::RefreshToken, token, Expiration::Never);
	}

	/// Caches both halves of an exchange result.
	pub fn store_exchange(&self, exchange: &TokenExchange) {
		self.store_access_token(&exchange.access());
		self.store_refresh_token(exchange.refresh_token.clone());
	}

	/// Drops both tokens, e.g. to simulate a process restart.
	pub fn clear(&self) {
		self.0.clear();
	}
}
impl Default for CredentialCache {
	fn default() -> Self {
		Self::new(DEFAULT_TTL)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn access_token_is_hidden_once_expired() {
		let cache = CredentialCache::default();
		let expires_at = macros::datetime!(2025-06-01 12:10 UTC);

		cache.store_access_token(&AccessToken::new("A1", expires_at));

		let live = cache
			.access_token_at(macros::datetime!(2025-06-01 12:09 UTC))
			.expect("Access token should be served before its expiry.");

		assert_eq!(live.secret.expose(), "A1");
		assert_eq!(live.expires_at, expires_at);
		assert!(cache.access_token_at(expires_at).is_none());
	}

	#[test]
	fn refresh_token_never_expires() {
		let cache = CredentialCache::new(Duration::seconds(1));

		cache.store_refresh_token(TokenSecret::new("R1"));

		assert_eq!(cache.refresh_token(), Some(TokenSecret::new("R1")));
	}

	#[test]
	fn exchange_seeds_both_slots_and_clear_drops_them() {
		let cache = CredentialCache::default();
		let exchange = TokenExchange::new(
			TokenSecret::new("A2"),
			Duration::seconds(600),
			TokenSecret::new("R2"),
			OffsetDateTime::now_utc(),
		)
		.expect("Ten minutes from now is representable.");

		cache.store_exchange(&exchange);

		assert_eq!(cache.access_token().map(|token| token.secret), Some(TokenSecret::new("A2")));
		assert_eq!(cache.refresh_token(), Some(TokenSecret::new("R2")));

		cache.clear();

		assert!(cache.access_token().is_none());
		assert!(cache.refresh_token().is_none());
	}
}
