//! Access tokens and token-endpoint exchange results.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Short-lived bearer credential with an absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
	/// Bearer value; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Instant at which the token stops being usable.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Wraps a token value with its expiry instant.
	pub fn new(secret: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self { secret: TokenSecret::new(secret), expires_at }
	}

	/// Returns `true` if the token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Renders the `Authorization` header value.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.secret.expose())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Value object returned by both the initial exchange and the refresh exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenExchange {
	/// Freshly minted access token.
	pub access_token: TokenSecret,
	/// Lifetime reported by the endpoint.
	pub expires_in: Duration,
	/// Instant at which the response was received.
	pub issued_at: OffsetDateTime,
	/// `issued_at + expires_in`.
	pub expires_at: OffsetDateTime,
	/// Refresh token reported by the endpoint (possibly rotated).
	pub refresh_token: TokenSecret,
}
impl TokenExchange {
	/// Builds an exchange result from the relative lifetime reported by the endpoint.
	///
	/// Returns `None` when `issued_at + expires_in` is not a representable instant.
	pub fn new(
		access_token: TokenSecret,
		expires_in: Duration,
		refresh_token: TokenSecret,
		issued_at: OffsetDateTime,
	) -> Option<Self> {
		let expires_at = issued_at.checked_add(expires_in)?;

		Some(Self { access_token, expires_in, issued_at, expires_at, refresh_token })
	}

	/// Returns the access token half of the exchange.
	pub fn access(&self) -> AccessToken {
		AccessToken { secret: self.access_token.clone(), expires_at: self.expires_at }
	}

	/// Returns `true` when the endpoint issued a refresh token different from `previous`.
	pub fn rotated_from(&self, previous: &TokenSecret) -> bool {
		self.refresh_token != *previous
	}
}
impl Debug for TokenExchange {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchange")
			.field("access_token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("refresh_token", &"<redacted>")
			.finish()
	}
}
