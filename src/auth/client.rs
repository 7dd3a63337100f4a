//! Client registration sent with every token-endpoint exchange.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, GrantType, TokenSecret},
};

/// OAuth client registration used for every token-endpoint call of one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
	/// Grant type sent by the initial exchange.
	pub grant: GrantType,
	/// Client identifier.
	pub client_id: ClientId,
	/// Client secret; sent in the form body, never logged.
	pub client_secret: TokenSecret,
}
impl ClientCredentials {
	/// Bundles a grant type with the client's id and secret.
	pub fn new(grant: GrantType, client_id: ClientId, client_secret: impl Into<String>) -> Self {
		Self { grant, client_id, client_secret: TokenSecret::new(client_secret) }
	}
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("grant", &self.grant)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &!self.client_secret.is_empty())
			.finish()
	}
}
