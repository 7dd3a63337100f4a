//! Grant types a connection can be configured with.

// self
use crate::_prelude::*;

/// OAuth 2.0 grant types a connection may be configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization Code grant; the initial exchange sends `code` + `redirect_uri`.
	AuthorizationCode,
	/// Refresh Token grant, used for every access-token renewal.
	RefreshToken,
	/// Client Credentials grant; the initial exchange relies on the client secret alone.
	ClientCredentials,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
			GrantType::ClientCredentials => "client_credentials",
		}
	}

	/// Returns `true` when the initial exchange must carry an authorization code.
	pub fn requires_authorization_code(self) -> bool {
		matches!(self, GrantType::AuthorizationCode)
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
