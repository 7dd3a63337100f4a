//! Proxy-level error types shared across flows, stores, and the query handler.

// self
use crate::_prelude::*;

/// Proxy-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical proxy error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token endpoint rejected or garbled an exchange.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// No refresh token is available; the authorization flow must run first.
	#[error("Refresh token not found, authorize the connection first: {reason}.")]
	Unauthorized {
		/// Why no refresh token could be obtained.
		reason: String,
	},
	/// Data endpoint returned a non-success status.
	#[error("Upstream API returned status {status}.")]
	Upstream {
		/// HTTP status code returned by the data endpoint.
		status: u16,
		/// Raw response body, forwarded to the caller for diagnostics.
		body: Vec<u8>,
	},
}
impl Error {
	/// Returns the upstream response body carried by [`Error::Upstream`], if any.
	pub fn body(&self) -> Option<&[u8]> {
		match self {
			Self::Upstream { body, .. } => Some(body),
			_ => None,
		}
	}

	/// Returns the HTTP status carried by token or data endpoint failures.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Upstream { status, .. } => Some(*status),
			Self::Auth(AuthError::TokenEndpoint { status, .. }) => Some(*status),
			Self::Auth(AuthError::TokenResponseParse { status, .. }) => Some(*status),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised by the proxy.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured or derived URL cannot be parsed.
	#[error("The {what} URL `{value}` is invalid.")]
	InvalidUrl {
		/// Which URL failed (token endpoint, API base, request).
		what: &'static str,
		/// Offending value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Connection `jsonData` is not valid JSON or has the wrong shape.
	#[error("Connection settings are malformed at `{}`: {}.", .source.path(), .source.inner())]
	InvalidConnectionSettings {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A connection field holds a value that is not a valid identifier.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// A required connection or query field is missing or empty.
	#[error("Required field `{field}` is missing or empty.")]
	MissingField {
		/// Field name as it appears in the JSON payload.
		field: &'static str,
	},
	/// Query model JSON is not valid or has the wrong shape.
	#[error("Query model is malformed at `{}`: {}.", .source.path(), .source.inner())]
	InvalidQueryModel {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Query type is not handled by the proxy.
	#[error("Query not implemented: `{query_type}`.")]
	UnsupportedQueryType {
		/// Query type supplied by the host.
		query_type: String,
	},
	/// Neither the preferred nor the fallback data directory is usable.
	#[error("Data directory {path} cannot be created.")]
	DataDirectory {
		/// Last path attempted.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Token endpoint failures. Never retried automatically.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// Token endpoint answered with a non-success status.
	#[error("Auth error, status: {status}.")]
	TokenEndpoint {
		/// HTTP status code returned by the token endpoint.
		status: u16,
		/// Raw response body, kept for diagnostics.
		body: String,
	},
	/// Token endpoint responded with JSON that lacks required fields or cannot be parsed.
	#[error(
		"Token endpoint returned malformed JSON at `{}`: {}.",
		.source.path(),
		.source.inner()
	)]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
	/// Token endpoint returned an `expires_in` that is not positive or overflows the clock.
	#[error("The expires_in value {expires_in} is out of range.")]
	InvalidExpiresIn {
		/// Value reported by the endpoint.
		expires_in: i64,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {target}: {source}.")]
	Network {
		/// Which endpoint was being called.
		target: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request exceeded the configured timeout.
	#[error("Request timed out while calling {target}.")]
	Timeout {
		/// Which endpoint was being called.
		target: &'static str,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during an upstream call.")]
	Io(#[from] std::io::Error),
	/// HTTP client failure that carries only a message.
	#[error("HTTP client error: {0}.")]
	Other(String),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		target: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { target, source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn upstream_error_exposes_status_and_body() {
		let err = Error::Upstream { status: 404, body: b"{\"error\":\"gone\"}".to_vec() };

		assert_eq!(err.status(), Some(404));
		assert_eq!(err.body(), Some(&b"{\"error\":\"gone\"}"[..]));
		assert_eq!(err.to_string(), "Upstream API returned status 404.");
	}

	#[test]
	fn unauthorized_message_asks_for_authorization() {
		let err = Error::Unauthorized { reason: "Value for key `refresh_token` not found".into() };

		assert!(
			err.to_string().starts_with("Refresh token not found, authorize the connection first")
		);
		assert!(err.body().is_none());
		assert!(err.status().is_none());
	}

	#[test]
	fn auth_error_keeps_status() {
		let err: Error = AuthError::TokenEndpoint { status: 401, body: String::new() }.into();

		assert_eq!(err.status(), Some(401));
		assert_eq!(err.to_string(), "Auth error, status: 401.");
	}
}
