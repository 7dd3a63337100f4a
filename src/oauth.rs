//! Token endpoint client shared by the authorization-code and refresh exchanges.
//!
//! Both exchanges `POST` a form-encoded body carrying `client_id`, `client_secret`,
//! `grant_type` and the flow-specific fields, and expect a JSON body with `access_token`,
//! `expires_in` (seconds) and `refresh_token`. Anything but `200 OK` is terminal for the
//! call; nothing here retries.

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpResponse,
	http::{
		Method, Request, StatusCode,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, GrantType, TokenExchange, TokenSecret},
	error::{AuthError, ConfigError, TransportError},
	http::HttpTransport,
};

/// Label used in transport errors raised while calling the token endpoint.
pub const TOKEN_ENDPOINT: &str = "the token endpoint";
/// Label used in transport errors raised while calling the data API.
pub const DATA_ENDPOINT: &str = "the data API";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Maps HTTP transport failures into proxy [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] raised while calling `target` into a proxy error.
	fn map_transport_error(&self, target: &'static str, error: HttpClientError<E>) -> Error;
}

/// Mapper that works for any transport error type; every failure becomes a
/// [`TransportError`] except request-construction problems.
#[derive(Clone, Debug, Default)]
pub struct GenericTransportErrorMapper;
impl<E> TransportErrorMapper<E> for GenericTransportErrorMapper
where
	E: 'static + Send + Sync + StdError,
{
	fn map_transport_error(&self, target: &'static str, error: HttpClientError<E>) -> Error {
		match error {
			HttpClientError::Reqwest(inner) =>
				TransportError::Network { target, source: inner }.into(),
			other => map_common_transport_error(other),
		}
	}
}

/// Default mapper for reqwest-backed transports; separates timeouts and builder failures.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		target: &'static str,
		error: HttpClientError<ReqwestError>,
	) -> Error {
		match error {
			HttpClientError::Reqwest(inner) => map_reqwest_error(target, *inner),
			other => map_common_transport_error(other),
		}
	}
}

/// Client for a single connection's token endpoint.
pub(crate) struct TokenEndpoint<'a, C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) url: &'a Url,
	pub(crate) http_client: &'a C,
	pub(crate) error_mapper: &'a M,
}
impl<C, M> TokenEndpoint<'_, C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Posts `form` and parses the token response.
	pub(crate) async fn exchange(
		&self,
		form: Vec<(&'static str, String)>,
	) -> Result<TokenExchange> {
		let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(form).finish();
		let request = Request::builder()
			.method(Method::POST)
			.uri(self.url.as_str())
			.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
			.header(ACCEPT, JSON_CONTENT_TYPE)
			.body(body.into_bytes())
			.map_err(ConfigError::from)?;
		let handle = self.http_client.handle();
		let response = handle
			.call(request)
			.await
			.map_err(|err| self.error_mapper.map_transport_error(TOKEN_ENDPOINT, err))?;

		parse_token_response(response, OffsetDateTime::now_utc())
	}
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
	access_token: String,
	expires_in: i64,
	refresh_token: String,
}

/// Form for the initial exchange. `code` and `redirect_uri` are only sent for the
/// `authorization_code` grant; other grants rely on the client credentials alone.
pub(crate) fn initial_exchange_form(
	credentials: &ClientCredentials,
	code: &str,
	redirect_uri: &str,
) -> Vec<(&'static str, String)> {
	let mut form = client_form(credentials, credentials.grant);

	if credentials.grant.requires_authorization_code() {
		form.push(("code", code.to_owned()));
		form.push(("redirect_uri", redirect_uri.trim_end_matches('/').to_owned()));
	}

	form
}

/// Form for the refresh exchange.
pub(crate) fn refresh_form(
	credentials: &ClientCredentials,
	refresh_token: &TokenSecret,
) -> Vec<(&'static str, String)> {
	let mut form = client_form(credentials, GrantType::RefreshToken);

	form.push(("refresh_token", refresh_token.expose().to_owned()));

	form
}

fn client_form(credentials: &ClientCredentials, grant: GrantType) -> Vec<(&'static str, String)> {
	vec![
		("client_id", credentials.client_id.to_string()),
		("client_secret", credentials.client_secret.expose().to_owned()),
		("grant_type", grant.as_str().to_owned()),
	]
}

fn parse_token_response(response: HttpResponse, now: OffsetDateTime) -> Result<TokenExchange> {
	let status = response.status();

	if status != StatusCode::OK {
		return Err(AuthError::TokenEndpoint {
			status: status.as_u16(),
			body: String::from_utf8_lossy(response.body()).into_owned(),
		}
		.into());
	}

	let mut de = serde_json::Deserializer::from_slice(response.body());
	let parsed: TokenEndpointResponse = serde_path_to_error::deserialize(&mut de)
		.map_err(|source| AuthError::TokenResponseParse { source, status: status.as_u16() })?;

	let invalid = AuthError::InvalidExpiresIn { expires_in: parsed.expires_in };

	if parsed.expires_in <= 0 {
		return Err(invalid.into());
	}

	TokenExchange::new(
		TokenSecret::new(parsed.access_token),
		Duration::seconds(parsed.expires_in),
		TokenSecret::new(parsed.refresh_token),
		now,
	)
	.ok_or_else(|| invalid.into())
}

fn map_common_transport_error<E>(error: HttpClientError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match error {
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransportError::Other(message).into(),
		HttpClientError::Reqwest(inner) => TransportError::Other(inner.to_string()).into(),
		_ => TransportError::Other("unrecognized HTTP client failure".into()).into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(target: &'static str, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransportError::Timeout { target }.into();
	}

	TransportError::network(target, err).into()
}
