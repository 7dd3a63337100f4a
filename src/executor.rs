//! Authenticated GET requests against the upstream data API.

// crates.io
use oauth2::{
	AsyncHttpClient,
	http::{
		Method, Request, StatusCode,
		header::{ACCEPT, AUTHORIZATION},
	},
};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	flows::TokenManager,
	http::HttpTransport,
	oauth::{DATA_ENDPOINT, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Issues bearer-authenticated requests for one connection.
///
/// The response body is returned untouched; interpreting it is the caller's business.
pub struct ApiExecutor<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	manager: Arc<TokenManager<C, M>>,
	api_base: Url,
}
impl<C, M> ApiExecutor<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an executor sharing `manager`'s transport and credentials.
	pub fn new(manager: Arc<TokenManager<C, M>>, api_base: Url) -> Self {
		Self { manager, api_base }
	}

	/// Token manager supplying access tokens.
	pub fn manager(&self) -> &Arc<TokenManager<C, M>> {
		&self.manager
	}

	/// Builds `<api_base>/<endpoint>?<params>`, parameters encoded in key order.
	pub fn request_url(&self, endpoint: &str, params: &BTreeMap<String, String>) -> Result<Url> {
		let raw = format!(
			"{}/{}",
			self.api_base.as_str().trim_end_matches('/'),
			endpoint.trim_start_matches('/')
		);
		let mut url = Url::parse(&raw)
			.map_err(|source| ConfigError::InvalidUrl { what: "request", value: raw, source })?;

		if !params.is_empty() {
			url.query_pairs_mut().extend_pairs(params);
		}

		Ok(url)
	}

	/// Sends `GET <api_base>/<endpoint>?<params>` with a valid bearer token.
	///
	/// A non-200 answer becomes [`Error::Upstream`] carrying the raw body. Dropping the
	/// returned future aborts the request.
	pub async fn get(&self, endpoint: &str, params: &BTreeMap<String, String>) -> Result<Vec<u8>> {
		const KIND: FlowKind = FlowKind::DataQuery;

		let span = FlowSpan::new(KIND, "get");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let token = self.manager.get_access_token().await?;
				let url = self.request_url(endpoint, params)?;

				tracing::debug!(url = %url, "Sending upstream query.");

				let request = Request::builder()
					.method(Method::GET)
					.uri(url.as_str())
					.header(AUTHORIZATION, token.bearer())
					.header(ACCEPT, "application/json")
					.body(Vec::new())
					.map_err(ConfigError::from)?;
				let handle = self.manager.http_client.handle();
				let response = handle.call(request).await.map_err(|err| {
					self.manager.transport_mapper.map_transport_error(DATA_ENDPOINT, err)
				})?;
				let status = response.status();

				if status != StatusCode::OK {
					tracing::debug!(status = status.as_u16(), "Upstream query failed.");

					return Err(Error::Upstream {
						status: status.as_u16(),
						body: response.into_body(),
					});
				}

				Ok(response.into_body())
			})
			.await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}
}
impl<C, M> Debug for ApiExecutor<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiExecutor").field("api_base", &self.api_base.as_str()).finish()
	}
}
