//! Host request/response envelope and the query dispatcher.
//!
//! Each query's `modelJson` names a `queryType`: the authorization type exchanges a code
//! for tokens, the API type forwards an authenticated GET and returns the raw body in
//! `metaJson`. Every failure is reported in the query's own `error` field; one bad query
//! never fails its siblings.

// self
use crate::{
	_prelude::*,
	auth::GrantType,
	cache::CredentialCache,
	config::ProxyConfig,
	connection::{Connection, ConnectionIdentity, ConnectionOptions, ConnectionSettings},
	error::ConfigError,
	http::HttpTransport,
	oauth::TransportErrorMapper,
	registry::ConnectionRegistry,
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper, store::FileStore};

/// Message returned in `metaJson` after a successful authorization exchange.
pub const AUTH_SUCCESS_MESSAGE: &str =
	"Authorization code successfully exchanged for refresh token";

/// Builds the durable store for a connection.
pub type StoreFactory =
	Arc<dyn Fn(&ConnectionSettings) -> Result<Arc<dyn TokenStore>> + Send + Sync>;
/// Builds the HTTP transport for a connection.
pub type TransportFactory<C> = Arc<dyn Fn(&ConnectionOptions) -> Result<Arc<C>> + Send + Sync>;

/// Proxy service specialized for reqwest and file-backed stores.
#[cfg(feature = "reqwest")]
pub type ReqwestProxyService = ProxyService<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Request sent by the host: one connection plus the queries to run against it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceRequest {
	/// Connection the queries target.
	pub datasource: ConnectionSettings,
	/// Queries in host order.
	#[serde(default)]
	pub queries: Vec<Query>,
}

/// A single host query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
	/// Host-assigned id echoed back in the result.
	pub ref_id: String,
	/// Raw query model.
	#[serde(default)]
	pub model_json: String,
}

/// Response returned to the host; one result per query, in request order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceResponse {
	/// Per-query results.
	pub results: Vec<QueryResult>,
}

/// Outcome of one query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
	/// Id of the query this result answers.
	pub ref_id: String,
	/// Raw upstream body or status message.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub meta_json: Option<String>,
	/// Error message when the query failed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl QueryResult {
	/// Successful result carrying `meta_json`.
	pub fn success(ref_id: impl Into<String>, meta_json: impl Into<String>) -> Self {
		Self { ref_id: ref_id.into(), meta_json: Some(meta_json.into()), error: None }
	}

	/// Failed result; an upstream body, if any, is forwarded in `meta_json`.
	pub fn failure(ref_id: impl Into<String>, error: &Error) -> Self {
		Self {
			ref_id: ref_id.into(),
			meta_json: error.body().map(|body| String::from_utf8_lossy(body).into_owned()),
			error: Some(error.to_string()),
		}
	}

	/// Returns `true` when the query failed.
	pub fn is_error(&self) -> bool {
		self.error.is_some()
	}
}

/// Typed view of a query's `modelJson`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryModel {
	/// Exchange an authorization code.
	Auth {
		/// Redirect URI the code was issued for.
		redirect_uri: String,
		/// Authorization code.
		auth_code: String,
	},
	/// Forward an authenticated GET.
	Api {
		/// Path below the API base.
		endpoint: String,
		/// Query parameters, already flattened to strings.
		params: BTreeMap<String, String>,
	},
}
impl QueryModel {
	/// Parses `model_json`, dispatching on its `queryType` (`query` when absent).
	pub fn parse(model_json: &str) -> Result<Self, ConfigError> {
		let raw = if model_json.trim().is_empty() { "{}" } else { model_json };
		let kind: QueryTypeOnly = parse_model(raw)?;
		let query_type = kind.query_type.unwrap_or_else(|| "query".into());

		match query_type.as_str() {
			"airthingsAuth" | "auth" => {
				let model: AuthModel = parse_model(raw)?;

				Ok(Self::Auth {
					redirect_uri: model.target.params.redirect_uri,
					auth_code: model.target.params.auth_code,
				})
			},
			"airthingsApi" | "api" => {
				let model: ApiModel = parse_model(raw)?;

				if model.target.endpoint.is_empty() {
					return Err(ConfigError::MissingField { field: "target.endpoint" });
				}

				Ok(Self::Api {
					endpoint: model.target.endpoint,
					params: model
						.target
						.params
						.into_iter()
						.map(|(key, value)| (key, flatten_param(value)))
						.collect(),
				})
			},
			_ => Err(ConfigError::UnsupportedQueryType { query_type }),
		}
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryTypeOnly {
	#[serde(default)]
	query_type: Option<String>,
}

#[derive(Deserialize)]
struct AuthModel {
	#[serde(default)]
	target: AuthTarget,
}

#[derive(Default, Deserialize)]
struct AuthTarget {
	#[serde(default)]
	params: AuthParams,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthParams {
	#[serde(default)]
	redirect_uri: String,
	#[serde(default)]
	auth_code: String,
}

#[derive(Deserialize)]
struct ApiModel {
	#[serde(default)]
	target: ApiTarget,
}

#[derive(Default, Deserialize)]
struct ApiTarget {
	#[serde(default)]
	endpoint: String,
	#[serde(default)]
	params: BTreeMap<String, serde_json::Value>,
}

fn parse_model<T>(raw: &str) -> Result<T, ConfigError>
where
	T: for<'de> Deserialize<'de>,
{
	let mut de = serde_json::Deserializer::from_str(raw);

	serde_path_to_error::deserialize(&mut de)
		.map_err(|source| ConfigError::InvalidQueryModel { source })
}

// Strings pass through verbatim; everything else uses its JSON rendering.
fn flatten_param(value: serde_json::Value) -> String {
	match value {
		serde_json::Value::String(s) => s,
		other => other.to_string(),
	}
}

/// Entry point for host requests: resolves connections and runs their queries.
pub struct ProxyService<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: ProxyConfig,
	registry: ConnectionRegistry<C, M>,
	transport_factory: TransportFactory<C>,
	error_mapper: Arc<M>,
	store_factory: StoreFactory,
}
impl<C, M> ProxyService<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Assembles a service from explicit factories.
	pub fn with_parts(
		config: ProxyConfig,
		transport_factory: TransportFactory<C>,
		error_mapper: impl Into<Arc<M>>,
		store_factory: StoreFactory,
	) -> Self {
		Self {
			registry: ConnectionRegistry::new(config.connection_idle_timeout),
			config,
			transport_factory,
			error_mapper: error_mapper.into(),
			store_factory,
		}
	}

	/// Process configuration.
	pub fn config(&self) -> &ProxyConfig {
		&self.config
	}

	/// Live connections.
	pub fn registry(&self) -> &ConnectionRegistry<C, M> {
		&self.registry
	}

	/// Returns the live connection for `settings`, creating it on first use.
	pub fn connection(&self, settings: &ConnectionSettings) -> Result<Arc<Connection<C, M>>> {
		let identity = ConnectionIdentity::of(settings);

		self.registry.get_or_create(identity, || {
			let options = ConnectionOptions::from_settings(settings, &self.config)?;
			let store = (self.store_factory)(settings)?;
			let http_client = (self.transport_factory)(&options)?;

			tracing::debug!(
				org_id = settings.org_id,
				datasource_id = settings.datasource_id,
				name = %settings.name,
				%identity,
				"Creating connection."
			);

			Ok(Connection::new(
				identity,
				options,
				Arc::new(CredentialCache::new(self.config.credential_ttl)),
				store,
				http_client,
				self.error_mapper.clone(),
				self.config.refresh_policy,
			))
		})
	}

	/// Runs every query of `request` and returns one result per query, in order.
	pub async fn handle(&self, request: &DatasourceRequest) -> DatasourceResponse {
		let connection = match self.connection(&request.datasource) {
			Ok(connection) => connection,
			Err(err) => {
				tracing::debug!(error = %err, "Connection could not be created.");

				return DatasourceResponse {
					results: request
						.queries
						.iter()
						.map(|query| QueryResult::failure(&query.ref_id, &err))
						.collect(),
				};
			},
		};
		let mut results = Vec::with_capacity(request.queries.len());

		for query in &request.queries {
			results.push(self.run_query(&connection, query).await);
		}

		DatasourceResponse { results }
	}

	async fn run_query(&self, connection: &Connection<C, M>, query: &Query) -> QueryResult {
		let outcome = match QueryModel::parse(&query.model_json) {
			Ok(QueryModel::Auth { redirect_uri, auth_code }) =>
				Self::authorize(connection, &auth_code, &redirect_uri).await,
			Ok(QueryModel::Api { endpoint, params }) => connection
				.get(&endpoint, &params)
				.await
				.map(|body| String::from_utf8_lossy(&body).into_owned()),
			Err(err) => Err(err.into()),
		};

		match outcome {
			Ok(meta_json) => QueryResult::success(&query.ref_id, meta_json),
			Err(err) => QueryResult::failure(&query.ref_id, &err),
		}
	}

	async fn authorize(
		connection: &Connection<C, M>,
		auth_code: &str,
		redirect_uri: &str,
	) -> Result<String> {
		if connection.options().grant == GrantType::AuthorizationCode && auth_code.is_empty() {
			return Err(ConfigError::MissingField { field: "target.params.authCode" }.into());
		}

		connection.exchange_authorization_code(auth_code, redirect_uri).await?;

		Ok(serde_json::json!({ "message": AUTH_SUCCESS_MESSAGE }).to_string())
	}
}
#[cfg(feature = "reqwest")]
impl ProxyService<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds the default service: one reqwest client per connection honoring
	/// [`ProxyConfig::http`] and a [`FileStore`] under
	/// `<data_dir>/org-<org_id>/ds-<datasource_id>/`.
	pub fn new(config: ProxyConfig) -> Self {
		let http = config.http.clone();
		let data_config = config.clone();
		let transport_factory: TransportFactory<ReqwestHttpClient> =
			Arc::new(move |_: &ConnectionOptions| {
				Ok(Arc::new(ReqwestHttpClient::from_settings(&http)?))
			});
		let store_factory: StoreFactory = Arc::new(move |settings: &ConnectionSettings| {
			let dir = data_config.connection_dir(settings.org_id, settings.datasource_id);
			let store: Arc<dyn TokenStore> = Arc::new(FileStore::open(dir)?);

			Ok(store)
		});

		Self::with_parts(config, transport_factory, ReqwestTransportErrorMapper, store_factory)
	}
}
impl<C, M> Debug for ProxyService<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProxyService")
			.field("config", &self.config)
			.field("registry", &self.registry)
			.finish()
	}
}
