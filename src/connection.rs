//! Connection configuration, identity hashing and the per-connection runtime bundle.

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ClientCredentials, ClientId, GrantType, TokenExchange, TokenSecret},
	cache::CredentialCache,
	config::{ProxyConfig, RefreshPolicy, parse_url},
	error::ConfigError,
	executor::ApiExecutor,
	flows::TokenManager,
	http::HttpTransport,
	oauth::TransportErrorMapper,
	store::TokenStore,
};

/// Connection configuration as supplied by the host with every request.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
	/// Owning organization.
	#[serde(default)]
	pub org_id: i64,
	/// Host-assigned connection id; stable across edits.
	#[serde(rename = "id", alias = "datasourceId", default)]
	pub datasource_id: i64,
	/// Display name.
	#[serde(default)]
	pub name: String,
	/// Connection URL as configured in the host (unused by the proxy itself).
	#[serde(default)]
	pub url: String,
	/// Raw `jsonData` document.
	#[serde(default)]
	pub json_data: String,
	/// Decrypted secure fields, e.g. `clientSecret`.
	#[serde(default)]
	pub decrypted_secure_json_data: BTreeMap<String, String>,
}
impl Debug for ConnectionSettings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConnectionSettings")
			.field("org_id", &self.org_id)
			.field("datasource_id", &self.datasource_id)
			.field("name", &self.name)
			.field("url", &self.url)
			.field("json_data", &self.json_data)
			.field("secure_fields", &self.decrypted_secure_json_data.keys().collect::<Vec<_>>())
			.finish()
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonData {
	#[serde(default)]
	auth_type: Option<GrantType>,
	#[serde(default, rename = "clientID")]
	client_id: Option<String>,
	#[serde(default)]
	api_url: Option<String>,
	#[serde(default)]
	token_url: Option<String>,
}

/// Validated view of [`ConnectionSettings`].
#[derive(Clone, Debug)]
pub struct ConnectionOptions {
	/// Grant sent with the initial exchange.
	pub grant: GrantType,
	/// OAuth client identifier.
	pub client_id: ClientId,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Data API base.
	pub api_base: Url,
	/// Token endpoint.
	pub token_endpoint: Url,
}
impl ConnectionOptions {
	/// Validates `settings`, falling back to `config` for endpoints the connection omits.
	pub fn from_settings(
		settings: &ConnectionSettings,
		config: &ProxyConfig,
	) -> Result<Self, ConfigError> {
		let raw = if settings.json_data.trim().is_empty() { "{}" } else { &settings.json_data };
		let mut de = serde_json::Deserializer::from_str(raw);
		let json_data: JsonData = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::InvalidConnectionSettings { source })?;
		let grant = json_data.auth_type.ok_or(ConfigError::MissingField { field: "authType" })?;
		let client_id = json_data
			.client_id
			.filter(|id| !id.is_empty())
			.ok_or(ConfigError::MissingField { field: "clientID" })?;
		let client_secret = settings
			.decrypted_secure_json_data
			.get("clientSecret")
			.filter(|secret| !secret.is_empty())
			.ok_or(ConfigError::MissingField { field: "clientSecret" })?;
		let api_base = match json_data.api_url.as_deref().filter(|url| !url.is_empty()) {
			Some(url) => parse_url("API base", url)?,
			None => config.api_base.clone(),
		};
		let token_endpoint = match json_data.token_url.as_deref().filter(|url| !url.is_empty()) {
			Some(url) => parse_url("token endpoint", url)?,
			None => config.token_endpoint.clone(),
		};

		Ok(Self {
			grant,
			client_id: ClientId::new(client_id)?,
			client_secret: TokenSecret::new(client_secret.as_str()),
			api_base,
			token_endpoint,
		})
	}

	/// Client credentials used by both exchanges.
	pub fn credentials(&self) -> ClientCredentials {
		ClientCredentials::new(self.grant, self.client_id.clone(), self.client_secret.expose())
	}
}

/// SHA-256 digest identifying one exact connection configuration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionIdentity([u8; 32]);
impl ConnectionIdentity {
	/// Hashes every field of `settings`; `jsonData` is normalized first so key order and
	/// whitespace do not matter.
	pub fn of(settings: &ConnectionSettings) -> Self {
		let mut hasher = Sha256::new();
		let json_data = match serde_json::from_str::<serde_json::Value>(&settings.json_data) {
			Ok(value) => {
				let mut canonical = String::new();

				write_canonical_json(&value, &mut canonical);

				canonical
			},
			Err(_) => settings.json_data.clone(),
		};

		hasher.update(settings.org_id.to_le_bytes());
		hasher.update(settings.datasource_id.to_le_bytes());

		for field in [&settings.name, &settings.url, &json_data] {
			update_prefixed(&mut hasher, field.as_bytes());
		}

		hasher.update((settings.decrypted_secure_json_data.len() as u64).to_le_bytes());

		for (key, value) in &settings.decrypted_secure_json_data {
			update_prefixed(&mut hasher, key.as_bytes());
			update_prefixed(&mut hasher, value.as_bytes());
		}

		let mut digest = [0_u8; 32];

		digest.copy_from_slice(&hasher.finalize());

		Self(digest)
	}
}
impl Debug for ConnectionIdentity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "ConnectionIdentity({self})")
	}
}
impl Display for ConnectionIdentity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		for byte in self.0 {
			write!(f, "{byte:02x}")?;
		}

		Ok(())
	}
}

// Object keys sorted, no insignificant whitespace.
fn write_canonical_json(value: &serde_json::Value, out: &mut String) {
	match value {
		serde_json::Value::Object(map) => {
			let mut entries = map.iter().collect::<Vec<_>>();

			entries.sort_by(|a, b| a.0.cmp(b.0));
			out.push('{');

			for (i, (key, value)) in entries.into_iter().enumerate() {
				if i > 0 {
					out.push(',');
				}

				out.push_str(&serde_json::Value::String(key.clone()).to_string());
				out.push(':');
				write_canonical_json(value, out);
			}

			out.push('}');
		},
		serde_json::Value::Array(items) => {
			out.push('[');

			for (i, item) in items.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}

				write_canonical_json(item, out);
			}

			out.push(']');
		},
		other => out.push_str(&other.to_string()),
	}
}

fn update_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
	hasher.update((bytes.len() as u64).to_le_bytes());
	hasher.update(bytes);
}

/// Runtime state for one connection: token manager, executor and their shared cache.
pub struct Connection<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	identity: ConnectionIdentity,
	options: ConnectionOptions,
	manager: Arc<TokenManager<C, M>>,
	executor: ApiExecutor<C, M>,
}
impl<C, M> Connection<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Wires a connection from validated options and its dependencies.
	pub fn new(
		identity: ConnectionIdentity,
		options: ConnectionOptions,
		cache: Arc<CredentialCache>,
		store: Arc<dyn TokenStore>,
		http_client: Arc<C>,
		mapper: Arc<M>,
		refresh_policy: RefreshPolicy,
	) -> Self {
		let manager = Arc::new(
			TokenManager::new(
				options.credentials(),
				options.token_endpoint.clone(),
				cache,
				store,
				http_client,
				mapper,
			)
			.with_refresh_policy(refresh_policy),
		);
		let executor = ApiExecutor::new(manager.clone(), options.api_base.clone());

		Self { identity, options, manager, executor }
	}

	/// Identity this connection was created for.
	pub fn identity(&self) -> ConnectionIdentity {
		self.identity
	}

	/// Validated options.
	pub fn options(&self) -> &ConnectionOptions {
		&self.options
	}

	/// Token manager.
	pub fn manager(&self) -> &Arc<TokenManager<C, M>> {
		&self.manager
	}

	/// See [`TokenManager::get_access_token`].
	pub async fn get_access_token(&self) -> Result<AccessToken> {
		self.manager.get_access_token().await
	}

	/// See [`TokenManager::exchange_authorization_code`].
	pub async fn exchange_authorization_code(
		&self,
		code: &str,
		redirect_uri: &str,
	) -> Result<TokenExchange> {
		self.manager.exchange_authorization_code(code, redirect_uri).await
	}

	/// See [`ApiExecutor::get`].
	pub async fn get(&self, endpoint: &str, params: &BTreeMap<String, String>) -> Result<Vec<u8>> {
		self.executor.get(endpoint, params).await
	}
}
impl<C, M> Debug for Connection<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Connection")
			.field("identity", &self.identity)
			.field("options", &self.options)
			.finish()
	}
}
