//! Process-level configuration: data directory, default endpoints, timeouts and TTLs.

// std
use std::{env, fs, time::Duration as StdDuration};
// self
use crate::{_prelude::*, error::ConfigError};

/// Environment variable naming the directory that holds durable refresh tokens.
pub const DATA_PATH_ENV: &str = "SENSOR_PROXY_DATA_PATH";
/// Default data API base.
pub const DEFAULT_API_BASE: &str = "https://ext-api.airthings.com/v1";
/// Default token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://accounts-api.airthings.com/v1/token";
/// Default idle time after which a registry entry is evicted.
pub const DEFAULT_CONNECTION_IDLE_TIMEOUT: Duration = Duration::minutes(10);

/// Concurrency policy for refreshing an expired access token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
	/// Concurrent callers observing an expired token share one upstream exchange.
	#[default]
	SingleFlight,
	/// Every caller that observes an expired token performs its own exchange.
	Unguarded,
}

/// Timeouts applied to every outbound HTTP call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpSettings {
	/// Overall request timeout, body included.
	pub timeout: StdDuration,
	/// TCP + TLS connect timeout.
	pub connect_timeout: StdDuration,
	/// How long idle pooled connections are kept.
	pub pool_idle_timeout: StdDuration,
}
impl Default for HttpSettings {
	fn default() -> Self {
		Self {
			timeout: StdDuration::from_secs(30),
			connect_timeout: StdDuration::from_secs(30),
			pool_idle_timeout: StdDuration::from_secs(90),
		}
	}
}

/// Configuration shared by every connection served by a
/// [`ProxyService`](crate::query::ProxyService).
#[derive(Clone, Debug)]
pub struct ProxyConfig {
	/// Root directory for per-connection durable storage.
	pub data_dir: PathBuf,
	/// Data API base used when a connection does not set `apiUrl`.
	pub api_base: Url,
	/// Token endpoint used when a connection does not set `tokenUrl`.
	pub token_endpoint: Url,
	/// Outbound HTTP timeouts.
	pub http: HttpSettings,
	/// Default TTL of each connection's credential cache.
	pub credential_ttl: Duration,
	/// Sliding idle expiry of registry entries.
	pub connection_idle_timeout: Duration,
	/// Refresh concurrency policy.
	pub refresh_policy: RefreshPolicy,
}
impl ProxyConfig {
	/// Creates a configuration rooted at `data_dir` with the default endpoints and timeouts.
	pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
		Ok(Self {
			data_dir: data_dir.into(),
			api_base: parse_url("API base", DEFAULT_API_BASE)?,
			token_endpoint: parse_url("token endpoint", DEFAULT_TOKEN_ENDPOINT)?,
			http: HttpSettings::default(),
			credential_ttl: crate::cache::DEFAULT_TTL,
			connection_idle_timeout: DEFAULT_CONNECTION_IDLE_TIMEOUT,
			refresh_policy: RefreshPolicy::default(),
		})
	}

	/// Resolves the data directory from [`DATA_PATH_ENV`] and builds the configuration.
	///
	/// Falls back to the directory of the running executable; failing both is fatal.
	pub fn from_env() -> Result<Self, ConfigError> {
		let preferred = env::var_os(DATA_PATH_ENV).filter(|v| !v.is_empty()).map(PathBuf::from);
		let fallback = env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf));

		Self::new(resolve_data_dir(preferred, fallback)?)
	}

	/// Overrides the default data API base.
	pub fn with_api_base(mut self, api_base: Url) -> Self {
		self.api_base = api_base;

		self
	}

	/// Overrides the default token endpoint.
	pub fn with_token_endpoint(mut self, token_endpoint: Url) -> Self {
		self.token_endpoint = token_endpoint;

		self
	}

	/// Overrides the HTTP timeouts.
	pub fn with_http(mut self, http: HttpSettings) -> Self {
		self.http = http;

		self
	}

	/// Overrides the credential cache TTL.
	pub fn with_credential_ttl(mut self, ttl: Duration) -> Self {
		self.credential_ttl = ttl;

		self
	}

	/// Overrides the registry idle timeout.
	pub fn with_connection_idle_timeout(mut self, timeout: Duration) -> Self {
		self.connection_idle_timeout = timeout;

		self
	}

	/// Overrides the refresh policy.
	pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
		self.refresh_policy = policy;

		self
	}

	/// Storage directory for one connection; depends only on the stable host identifiers.
	pub fn connection_dir(&self, org_id: i64, datasource_id: i64) -> PathBuf {
		self.data_dir.join(format!("org-{org_id}")).join(format!("ds-{datasource_id}"))
	}
}

/// Picks the first of `preferred` and `fallback` that exists or can be created.
pub fn resolve_data_dir(
	preferred: Option<PathBuf>,
	fallback: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
	let mut last = None;

	for candidate in [preferred, fallback].into_iter().flatten() {
		match fs::create_dir_all(&candidate) {
			Ok(()) => return Ok(candidate),
			Err(source) => {
				tracing::warn!(
					path = %candidate.display(),
					error = %source,
					"Data directory is not usable."
				);

				last = Some((candidate, source));
			},
		}
	}

	let (path, source) = last.unwrap_or_else(|| {
		let source =
			std::io::Error::new(std::io::ErrorKind::NotFound, "no data directory candidate");

		(PathBuf::new(), source)
	});

	Err(ConfigError::DataDirectory { path, source })
}

pub(crate) fn parse_url(what: &'static str, value: &str) -> Result<Url, ConfigError> {
	Url::parse(value)
		.map_err(|source| ConfigError::InvalidUrl { what, value: value.to_owned(), source })
}

#[cfg(test)]
mod tests {
	// std
	use std::process;
	// self
	use super::*;

	fn temp_dir(tag: &str) -> PathBuf {
		env::temp_dir().join(format!(
			"sensor_api_proxy_config_{tag}_{}_{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		))
	}

	#[test]
	fn defaults_point_at_public_endpoints() {
		let config = ProxyConfig::new("/tmp/unused").expect("Default configuration should build.");

		assert_eq!(config.api_base.as_str(), DEFAULT_API_BASE);
		assert_eq!(config.token_endpoint.as_str(), DEFAULT_TOKEN_ENDPOINT);
		assert_eq!(config.http.timeout, StdDuration::from_secs(30));
		assert_eq!(config.connection_idle_timeout, Duration::minutes(10));
		assert_eq!(config.refresh_policy, RefreshPolicy::SingleFlight);
	}

	#[test]
	fn builders_override_defaults() {
		let api_base = Url::parse("https://api.test/v2").expect("Fixture URL should parse.");
		let token_endpoint =
			Url::parse("https://auth.test/token").expect("Fixture URL should parse.");
		let http = HttpSettings { timeout: StdDuration::from_secs(5), ..HttpSettings::default() };
		let config = ProxyConfig::new("/data")
			.expect("Default configuration should build.")
			.with_api_base(api_base.clone())
			.with_token_endpoint(token_endpoint.clone())
			.with_http(http.clone())
			.with_credential_ttl(Duration::minutes(1))
			.with_connection_idle_timeout(Duration::minutes(2))
			.with_refresh_policy(RefreshPolicy::Unguarded);

		assert_eq!(config.api_base, api_base);
		assert_eq!(config.token_endpoint, token_endpoint);
		assert_eq!(config.http, http);
		assert_eq!(config.credential_ttl, Duration::minutes(1));
		assert_eq!(config.connection_idle_timeout, Duration::minutes(2));
		assert_eq!(config.refresh_policy, RefreshPolicy::Unguarded);
	}

	#[test]
	fn from_env_resolves_a_usable_directory() {
		let config =
			ProxyConfig::from_env().expect("Test environment has a usable data directory.");
		let expected = match env::var_os(DATA_PATH_ENV).filter(|v| !v.is_empty()) {
			Some(path) => PathBuf::from(path),
			None => env::current_exe()
				.expect("Test binary path should resolve.")
				.parent()
				.map(Path::to_path_buf)
				.expect("Test binary should live in a directory."),
		};

		assert_eq!(config.data_dir, expected);
		assert!(config.data_dir.is_dir());
	}

	#[test]
	fn connection_dir_uses_stable_identifiers() {
		let config = ProxyConfig::new("/data").expect("Default configuration should build.");

		assert_eq!(config.connection_dir(3, 42), PathBuf::from("/data/org-3/ds-42"));
	}

	#[test]
	fn prefers_configured_directory() {
		let preferred = temp_dir("preferred");
		let fallback = temp_dir("fallback");
		let resolved = resolve_data_dir(Some(preferred.clone()), Some(fallback.clone()))
			.expect("Preferred directory should be creatable.");

		assert_eq!(resolved, preferred);
		assert!(!fallback.exists());

		fs::remove_dir_all(&preferred).expect("Failed to remove preferred directory.");
	}

	#[test]
	fn falls_back_when_preferred_is_unusable() {
		let blocker = temp_dir("blocker");

		fs::write(&blocker, b"file").expect("Failed to create blocking file.");

		let fallback = temp_dir("fallback");
		let resolved = resolve_data_dir(Some(blocker.join("nested")), Some(fallback.clone()))
			.expect("Fallback directory should be used.");

		assert_eq!(resolved, fallback);

		fs::remove_file(&blocker).expect("Failed to remove blocking file.");
		fs::remove_dir_all(&fallback).expect("Failed to remove fallback directory.");
	}

	#[test]
	fn no_usable_directory_is_fatal() {
		let blocker = temp_dir("fatal");

		fs::write(&blocker, b"file").expect("Failed to create blocking file.");

		let err = resolve_data_dir(Some(blocker.join("a")), Some(blocker.join("b")))
			.expect_err("Unusable directories must fail.");

		assert!(matches!(
			err,
			ConfigError::DataDirectory { ref path, .. } if path == &blocker.join("b")
		));

		fs::remove_file(&blocker).expect("Failed to remove blocking file.");
	}
}
