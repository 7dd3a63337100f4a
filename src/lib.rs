//! Token-caching API proxy for sensor-data backends: OAuth 2.0 code + refresh flows, durable
//! refresh tokens, and bearer-injected upstream queries behind a per-connection registry.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod query;
pub mod registry;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// crates.io
	use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http::StatusCode};
	// self
	use crate::{
		auth::{ClientCredentials, ClientId, GrantType},
		cache::CredentialCache,
		config::RefreshPolicy,
		connection::ConnectionSettings,
		flows::TokenManager,
		http::HttpTransport,
		oauth::GenericTransportErrorMapper,
		store::{MemoryStore, TokenStore},
	};
	#[cfg(feature = "reqwest")]
	use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

	/// Token manager type alias used by reqwest-backed integration tests.
	#[cfg(feature = "reqwest")]
	pub type ReqwestTestManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;
	/// Token manager type alias used by scripted-transport tests.
	pub type ScriptedTestManager = TokenManager<ScriptedTransport, GenericTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Client identifier shared by every test fixture.
	pub fn test_client_id() -> ClientId {
		ClientId::new("client-test").expect("Test client identifier should be valid.")
	}

	/// Builds connection settings pointing both endpoints at `base` (usually a mock server).
	pub fn test_connection_settings(base: &str, grant: GrantType) -> ConnectionSettings {
		let json_data = serde_json::json!({
			"authType": grant.as_str(),
			"clientID": "client-test",
			"apiUrl": format!("{}/v1", base.trim_end_matches('/')),
			"tokenUrl": format!("{}/v1/token", base.trim_end_matches('/')),
		});

		ConnectionSettings {
			org_id: 1,
			datasource_id: 7,
			name: "sensors".into(),
			url: String::new(),
			json_data: json_data.to_string(),
			decrypted_secure_json_data: BTreeMap::from([(
				"clientSecret".into(),
				"secret-test".into(),
			)]),
		}
	}

	/// Constructs a [`TokenManager`] backed by an in-memory store and the reqwest transport
	/// used across integration tests.
	#[cfg(feature = "reqwest")]
	pub fn build_reqwest_test_manager(
		token_endpoint: &str,
		grant: GrantType,
		policy: RefreshPolicy,
	) -> (ReqwestTestManager, MemoryStore) {
		let store = MemoryStore::default();
		let store_handle: Arc<dyn TokenStore> = Arc::new(store.clone());
		let endpoint = Url::parse(token_endpoint).expect("Failed to parse test token endpoint.");
		let manager = TokenManager::new(
			ClientCredentials::new(grant, test_client_id(), "secret-test"),
			endpoint,
			Arc::new(CredentialCache::default()),
			store_handle,
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		)
		.with_refresh_policy(policy);

		(manager, store)
	}

	/// Constructs a [`TokenManager`] backed by the provided store and a fresh
	/// [`ScriptedTransport`].
	pub fn build_scripted_test_manager(
		grant: GrantType,
		store: MemoryStore,
	) -> (ScriptedTestManager, ScriptedTransport) {
		let transport = ScriptedTransport::default();
		let store_handle: Arc<dyn TokenStore> = Arc::new(store);
		let endpoint = Url::parse("https://accounts.test/v1/token")
			.expect("Failed to parse scripted token endpoint.");
		let manager = TokenManager::new(
			ClientCredentials::new(grant, test_client_id(), "secret-test"),
			endpoint,
			Arc::new(CredentialCache::default()),
			store_handle,
			transport.clone(),
			GenericTransportErrorMapper,
		);

		(manager, transport)
	}

	/// Error emitted by [`ScriptedTransport`] when a scripted failure is replayed.
	#[derive(Debug, ThisError)]
	#[error("Scripted transport failure: {0}")]
	pub struct ScriptedTransportError(pub String);

	/// Request captured by [`ScriptedTransport`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// HTTP method.
		pub method: String,
		/// Full request URI.
		pub uri: String,
		/// Request headers as lowercase name/value pairs.
		pub headers: Vec<(String, String)>,
		/// Request body decoded as UTF-8.
		pub body: String,
	}
	impl RecordedRequest {
		/// Returns the first header value matching `name`.
		pub fn header(&self, name: &str) -> Option<&str> {
			self.headers
				.iter()
				.find(|(key, _)| key.eq_ignore_ascii_case(name))
				.map(|(_, value)| value.as_str())
		}

		/// Decodes the body as `application/x-www-form-urlencoded` pairs.
		pub fn form(&self) -> BTreeMap<String, String> {
			url::form_urlencoded::parse(self.body.as_bytes()).into_owned().collect()
		}
	}

	#[derive(Debug)]
	enum ScriptedReply {
		Respond { status: u16, body: String },
		Fail(String),
	}

	#[derive(Debug, Default)]
	struct ScriptedState {
		replies: Mutex<VecDeque<ScriptedReply>>,
		requests: Mutex<Vec<RecordedRequest>>,
	}

	/// In-process [`HttpTransport`] that replays queued replies and records every request.
	///
	/// Requests issued after the queue runs dry receive a `599` response so tests fail loudly.
	#[derive(Clone, Debug, Default)]
	pub struct ScriptedTransport(Arc<ScriptedState>);
	impl ScriptedTransport {
		/// Queues a response with the provided status and body.
		pub fn respond(&self, status: u16, body: impl Into<String>) -> &Self {
			self.0.replies.lock().push_back(ScriptedReply::Respond { status, body: body.into() });

			self
		}

		/// Queues a transport-level failure.
		pub fn fail(&self, message: impl Into<String>) -> &Self {
			self.0.replies.lock().push_back(ScriptedReply::Fail(message.into()));

			self
		}

		/// Returns every request observed so far.
		pub fn requests(&self) -> Vec<RecordedRequest> {
			self.0.requests.lock().clone()
		}

		/// Returns the number of requests observed so far.
		pub fn calls(&self) -> usize {
			self.0.requests.lock().len()
		}
	}
	impl HttpTransport for ScriptedTransport {
		type Handle = ScriptedHandle;
		type TransportError = ScriptedTransportError;

		fn handle(&self) -> Self::Handle {
			ScriptedHandle(self.0.clone())
		}
	}

	/// Handle returned by [`ScriptedTransport::handle`].
	pub struct ScriptedHandle(Arc<ScriptedState>);
	impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
		type Error = HttpClientError<ScriptedTransportError>;
		type Future =
			Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

		fn call(&'c self, request: HttpRequest) -> Self::Future {
			let state = self.0.clone();

			Box::pin(async move {
				let recorded = RecordedRequest {
					method: request.method().to_string(),
					uri: request.uri().to_string(),
					headers: request
						.headers()
						.iter()
						.map(|(name, value)| {
							let value = value.to_str().unwrap_or_default();

							(name.as_str().to_owned(), value.to_owned())
						})
						.collect(),
					body: String::from_utf8_lossy(request.body()).into_owned(),
				};

				state.requests.lock().push(recorded);

				let reply = state.replies.lock().pop_front();

				match reply {
					Some(ScriptedReply::Respond { status, body }) => {
						let mut response = HttpResponse::new(body.into_bytes());

						*response.status_mut() =
							StatusCode::from_u16(status).unwrap_or(StatusCode::IM_A_TEAPOT);

						Ok(response)
					},
					Some(ScriptedReply::Fail(message)) =>
						Err(HttpClientError::Reqwest(Box::new(ScriptedTransportError(message)))),
					None => {
						let mut response = HttpResponse::new(b"no scripted reply".to_vec());

						*response.status_mut() =
							StatusCode::from_u16(599).unwrap_or(StatusCode::IM_A_TEAPOT);

						Ok(response)
					},
				}
			})
		}
	}

	/// Renders a token endpoint success body.
	pub fn token_body(access: &str, expires_in: i64, refresh: &str) -> String {
		serde_json::json!({
			"access_token": access,
			"expires_in": expires_in,
			"refresh_token": refresh,
			"token_type": "Bearer",
		})
		.to_string()
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		path::{Path, PathBuf},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
