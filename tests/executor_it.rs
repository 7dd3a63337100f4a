// crates.io
use httpmock::prelude::*;
// self
use sensor_api_proxy::{
	_preludet::*,
	auth::{AccessToken, ClientCredentials, GrantType, StoreKey},
	cache::CredentialCache,
	config::{HttpSettings, RefreshPolicy},
	error::TransportError,
	executor::ApiExecutor,
	flows::TokenManager,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	store::{MemoryStore, TokenStore},
};

type TestExecutor = ApiExecutor<ReqwestHttpClient, ReqwestTransportErrorMapper>;

fn executor_for(server: &MockServer, manager: ReqwestTestManager) -> TestExecutor {
	ApiExecutor::new(
		Arc::new(manager),
		Url::parse(&server.url("/v1")).expect("Mock API base should parse."),
	)
}

fn seeded_executor(server: &MockServer, access: &str) -> TestExecutor {
	let (manager, _store) = build_reqwest_test_manager(
		&server.url("/v1/token"),
		GrantType::AuthorizationCode,
		RefreshPolicy::SingleFlight,
	);

	let expires_at = OffsetDateTime::now_utc() + Duration::minutes(5);

	manager.cache().store_access_token(&AccessToken::new(access, expires_at));

	executor_for(server, manager)
}

fn sn_params() -> BTreeMap<String, String> {
	BTreeMap::from([("sn".to_owned(), "123".to_owned())])
}

#[tokio::test]
async fn forwards_bearer_request_and_returns_raw_body() {
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(500);
		})
		.await;
	let data_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v1/devices/123/latest-samples")
				.query_param("sn", "123")
				.header("authorization", "Bearer access-1")
				.header("accept", "application/json");
			then.status(200).body("{\"data\":{\"temp\":21.5,\"co2\":612}}");
		})
		.await;
	let executor = seeded_executor(&server, "access-1");
	let body = executor
		.get("devices/123/latest-samples", &sn_params())
		.await
		.expect("Upstream query should succeed.");

	assert_eq!(body, b"{\"data\":{\"temp\":21.5,\"co2\":612}}");

	data_mock.assert_async().await;
	token_mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn expired_token_is_refreshed_before_the_query() {
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200).body(token_body("access-new", 600, "refresh-1"));
		})
		.await;
	let data_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/devices").header("authorization", "Bearer access-new");
			then.status(200).body("{\"devices\":[]}");
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(
		&server.url("/v1/token"),
		GrantType::AuthorizationCode,
		RefreshPolicy::SingleFlight,
	);

	store
		.save(&StoreKey::refresh_token(), "refresh-1")
		.await
		.expect("Seeding the refresh token should succeed.");

	let executor = executor_for(&server, manager);
	let body = executor.get("devices", &BTreeMap::new()).await.expect("Query should succeed.");

	assert_eq!(body, b"{\"devices\":[]}");

	token_mock.assert_calls_async(1).await;
	data_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn non_success_status_preserves_upstream_body() {
	let server = MockServer::start_async().await;
	let _data_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/devices/404/latest-samples");
			then.status(404).body("{\"error\":\"device not found\"}");
		})
		.await;
	let executor = seeded_executor(&server, "access-1");
	let err = executor
		.get("devices/404/latest-samples", &BTreeMap::new())
		.await
		.expect_err("Non-200 status must fail.");

	assert_eq!(err.status(), Some(404));
	assert_eq!(err.body(), Some(&b"{\"error\":\"device not found\"}"[..]));
}

#[tokio::test]
async fn missing_tokens_fail_before_any_data_request() {
	let server = MockServer::start_async().await;
	let data_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/devices");
			then.status(200).body("[]");
		})
		.await;
	let (manager, _store) = build_reqwest_test_manager(
		&server.url("/v1/token"),
		GrantType::AuthorizationCode,
		RefreshPolicy::SingleFlight,
	);
	let executor = executor_for(&server, manager);
	let err = executor.get("devices", &BTreeMap::new()).await.expect_err("No token must fail.");

	assert!(matches!(err, Error::Unauthorized { .. }));

	data_mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn slow_upstream_hits_the_configured_timeout() {
	let server = MockServer::start_async().await;
	let _data_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/slow");
			then.status(200).delay(std::time::Duration::from_secs(2)).body("late");
		})
		.await;
	let settings = HttpSettings {
		timeout: std::time::Duration::from_millis(200),
		..HttpSettings::default()
	};
	let http_client = ReqwestHttpClient::from_settings(&settings)
		.expect("Client with short timeout should build.");
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let manager = TokenManager::new(
		ClientCredentials::new(GrantType::AuthorizationCode, test_client_id(), "secret-test"),
		Url::parse(&server.url("/v1/token")).expect("Mock token endpoint should parse."),
		Arc::new(CredentialCache::default()),
		store,
		http_client,
		ReqwestTransportErrorMapper,
	);

	let expires_at = OffsetDateTime::now_utc() + Duration::minutes(5);

	manager.cache().store_access_token(&AccessToken::new("access-1", expires_at));

	let executor = executor_for(&server, manager);
	let err =
		executor.get("slow", &BTreeMap::new()).await.expect_err("Slow upstream must time out.");

	assert!(matches!(err, Error::Transport(TransportError::Timeout { .. })));
	assert!(err.body().is_none());
}

#[tokio::test]
async fn dropping_the_future_cancels_the_query() {
	let server = MockServer::start_async().await;
	let _data_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/slow");
			then.status(200).delay(std::time::Duration::from_secs(2)).body("late");
		})
		.await;
	let executor = seeded_executor(&server, "access-1");
	let outcome = tokio::time::timeout(
		std::time::Duration::from_millis(100),
		executor.get("slow", &BTreeMap::new()),
	)
	.await;

	assert!(outcome.is_err());

	// The executor stays usable after a cancelled call.
	assert!(executor.manager().cache().access_token().is_some());
}
