// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use httpmock::prelude::*;
// self
use sensor_api_proxy::{
	_preludet::*,
	auth::{AccessToken, ClientCredentials, GrantType, StoreKey, TokenSecret},
	cache::CredentialCache,
	config::RefreshPolicy,
	error::AuthError,
	flows::TokenManager,
	oauth::ReqwestTransportErrorMapper,
	store::{MemoryStore, StoreError, StoreFuture, TokenStore},
};

/// Wraps [`MemoryStore`] and counts writes.
#[derive(Default)]
struct CountingStore {
	inner: MemoryStore,
	saves: AtomicUsize,
}
impl TokenStore for CountingStore {
	fn save<'a>(&'a self, key: &'a StoreKey, value: &'a str) -> StoreFuture<'a, ()> {
		self.saves.fetch_add(1, Ordering::SeqCst);
		self.inner.save(key, value)
	}

	fn load<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, String> {
		self.inner.load(key)
	}

	fn remove<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, ()> {
		self.inner.remove(key)
	}
}

/// Serves a fixed refresh token and refuses every write.
struct ReadOnlyStore;
impl TokenStore for ReadOnlyStore {
	fn save<'a>(&'a self, _: &'a StoreKey, _: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "read-only volume".into() }) })
	}

	fn load<'a>(&'a self, _: &'a StoreKey) -> StoreFuture<'a, String> {
		Box::pin(async { Ok("refresh-1".to_owned()) })
	}

	fn remove<'a>(&'a self, _: &'a StoreKey) -> StoreFuture<'a, ()> {
		Box::pin(async { Ok(()) })
	}
}

fn manager_with_store(server: &MockServer, store: Arc<dyn TokenStore>) -> ReqwestTestManager {
	TokenManager::new(
		ClientCredentials::new(GrantType::AuthorizationCode, test_client_id(), "secret-test"),
		Url::parse(&server.url("/v1/token")).expect("Mock token endpoint should parse."),
		Arc::new(CredentialCache::default()),
		store,
		test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	)
}

async fn seed_refresh_token(store: &MemoryStore, value: &str) {
	store
		.save(&StoreKey::refresh_token(), value)
		.await
		.expect("Seeding the refresh token should succeed.");
}

#[tokio::test]
async fn cached_access_token_is_served_without_network() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200).body(token_body("unexpected", 600, "refresh-1"));
		})
		.await;
	let (manager, _store) = build_reqwest_test_manager(
		&server.url("/v1/token"),
		GrantType::AuthorizationCode,
		RefreshPolicy::SingleFlight,
	);

	let expires_at = OffsetDateTime::now_utc() + Duration::minutes(5);

	manager.cache().store_access_token(&AccessToken::new("access-0", expires_at));

	let token = manager.get_access_token().await.expect("Cached token should be returned.");

	assert_eq!(token.secret.expose(), "access-0");
	assert_eq!(manager.refresh_metrics.cache_hits(), 1);

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn expired_token_refreshes_once_and_keeps_unchanged_refresh_token() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v1/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.header("accept", "application/json");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-1", 600, "refresh-1"));
		})
		.await;
	let store = Arc::new(CountingStore::default());

	seed_refresh_token(&store.inner, "refresh-1").await;

	let saves_before = store.saves.load(Ordering::SeqCst);
	let manager = manager_with_store(&server, store.clone());

	let expired_at = OffsetDateTime::now_utc() - Duration::seconds(1);

	manager.cache().store_access_token(&AccessToken::new("stale", expired_at));

	let first = manager.get_access_token().await.expect("Refresh should succeed.");
	let second = manager.get_access_token().await.expect("Second call should hit the cache.");

	assert_eq!(first.secret.expose(), "access-1");
	assert_eq!(second.secret.expose(), "access-1");
	assert!(first.expires_at > OffsetDateTime::now_utc() + Duration::minutes(9));
	assert_eq!(store.saves.load(Ordering::SeqCst), saves_before);
	assert_eq!(manager.cache().refresh_token(), Some(TokenSecret::new("refresh-1")));
	assert_eq!(manager.refresh_metrics.attempts(), 1);
	assert_eq!(manager.refresh_metrics.successes(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn rotated_refresh_token_is_cached_and_persisted() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200).body(token_body("access-2", 600, "refresh-2"));
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(
		&server.url("/v1/token"),
		GrantType::AuthorizationCode,
		RefreshPolicy::SingleFlight,
	);

	seed_refresh_token(&store, "refresh-1").await;

	let token = manager.get_access_token().await.expect("Refresh should succeed.");

	assert_eq!(token.secret.expose(), "access-2");
	assert_eq!(manager.cache().refresh_token(), Some(TokenSecret::new("refresh-2")));
	assert_eq!(store.peek(&StoreKey::refresh_token()).as_deref(), Some("refresh-2"));

	mock.assert_async().await;
}

#[tokio::test]
async fn missing_refresh_token_is_unauthorized_without_network() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200).body(token_body("access-1", 600, "refresh-1"));
		})
		.await;
	let (manager, _store) = build_reqwest_test_manager(
		&server.url("/v1/token"),
		GrantType::AuthorizationCode,
		RefreshPolicy::SingleFlight,
	);
	let err = manager.get_access_token().await.expect_err("No refresh token must fail.");

	assert!(matches!(err, Error::Unauthorized { .. }));
	assert!(err.to_string().starts_with("Refresh token not found, authorize the connection first"));
	assert_eq!(manager.refresh_metrics.attempts(), 0);

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn token_endpoint_rejection_is_an_auth_error() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(400).body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(
		&server.url("/v1/token"),
		GrantType::AuthorizationCode,
		RefreshPolicy::SingleFlight,
	);

	seed_refresh_token(&store, "refresh-revoked").await;

	let err = manager.get_access_token().await.expect_err("Rejected refresh must fail.");

	match err {
		Error::Auth(AuthError::TokenEndpoint { status, ref body }) => {
			assert_eq!(status, 400);
			assert!(body.contains("invalid_grant"));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert!(manager.cache().access_token().is_none());
	assert_eq!(store.peek(&StoreKey::refresh_token()).as_deref(), Some("refresh-revoked"));
	assert_eq!(manager.refresh_metrics.failures(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn malformed_token_response_is_rejected() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200).body("{\"access_token\":\"access-1\",\"expires_in\":\"soon\"}");
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(
		&server.url("/v1/token"),
		GrantType::AuthorizationCode,
		RefreshPolicy::SingleFlight,
	);

	seed_refresh_token(&store, "refresh-1").await;

	let err = manager.get_access_token().await.expect_err("Malformed body must fail.");

	assert!(matches!(err, Error::Auth(AuthError::TokenResponseParse { status: 200, .. })));
	assert!(
		err.to_string().starts_with("Token endpoint returned malformed JSON at `expires_in`: ")
	);
}

#[tokio::test]
async fn store_write_failure_surfaces_without_rolling_back_cache() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200).body(token_body("access-3", 600, "refresh-3"));
		})
		.await;
	let manager = manager_with_store(&server, Arc::new(ReadOnlyStore));
	let err = manager.get_access_token().await.expect_err("Failed persistence must surface.");

	assert!(matches!(err, Error::Storage(StoreError::Backend { .. })));
	assert_eq!(
		manager.cache().access_token().map(|token| token.secret.expose().to_owned()),
		Some("access-3".to_owned())
	);
	assert_eq!(manager.cache().refresh_token(), Some(TokenSecret::new("refresh-3")));
}

#[tokio::test]
async fn single_flight_shares_one_refresh_between_concurrent_callers() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200)
				.delay(std::time::Duration::from_millis(200))
				.body(token_body("access-sf", 600, "refresh-1"));
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(
		&server.url("/v1/token"),
		GrantType::AuthorizationCode,
		RefreshPolicy::SingleFlight,
	);

	seed_refresh_token(&store, "refresh-1").await;

	let (a, b, c) = tokio::join!(
		manager.get_access_token(),
		manager.get_access_token(),
		manager.get_access_token()
	);

	for token in [a, b, c] {
		assert_eq!(token.expect("Every caller should get a token.").secret.expose(), "access-sf");
	}

	assert_eq!(manager.refresh_metrics.attempts(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn unguarded_policy_lets_each_caller_refresh() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200)
				.delay(std::time::Duration::from_millis(200))
				.body(token_body("access-ug", 600, "refresh-1"));
		})
		.await;
	let (manager, store) = build_reqwest_test_manager(
		&server.url("/v1/token"),
		GrantType::AuthorizationCode,
		RefreshPolicy::Unguarded,
	);

	seed_refresh_token(&store, "refresh-1").await;

	let (a, b) = tokio::join!(manager.get_access_token(), manager.get_access_token());

	assert_eq!(a.expect("First caller should get a token.").secret.expose(), "access-ug");
	assert_eq!(b.expect("Second caller should get a token.").secret.expose(), "access-ug");
	assert_eq!(manager.refresh_metrics.attempts(), 2);

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn refresh_form_carries_client_credentials() {
	let store = MemoryStore::default();

	seed_refresh_token(&store, "refresh-form").await;

	let (manager, transport) = build_scripted_test_manager(GrantType::AuthorizationCode, store);

	transport.respond(200, token_body("access-form", 600, "refresh-form"));
	manager.get_access_token().await.expect("Scripted refresh should succeed.");

	let requests = transport.requests();

	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].method, "POST");
	assert_eq!(requests[0].uri, "https://accounts.test/v1/token");

	let form = requests[0].form();

	assert_eq!(form.get("grant_type").map(String::as_str), Some("refresh_token"));
	assert_eq!(form.get("refresh_token").map(String::as_str), Some("refresh-form"));
	assert_eq!(form.get("client_id").map(String::as_str), Some("client-test"));
	assert_eq!(form.get("client_secret").map(String::as_str), Some("secret-test"));
}

#[tokio::test]
async fn transport_failure_is_reported_as_transport_error() {
	let store = MemoryStore::default();

	seed_refresh_token(&store, "refresh-1").await;

	let (manager, transport) = build_scripted_test_manager(GrantType::AuthorizationCode, store);

	transport.fail("connection reset");

	let err = manager.get_access_token().await.expect_err("Transport failure must surface.");

	assert!(matches!(err, Error::Transport(_)));
	assert_eq!(
		err.to_string(),
		"Network error occurred while calling the token endpoint: \
		 Scripted transport failure: connection reset."
	);
	assert!(err.body().is_none());
}

#[tokio::test]
async fn unrepresentable_lifetime_fails_without_caching() {
	let store = MemoryStore::default();

	seed_refresh_token(&store, "R1").await;

	let (manager, transport) =
		build_scripted_test_manager(GrantType::AuthorizationCode, store.clone());

	transport.respond(200, token_body("A1", 1_000_000_000_000, "R1"));

	let err = manager.get_access_token().await.expect_err("Overflowing expiry must be rejected.");

	assert!(matches!(
		err,
		Error::Auth(AuthError::InvalidExpiresIn { expires_in: 1_000_000_000_000 })
	));
	assert!(manager.cache().access_token().is_none());
	assert_eq!(store.peek(&StoreKey::refresh_token()).as_deref(), Some("R1"));
	assert_eq!(transport.calls(), 1);
}
