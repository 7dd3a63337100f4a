//! Walks a host request through the proxy: authorize a connection with an authorization code,
//! then forward a data query using the cached access token.
//!
//! Both the token endpoint and the data API are served by a local mock so the demo runs
//! offline. The refresh token is written under a throwaway data directory.

// std
use std::{env, process};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use sensor_api_proxy::{
	config::ProxyConfig,
	connection::ConnectionSettings,
	query::{DatasourceRequest, ProxyService, Query},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/token");
			then.status(200).json_body(serde_json::json!({
				"access_token": "demo-access",
				"expires_in": 3600,
				"refresh_token": "demo-refresh",
			}));
		})
		.await;
	let samples_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v1/devices/2960000001/latest-samples")
				.header("authorization", "Bearer demo-access");
			then.status(200).json_body(serde_json::json!({
				"data": { "co2": 612, "humidity": 41, "radonShortTermAvg": 14, "temp": 21.5 },
			}));
		})
		.await;
	let data_dir = env::temp_dir().join(format!("sensor_api_proxy_demo_{}", process::id()));
	let service = ProxyService::new(ProxyConfig::new(&data_dir)?);
	let datasource = ConnectionSettings {
		org_id: 1,
		datasource_id: 1,
		name: "living-room".into(),
		json_data: serde_json::json!({
			"authType": "authorization_code",
			"clientID": "demo-client",
			"apiUrl": server.url("/v1"),
			"tokenUrl": server.url("/v1/token"),
		})
		.to_string(),
		decrypted_secure_json_data: [("clientSecret".to_owned(), "demo-secret".to_owned())].into(),
		..Default::default()
	};
	let authorize = DatasourceRequest {
		datasource: datasource.clone(),
		queries: vec![Query {
			ref_id: "auth".into(),
			model_json: serde_json::json!({
				"queryType": "airthingsAuth",
				"target": {
					"params": { "redirectUri": "http://localhost:3000/", "authCode": "demo-code" },
				},
			})
			.to_string(),
		}],
	};
	let samples = DatasourceRequest {
		datasource,
		queries: vec![Query {
			ref_id: "A".into(),
			model_json: serde_json::json!({
				"queryType": "airthingsApi",
				"target": { "endpoint": "devices/2960000001/latest-samples" },
			})
			.to_string(),
		}],
	};

	for request in [&authorize, &samples] {
		let response = service.handle(request).await;

		println!("{}", serde_json::to_string_pretty(&response)?);
	}

	token_mock.assert_async().await;
	samples_mock.assert_async().await;

	std::fs::remove_dir_all(&data_dir)?;

	Ok(())
}
