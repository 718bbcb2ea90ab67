#![cfg(all(feature = "reqwest", feature = "test"))]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::Duration;
// self
use wechat_broker::{
	_preludet::test_reqwest_client,
	auth::GlobalTokenPatch,
	broker::{Broker, ReqwestBroker},
	config::AppConfig,
	error::{Error, RateLimitError, UpstreamError},
	store::{CredentialStore, DocumentStore, MemoryBackend},
};

const APP_ID: &str = "wx-token-flow";
const APP_SECRET: &str = "secret-token-flow";

fn build_config(server: &MockServer) -> AppConfig {
	AppConfig::builder(APP_ID, APP_SECRET)
		.access_token_endpoint(server.url("/cgi-bin/token"))
		.js_ticket_endpoint(server.url("/cgi-bin/ticket/getticket"))
		.build()
		.expect("Mock-backed configuration should validate.")
}

fn build_broker(config: AppConfig) -> ReqwestBroker {
	let store: Arc<dyn CredentialStore> =
		Arc::new(DocumentStore::new(Arc::new(MemoryBackend::default())));

	Broker::with_client(config, store, test_reqwest_client())
}

#[tokio::test]
async fn prepare_fetches_token_then_ticket_once() {
	let server = MockServer::start_async().await;
	let broker = build_broker(build_config(&server));
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/cgi-bin/token")
				.query_param("grant_type", "client_credential")
				.query_param("appid", APP_ID)
				.query_param("secret", APP_SECRET);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"fresh-token\",\"expires_in\":7200}");
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/cgi-bin/ticket/getticket")
				.query_param("access_token", "fresh-token")
				.query_param("type", "jsapi");
			then.status(200).header("content-type", "application/json").body(
				"{\"errcode\":0,\"errmsg\":\"ok\",\"ticket\":\"fresh-ticket\",\"expires_in\":7200}",
			);
		})
		.await;
	let record = broker.prepare_global_token().await.expect("Initial prepare should succeed.");

	assert_eq!(record.access_token.expose(), "fresh-token");
	assert_eq!(record.js_ticket.expose(), "fresh-ticket");

	let cached = broker.prepare_global_token().await.expect("Cached prepare should succeed.");

	assert_eq!(cached, record);

	token_mock.assert_calls_async(1).await;
	ticket_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn prepare_resumes_at_the_ticket_step() {
	let server = MockServer::start_async().await;
	let broker = build_broker(build_config(&server));

	broker
		.store
		.update_global_token(GlobalTokenPatch::access_token("seeded-token"))
		.await
		.expect("Seeding the half-finished record should succeed.");

	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"unused-token\",\"expires_in\":7200}");
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/cgi-bin/ticket/getticket")
				.query_param("access_token", "seeded-token");
			then.status(200).header("content-type", "application/json").body(
				"{\"errcode\":0,\"errmsg\":\"ok\",\"ticket\":\"resumed-ticket\",\"expires_in\":7200}",
			);
		})
		.await;
	let record = broker.prepare_global_token().await.expect("Resumed prepare should succeed.");

	assert_eq!(record.access_token.expose(), "seeded-token");
	assert_eq!(record.js_ticket.expose(), "resumed-ticket");

	token_mock.assert_calls_async(0).await;
	ticket_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn stale_records_refresh_on_prepare() {
	let server = MockServer::start_async().await;
	let config = AppConfig::builder(APP_ID, APP_SECRET)
		.access_token_endpoint(server.url("/cgi-bin/token"))
		.js_ticket_endpoint(server.url("/cgi-bin/ticket/getticket"))
		.token_ttl(Duration::ZERO)
		.build()
		.expect("Mock-backed configuration should validate.");
	let broker = build_broker(config);
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"stale-cycle-token\",\"expires_in\":7200}");
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/ticket/getticket");
			then.status(200).header("content-type", "application/json").body(
				"{\"errcode\":0,\"errmsg\":\"ok\",\"ticket\":\"stale-cycle-ticket\",\"expires_in\":7200}",
			);
		})
		.await;

	broker.prepare_global_token().await.expect("Initial prepare should succeed.");

	// A zero TTL leaves the freshly persisted record instantly stale, so the
	// next prepare runs the whole pipeline again: one token fetch and one
	// ticket fetch per expiry.
	broker.prepare_global_token().await.expect("Stale prepare should succeed.");

	token_mock.assert_calls_async(2).await;
	ticket_mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn forced_refresh_charges_the_manual_budget() {
	let server = MockServer::start_async().await;
	let config = AppConfig::builder(APP_ID, APP_SECRET)
		.access_token_endpoint(server.url("/cgi-bin/token"))
		.js_ticket_endpoint(server.url("/cgi-bin/ticket/getticket"))
		.refresh_budget(2)
		.build()
		.expect("Mock-backed configuration should validate.");
	let broker = build_broker(config);
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"forced-token\",\"expires_in\":7200}");
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/ticket/getticket");
			then.status(200).header("content-type", "application/json").body(
				"{\"errcode\":0,\"errmsg\":\"ok\",\"ticket\":\"forced-ticket\",\"expires_in\":7200}",
			);
		})
		.await;

	broker.refresh_global_token().await.expect("First forced refresh should fit the budget.");
	broker.refresh_global_token().await.expect("Second forced refresh should fit the budget.");

	let err = broker
		.refresh_global_token()
		.await
		.expect_err("Exhausted budgets should reject further forced refreshes.");

	assert!(matches!(err, Error::RateLimit(RateLimitError { cap: 2, .. })));

	token_mock.assert_calls_async(2).await;
	ticket_mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn failed_ticket_fetch_keeps_the_persisted_token() {
	let server = MockServer::start_async().await;
	let broker = build_broker(build_config(&server));
	let _token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"half-token\",\"expires_in\":7200}");
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/ticket/getticket");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"errcode\":40001,\"errmsg\":\"invalid credential\"}");
		})
		.await;
	let err = broker.prepare_global_token().await.expect_err("Ticket failures should surface.");

	assert!(matches!(err, Error::Upstream(UpstreamError::Api { code: 40001, .. })));

	ticket_mock.assert_async().await;

	let stored = broker
		.store
		.global_token()
		.await
		.expect("Store read should succeed.")
		.expect("The access token should persist even though the ticket fetch failed.");

	assert_eq!(stored.access_token.expose(), "half-token");
	assert!(stored.js_ticket.is_empty());
}
