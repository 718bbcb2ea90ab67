#![cfg(all(feature = "reqwest", feature = "test"))]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::Duration;
// self
use wechat_broker::{
	_preludet::test_reqwest_client,
	broker::{Broker, ReqwestBroker},
	config::AppConfig,
	signature::{self, VerifyQuery},
	store::{CredentialStore, DocumentStore, MemoryBackend},
};

const APP_ID: &str = "wx-signature-flow";
const APP_SECRET: &str = "secret-signature-flow";
const TICKET: &str = "integration-ticket";

fn build_broker(server: &MockServer) -> ReqwestBroker {
	let config = AppConfig::builder(APP_ID, APP_SECRET)
		.access_token_endpoint(server.url("/cgi-bin/token"))
		.js_ticket_endpoint(server.url("/cgi-bin/ticket/getticket"))
		.build()
		.expect("Mock-backed configuration should validate.");
	let store: Arc<dyn CredentialStore> =
		Arc::new(DocumentStore::new(Arc::new(MemoryBackend::default())));

	Broker::with_client(config, store, test_reqwest_client())
}

fn token_body() -> String {
	"{\"access_token\":\"signature-token\",\"expires_in\":7200}".into()
}

fn ticket_body() -> String {
	format!("{{\"errcode\":0,\"errmsg\":\"ok\",\"ticket\":\"{TICKET}\",\"expires_in\":7200}}")
}

#[tokio::test]
async fn payload_matches_local_recomputation() {
	let server = MockServer::start_async().await;
	let broker = build_broker(&server);
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/token");
			then.status(200).header("content-type", "application/json").body(token_body());
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/ticket/getticket");
			then.status(200).header("content-type", "application/json").body(ticket_body());
		})
		.await;
	let payload = broker
		.signature("https://shop.example.com/cart#checkout", false)
		.await
		.expect("Signature derivation should succeed.");

	assert_eq!(payload.app_id, APP_ID);
	assert_eq!(payload.url, "https://shop.example.com/cart");
	assert_eq!(payload.nonce_str.len(), 16);
	assert!(payload.nonce_str.chars().all(|c| c.is_ascii_alphanumeric()));
	assert!(!payload.is_empty());
	assert_eq!(
		payload.signature,
		signature::generate_signature(TICKET, &payload.nonce_str, payload.timestamp, &payload.url),
	);

	token_mock.assert_async().await;
	ticket_mock.assert_async().await;
}

#[tokio::test]
async fn cached_signatures_serve_without_upstream_calls() {
	let server = MockServer::start_async().await;
	let broker = build_broker(&server);
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/token");
			then.status(200).header("content-type", "application/json").body(token_body());
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/ticket/getticket");
			then.status(200).header("content-type", "application/json").body(ticket_body());
		})
		.await;
	let first = broker
		.signature("https://shop.example.com/cart#checkout", false)
		.await
		.expect("Initial signature derivation should succeed.");
	// Same page, different fragment; both normalize to one cached record.
	let second = broker
		.signature("https://shop.example.com/cart#payment", false)
		.await
		.expect("Cached signature lookup should succeed.");

	assert_eq!(second, first);

	token_mock.assert_calls_async(1).await;
	ticket_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn force_new_rederives_without_refetching_credentials() {
	let server = MockServer::start_async().await;
	let broker = build_broker(&server);
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/token");
			then.status(200).header("content-type", "application/json").body(token_body());
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/ticket/getticket");
			then.status(200).header("content-type", "application/json").body(ticket_body());
		})
		.await;
	let first = broker
		.signature("https://shop.example.com/cart", false)
		.await
		.expect("Initial signature derivation should succeed.");
	let second = broker
		.signature("https://shop.example.com/cart", true)
		.await
		.expect("Forced signature derivation should succeed.");

	assert_ne!(second.nonce_str, first.nonce_str);
	assert_ne!(second.signature, first.signature);
	assert_eq!(second.url, first.url);

	token_mock.assert_calls_async(1).await;
	ticket_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn expired_signatures_regenerate_with_fresh_credentials() {
	let server = MockServer::start_async().await;
	let config = AppConfig::builder(APP_ID, APP_SECRET)
		.access_token_endpoint(server.url("/cgi-bin/token"))
		.js_ticket_endpoint(server.url("/cgi-bin/ticket/getticket"))
		.token_ttl(Duration::ZERO)
		.build()
		.expect("Mock-backed configuration should validate.");
	let store: Arc<dyn CredentialStore> =
		Arc::new(DocumentStore::new(Arc::new(MemoryBackend::default())));
	let broker = Broker::with_client(config, store, test_reqwest_client());
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/token");
			then.status(200).header("content-type", "application/json").body(token_body());
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/ticket/getticket");
			then.status(200).header("content-type", "application/json").body(ticket_body());
		})
		.await;
	let first = broker
		.signature("https://shop.example.com/cart", false)
		.await
		.expect("Initial signature derivation should succeed.");
	// The zero TTL expires the cached signature and the credential pair at
	// once, so the second call re-derives end to end instead of serving the
	// cache.
	let second = broker
		.signature("https://shop.example.com/cart", false)
		.await
		.expect("Re-derivation after expiry should succeed.");

	assert_ne!(second.nonce_str, first.nonce_str);
	assert_ne!(second.signature, first.signature);

	token_mock.assert_calls_async(2).await;
	ticket_mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn webhook_verification_accepts_the_platform_sample() {
	let config = AppConfig::builder(APP_ID, APP_SECRET)
		.webhook_token("demo-webhook-token")
		.build()
		.expect("Configuration should validate.");
	let store: Arc<dyn CredentialStore> =
		Arc::new(DocumentStore::new(Arc::new(MemoryBackend::default())));
	let broker = Broker::new(config, store);
	let query = VerifyQuery {
		signature: "a7937ecab89e2639d9e9387b9b4dacf95709445f".into(),
		timestamp: "1700000000".into(),
		nonce: "8e1b3c".into(),
	};

	assert!(broker.verify_signature(&query));

	let tampered = VerifyQuery { timestamp: "1700000001".into(), ..query };

	assert!(!broker.verify_signature(&tampered));
}
