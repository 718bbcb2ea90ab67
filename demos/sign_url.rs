//! Demonstrates signing a JS-SDK URL with the default reqwest transport and the in-memory
//! document store, then serving the cached signature for a fragment variant of the same page.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use wechat_broker::{
	broker::Broker,
	config::AppConfig,
	http::ReqwestUpstreamClient,
	reqwest::Client,
	store::{CredentialStore, DocumentStore, MemoryBackend},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/token").query_param("grant_type", "client_credential");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"demo-access\",\"expires_in\":7200}");
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/cgi-bin/ticket/getticket").query_param("type", "jsapi");
			then.status(200).header("content-type", "application/json").body(
				"{\"errcode\":0,\"errmsg\":\"ok\",\"ticket\":\"demo-ticket\",\"expires_in\":7200}",
			);
		})
		.await;
	let config = AppConfig::builder("wx-demo-app", "demo-secret")
		.access_token_endpoint(server.url("/cgi-bin/token"))
		.js_ticket_endpoint(server.url("/cgi-bin/ticket/getticket"))
		.build()?;
	let store: Arc<dyn CredentialStore> =
		Arc::new(DocumentStore::new(Arc::new(MemoryBackend::default())));
	let transport = ReqwestUpstreamClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let broker = Broker::with_client(config, store, transport);
	let payload = broker.signature("https://shop.example.com/cart#step-1", false).await?;

	println!("JS-SDK config payload: {}.", serde_json::to_string(&payload)?);

	let cached = broker.signature("https://shop.example.com/cart#step-2", false).await?;

	println!("Fragment variant reused the cached signature: {}.", cached == payload);

	token_mock.assert_async().await;
	ticket_mock.assert_async().await;

	Ok(())
}
