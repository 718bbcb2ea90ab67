//! Demonstrates exchanging an OAuth authorization code for a per-user session, fetching the
//! user's profile with it, and serving the cached session afterwards without new upstream calls.

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
	let exchange_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/sns/oauth2/access_token")
				.query_param("code", "demo-code")
				.query_param("grant_type", "authorization_code");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"user-access\",\"expires_in\":7200,\"refresh_token\":\"user-refresh\",\"openid\":\"openid-1729\",\"scope\":\"snsapi_userinfo\"}",
			);
		})
		.await;
	let profile_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/sns/userinfo").query_param("openid", "openid-1729");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"openid\":\"openid-1729\",\"nickname\":\"Ada\",\"privilege\":[]}");
		})
		.await;
	let config = AppConfig::builder("wx-demo-app", "demo-secret")
		.oauth_access_token_endpoint(server.url("/sns/oauth2/access_token"))
		.user_profile_endpoint(server.url("/sns/userinfo"))
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
	let info = broker.user_info(Some("demo-code"), None, true).await?;

	println!(
		"Authorized {} ({}).",
		info.profile.nickname,
		info.token.as_ref().map(|record| record.openid.as_str()).unwrap_or("unknown"),
	);

	let cached = broker.oauth_access_token(None, Some("openid-1729")).await?;

	println!("Cached session expires at {}.", cached.expiration_time);

	exchange_mock.assert_async().await;
	profile_mock.assert_async().await;

	Ok(())
}
