//! Demonstrates wiring a custom transport into the broker.
//!
//! 1. Implement [`UpstreamClient`] for the transport handle; every method receives the fully
//!    configured endpoint URL and returns a boxed future.
//! 2. Pass the handle to [`Broker::with_client`]; the managers never learn which stack runs
//!    underneath.
//! 3. Map transport failures into [`UpstreamError`] variants so callers keep one error surface.

// std
use std::{
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	sync::Arc,
};
// crates.io
use color_eyre::Result;
// self
use wechat_broker::{
	auth::TokenSecret,
	broker::Broker,
	config::AppConfig,
	error::UpstreamError,
	http::{
		AccessTokenResponse, ClientFuture, OAuthTokenResponse, TicketResponse, UpstreamClient,
		UserProfile,
	},
	store::{CredentialStore, DocumentStore, MemoryBackend},
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = AppConfig::builder("wx-demo-app", "demo-secret").build()?;
	let store: Arc<dyn CredentialStore> =
		Arc::new(DocumentStore::new(Arc::new(MemoryBackend::default())));
	let broker = Broker::with_client(config, store, CannedUpstreamClient::default());
	let record = broker.prepare_global_token().await?;

	println!("Canned transport issued: {}.", record.access_token.expose());

	let payload = broker.signature("https://shop.example.com/cart", false).await?;

	println!("Signature derived without a network stack: {}.", payload.signature);

	let rejecting_config = AppConfig::builder("wx-demo-app", "demo-secret").build()?;
	let rejecting_store: Arc<dyn CredentialStore> =
		Arc::new(DocumentStore::new(Arc::new(MemoryBackend::default())));
	let rejecting_broker =
		Broker::with_client(rejecting_config, rejecting_store, CannedUpstreamClient::rejecting());

	match rejecting_broker.prepare_global_token().await {
		Ok(_) => println!("The rejecting transport unexpectedly succeeded."),
		Err(e) => println!("Platform rejection mapped by the broker: {e}"),
	}

	let failing_config = AppConfig::builder("wx-demo-app", "demo-secret").build()?;
	let failing_store: Arc<dyn CredentialStore> =
		Arc::new(DocumentStore::new(Arc::new(MemoryBackend::default())));
	let failing_broker = Broker::with_client(
		failing_config,
		failing_store,
		CannedUpstreamClient::unreachable("api.weixin.qq.com"),
	);

	match failing_broker.prepare_global_token().await {
		Ok(_) => println!("The unreachable transport unexpectedly succeeded."),
		Err(e) => println!("Transport failure mapped by the broker: {e}"),
	}

	Ok(())
}

#[derive(Clone, Copy, Debug)]
enum CannedBehavior {
	Success,
	ApiRejection,
	Unreachable { host: &'static str },
}

#[derive(Clone, Debug)]
struct CannedUpstreamClient {
	behavior: CannedBehavior,
}
impl CannedUpstreamClient {
	fn rejecting() -> Self {
		Self { behavior: CannedBehavior::ApiRejection }
	}

	fn unreachable(host: &'static str) -> Self {
		Self { behavior: CannedBehavior::Unreachable { host } }
	}

	fn respond<'a, T>(&'a self, endpoint: &'static str, payload: T) -> ClientFuture<'a, T>
	where
		T: 'a + Send,
	{
		let result = match self.behavior {
			CannedBehavior::Success => Ok(payload),
			CannedBehavior::ApiRejection => Err(UpstreamError::Api {
				endpoint,
				code: 40_164,
				message: "invalid ip, not in whitelist".into(),
			}),
			CannedBehavior::Unreachable { host } =>
				Err(UpstreamError::network(endpoint, DemoTransportError::Dns { host })),
		};

		Box::pin(async move { result })
	}
}
impl Default for CannedUpstreamClient {
	fn default() -> Self {
		Self { behavior: CannedBehavior::Success }
	}
}
impl UpstreamClient for CannedUpstreamClient {
	fn fetch_access_token<'a>(
		&'a self,
		_url: &'a Url,
		_app_id: &'a str,
		_secret: &'a str,
	) -> ClientFuture<'a, AccessTokenResponse> {
		self.respond(
			"access_token",
			AccessTokenResponse {
				access_token: TokenSecret::new("canned-access"),
				expires_in: 7_200,
			},
		)
	}

	fn fetch_js_ticket<'a>(
		&'a self,
		_url: &'a Url,
		_access_token: &'a str,
	) -> ClientFuture<'a, TicketResponse> {
		self.respond(
			"js_ticket",
			TicketResponse { ticket: TokenSecret::new("canned-ticket"), expires_in: 7_200 },
		)
	}

	fn exchange_authorization_code<'a>(
		&'a self,
		_url: &'a Url,
		_app_id: &'a str,
		_secret: &'a str,
		_code: &'a str,
	) -> ClientFuture<'a, OAuthTokenResponse> {
		self.respond("oauth_access_token", canned_oauth_response())
	}

	fn refresh_oauth_token<'a>(
		&'a self,
		_url: &'a Url,
		_app_id: &'a str,
		_refresh_token: &'a str,
	) -> ClientFuture<'a, OAuthTokenResponse> {
		self.respond("oauth_refresh", canned_oauth_response())
	}

	fn fetch_user_profile<'a>(
		&'a self,
		_url: &'a Url,
		_access_token: &'a str,
		_openid: &'a str,
		_lang: &'a str,
	) -> ClientFuture<'a, UserProfile> {
		self.respond(
			"user_profile",
			UserProfile {
				openid: "openid-demo".into(),
				nickname: "Demo".into(),
				..Default::default()
			},
		)
	}
}

fn canned_oauth_response() -> OAuthTokenResponse {
	OAuthTokenResponse {
		access_token: TokenSecret::new("canned-user-access"),
		expires_in: 7_200,
		refresh_token: TokenSecret::new("canned-user-refresh"),
		openid: "openid-demo".into(),
		scope: Some("snsapi_userinfo".into()),
	}
}

#[derive(Clone, Debug)]
enum DemoTransportError {
	Dns { host: &'static str },
}
impl Display for DemoTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Dns { host } => write!(f, "DNS lookup failed for {host}"),
		}
	}
}
impl StdError for DemoTransportError {}
