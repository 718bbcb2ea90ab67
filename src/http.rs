//! Transport primitives for upstream platform calls.
//!
//! The module exposes [`UpstreamClient`], the broker's only dependency on an
//! HTTP stack, together with the typed wire payloads and the envelope decoder
//! shared by every implementation. The platform reports most failures as an
//! HTTP 200 carrying `{errcode, errmsg}`, so [`decode_envelope`] inspects that
//! envelope before attempting the typed decode.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, auth::TokenSecret, error::UpstreamError};

/// Boxed future returned by every transport operation.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UpstreamError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing the platform's
/// credential endpoints.
///
/// Callers provide an implementation behind `Arc<C>`; every method receives
/// the fully configured endpoint URL and appends its own query parameters.
/// Implementations must be `Send + Sync + 'static` so managers can share one
/// transport across brokers, and the futures they return must be `Send`.
pub trait UpstreamClient
where
	Self: 'static + Send + Sync,
{
	/// Fetches a fresh application access token
	/// (`grant_type=client_credential`).
	fn fetch_access_token<'a>(
		&'a self,
		url: &'a Url,
		app_id: &'a str,
		secret: &'a str,
	) -> ClientFuture<'a, AccessTokenResponse>;

	/// Fetches a fresh JS-API ticket using the current access token.
	fn fetch_js_ticket<'a>(
		&'a self,
		url: &'a Url,
		access_token: &'a str,
	) -> ClientFuture<'a, TicketResponse>;

	/// Exchanges an authorization code for a user token pair.
	fn exchange_authorization_code<'a>(
		&'a self,
		url: &'a Url,
		app_id: &'a str,
		secret: &'a str,
		code: &'a str,
	) -> ClientFuture<'a, OAuthTokenResponse>;

	/// Refreshes a user token pair with its refresh token.
	fn refresh_oauth_token<'a>(
		&'a self,
		url: &'a Url,
		app_id: &'a str,
		refresh_token: &'a str,
	) -> ClientFuture<'a, OAuthTokenResponse>;

	/// Fetches the authorizing user's profile.
	fn fetch_user_profile<'a>(
		&'a self,
		url: &'a Url,
		access_token: &'a str,
		openid: &'a str,
		lang: &'a str,
	) -> ClientFuture<'a, UserProfile>;
}

/// Successful payload of the application access-token endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct AccessTokenResponse {
	/// Freshly issued application access token.
	pub access_token: TokenSecret,
	/// Upstream-reported lifetime in seconds.
	pub expires_in: i64,
}

/// Successful payload of the JS-API ticket endpoint.
///
/// The platform wraps this one in an `errcode: 0` envelope even on success;
/// the decoder strips it.
#[derive(Clone, Debug, Deserialize)]
pub struct TicketResponse {
	/// Freshly issued JS-API ticket.
	pub ticket: TokenSecret,
	/// Upstream-reported lifetime in seconds.
	pub expires_in: i64,
}

/// Successful payload of the OAuth code-exchange and refresh endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct OAuthTokenResponse {
	/// Short-lived user access token.
	pub access_token: TokenSecret,
	/// Upstream-reported lifetime in seconds.
	pub expires_in: i64,
	/// Long-lived refresh token.
	pub refresh_token: TokenSecret,
	/// Authorizing user's `openid`.
	pub openid: String,
	/// Granted scope, when reported.
	#[serde(default)]
	pub scope: Option<String>,
}

/// Profile object returned by the user-info endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	/// User identifier scoped to the application.
	pub openid: String,
	/// Display name.
	#[serde(default)]
	pub nickname: String,
	/// Declared sex flag (`1` male, `2` female, `0` unset).
	#[serde(default)]
	pub sex: i64,
	/// Declared province.
	#[serde(default)]
	pub province: String,
	/// Declared city.
	#[serde(default)]
	pub city: String,
	/// Declared country.
	#[serde(default)]
	pub country: String,
	/// Avatar URL.
	#[serde(default)]
	pub headimgurl: String,
	/// Privilege tags granted by the platform.
	#[serde(default)]
	pub privilege: Vec<String>,
	/// Cross-application identifier, when the account is bound to one.
	#[serde(default)]
	pub unionid: Option<String>,
}

/// Decodes an upstream response body.
///
/// Bodies carrying a non-zero `errcode` become [`UpstreamError::Api`]; all
/// other bodies go through the typed decode, with the failing JSON path
/// preserved on error.
pub fn decode_envelope<T>(endpoint: &'static str, body: &[u8]) -> Result<T, UpstreamError>
where
	T: DeserializeOwned,
{
	#[derive(Default, Deserialize)]
	struct Envelope {
		#[serde(default)]
		errcode: i64,
		#[serde(default)]
		errmsg: String,
	}

	let envelope = serde_json::from_slice::<Envelope>(body).unwrap_or_default();

	if envelope.errcode != 0 {
		return Err(UpstreamError::Api {
			endpoint,
			code: envelope.errcode,
			message: envelope.errmsg,
		});
	}

	let deserializer = &mut serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(deserializer)
		.map_err(|e| UpstreamError::ResponseParse { endpoint, source: e })
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one
/// place. All platform endpoints are plain GETs with query-string credentials;
/// redirect following stays at reqwest's defaults.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestUpstreamClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestUpstreamClient {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn get_json<T>(&self, endpoint: &'static str, url: Url) -> Result<T, UpstreamError>
	where
		T: DeserializeOwned,
	{
		let response =
			self.0.get(url).send().await.map_err(|e| UpstreamError::network(endpoint, e))?;
		let status = response.status();
		let body = response.bytes().await.map_err(|e| UpstreamError::network(endpoint, e))?;

		if !status.is_success() {
			return Err(UpstreamError::status(
				endpoint,
				status.as_u16(),
				String::from_utf8_lossy(&body).into_owned(),
			));
		}

		decode_envelope(endpoint, &body)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestUpstreamClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestUpstreamClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl UpstreamClient for ReqwestUpstreamClient {
	fn fetch_access_token<'a>(
		&'a self,
		url: &'a Url,
		app_id: &'a str,
		secret: &'a str,
	) -> ClientFuture<'a, AccessTokenResponse> {
		let mut url = url.clone();

		url.query_pairs_mut()
			.append_pair("grant_type", "client_credential")
			.append_pair("appid", app_id)
			.append_pair("secret", secret);

		Box::pin(async move { self.get_json("access_token", url).await })
	}

	fn fetch_js_ticket<'a>(
		&'a self,
		url: &'a Url,
		access_token: &'a str,
	) -> ClientFuture<'a, TicketResponse> {
		let mut url = url.clone();

		url.query_pairs_mut()
			.append_pair("access_token", access_token)
			.append_pair("type", "jsapi");

		Box::pin(async move { self.get_json("js_ticket", url).await })
	}

	fn exchange_authorization_code<'a>(
		&'a self,
		url: &'a Url,
		app_id: &'a str,
		secret: &'a str,
		code: &'a str,
	) -> ClientFuture<'a, OAuthTokenResponse> {
		let mut url = url.clone();

		url.query_pairs_mut()
			.append_pair("appid", app_id)
			.append_pair("secret", secret)
			.append_pair("code", code)
			.append_pair("grant_type", "authorization_code");

		Box::pin(async move { self.get_json("oauth_access_token", url).await })
	}

	fn refresh_oauth_token<'a>(
		&'a self,
		url: &'a Url,
		app_id: &'a str,
		refresh_token: &'a str,
	) -> ClientFuture<'a, OAuthTokenResponse> {
		let mut url = url.clone();

		url.query_pairs_mut()
			.append_pair("appid", app_id)
			.append_pair("grant_type", "refresh_token")
			.append_pair("refresh_token", refresh_token);

		Box::pin(async move { self.get_json("oauth_refresh", url).await })
	}

	fn fetch_user_profile<'a>(
		&'a self,
		url: &'a Url,
		access_token: &'a str,
		openid: &'a str,
		lang: &'a str,
	) -> ClientFuture<'a, UserProfile> {
		let mut url = url.clone();

		url.query_pairs_mut()
			.append_pair("access_token", access_token)
			.append_pair("openid", openid)
			.append_pair("lang", lang);

		Box::pin(async move { self.get_json("user_profile", url).await })
	}
}
