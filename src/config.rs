//! Application configuration and the validating builder that produces it.
//!
//! Configuration is assembled once at startup and handed to the broker by
//! value; components never read ambient globals.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ValidationError};

/// Default access-token endpoint.
pub const DEFAULT_ACCESS_TOKEN_ENDPOINT: &str = "https://api.weixin.qq.com/cgi-bin/token";
/// Default JS-API ticket endpoint.
pub const DEFAULT_JS_TICKET_ENDPOINT: &str = "https://api.weixin.qq.com/cgi-bin/ticket/getticket";
/// Default OAuth authorization-code exchange endpoint.
pub const DEFAULT_OAUTH_ACCESS_TOKEN_ENDPOINT: &str =
	"https://api.weixin.qq.com/sns/oauth2/access_token";
/// Default OAuth refresh endpoint.
pub const DEFAULT_OAUTH_REFRESH_ENDPOINT: &str =
	"https://api.weixin.qq.com/sns/oauth2/refresh_token";
/// Default user-profile endpoint.
pub const DEFAULT_USER_PROFILE_ENDPOINT: &str = "https://api.weixin.qq.com/sns/userinfo";

/// Upstream endpoint set consumed by the HTTP client.
///
/// Defaults target the production platform; every URL is overridable so tests
/// can point at a mock server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
	/// Application access-token endpoint.
	pub access_token: Url,
	/// JS-API ticket endpoint.
	pub js_ticket: Url,
	/// OAuth authorization-code exchange endpoint.
	pub oauth_access_token: Url,
	/// OAuth refresh endpoint.
	pub oauth_refresh: Url,
	/// User-profile endpoint.
	pub user_profile: Url,
}

/// Validated application configuration.
///
/// Build via [`AppConfig::builder`]; construction fails fast on blank
/// credentials or unparseable endpoint overrides, so a constructed value is
/// always usable.
#[derive(Clone, Debug)]
pub struct AppConfig {
	/// Application identifier issued by the platform.
	pub app_id: String,
	/// Application secret used for token fetches and code exchanges.
	pub secret: TokenSecret,
	/// Shared webhook secret, when webhook verification is enabled.
	pub webhook_token: Option<TokenSecret>,
	/// Upstream endpoint set.
	pub endpoints: Endpoints,
	/// Freshness window for the global token, ticket, and cached signatures.
	pub token_ttl: Duration,
	/// Manual refreshes allowed per window.
	pub refresh_budget: u32,
	/// Length of the manual-refresh window.
	pub refresh_window: Duration,
	/// Language tag passed to the profile endpoint.
	pub lang: String,
}
impl AppConfig {
	/// Default freshness window, one minute under the upstream two-hour
	/// credential lifetime.
	pub const DEFAULT_TOKEN_TTL: Duration = Duration::minutes(119);

	/// Creates a builder seeded with the application credentials.
	pub fn builder(app_id: impl Into<String>, secret: impl Into<String>) -> AppConfigBuilder {
		AppConfigBuilder::new(app_id, secret)
	}
}

/// Builder for [`AppConfig`] values.
#[derive(Clone, Debug)]
pub struct AppConfigBuilder {
	app_id: String,
	secret: String,
	webhook_token: Option<String>,
	access_token_endpoint: Option<String>,
	js_ticket_endpoint: Option<String>,
	oauth_access_token_endpoint: Option<String>,
	oauth_refresh_endpoint: Option<String>,
	user_profile_endpoint: Option<String>,
	token_ttl: Duration,
	refresh_budget: u32,
	refresh_window: Duration,
	lang: String,
}
impl AppConfigBuilder {
	fn new(app_id: impl Into<String>, secret: impl Into<String>) -> Self {
		Self {
			app_id: app_id.into(),
			secret: secret.into(),
			webhook_token: None,
			access_token_endpoint: None,
			js_ticket_endpoint: None,
			oauth_access_token_endpoint: None,
			oauth_refresh_endpoint: None,
			user_profile_endpoint: None,
			token_ttl: AppConfig::DEFAULT_TOKEN_TTL,
			refresh_budget: 5,
			refresh_window: Duration::hours(2),
			lang: "zh_CN".into(),
		}
	}

	/// Enables webhook verification with the given shared secret.
	pub fn webhook_token(mut self, token: impl Into<String>) -> Self {
		self.webhook_token = Some(token.into());

		self
	}

	/// Overrides the access-token endpoint.
	pub fn access_token_endpoint(mut self, url: impl Into<String>) -> Self {
		self.access_token_endpoint = Some(url.into());

		self
	}

	/// Overrides the JS-API ticket endpoint.
	pub fn js_ticket_endpoint(mut self, url: impl Into<String>) -> Self {
		self.js_ticket_endpoint = Some(url.into());

		self
	}

	/// Overrides the OAuth code-exchange endpoint.
	pub fn oauth_access_token_endpoint(mut self, url: impl Into<String>) -> Self {
		self.oauth_access_token_endpoint = Some(url.into());

		self
	}

	/// Overrides the OAuth refresh endpoint.
	pub fn oauth_refresh_endpoint(mut self, url: impl Into<String>) -> Self {
		self.oauth_refresh_endpoint = Some(url.into());

		self
	}

	/// Overrides the user-profile endpoint.
	pub fn user_profile_endpoint(mut self, url: impl Into<String>) -> Self {
		self.user_profile_endpoint = Some(url.into());

		self
	}

	/// Overrides the credential freshness window.
	pub fn token_ttl(mut self, ttl: Duration) -> Self {
		self.token_ttl = ttl;

		self
	}

	/// Overrides the manual-refresh budget cap.
	pub fn refresh_budget(mut self, budget: u32) -> Self {
		self.refresh_budget = budget;

		self
	}

	/// Overrides the manual-refresh window length.
	pub fn refresh_window(mut self, window: Duration) -> Self {
		self.refresh_window = window;

		self
	}

	/// Overrides the profile language tag.
	pub fn lang(mut self, lang: impl Into<String>) -> Self {
		self.lang = lang.into();

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<AppConfig, ValidationError> {
		if self.app_id.trim().is_empty() {
			return Err(ValidationError::MissingAppId);
		}
		if self.secret.trim().is_empty() {
			return Err(ValidationError::MissingSecret);
		}

		let endpoints = Endpoints {
			access_token: parse_endpoint(
				"access_token",
				self.access_token_endpoint,
				DEFAULT_ACCESS_TOKEN_ENDPOINT,
			)?,
			js_ticket: parse_endpoint(
				"js_ticket",
				self.js_ticket_endpoint,
				DEFAULT_JS_TICKET_ENDPOINT,
			)?,
			oauth_access_token: parse_endpoint(
				"oauth_access_token",
				self.oauth_access_token_endpoint,
				DEFAULT_OAUTH_ACCESS_TOKEN_ENDPOINT,
			)?,
			oauth_refresh: parse_endpoint(
				"oauth_refresh",
				self.oauth_refresh_endpoint,
				DEFAULT_OAUTH_REFRESH_ENDPOINT,
			)?,
			user_profile: parse_endpoint(
				"user_profile",
				self.user_profile_endpoint,
				DEFAULT_USER_PROFILE_ENDPOINT,
			)?,
		};

		Ok(AppConfig {
			app_id: self.app_id,
			secret: TokenSecret::new(self.secret),
			webhook_token: self.webhook_token.map(TokenSecret::new),
			endpoints,
			token_ttl: self.token_ttl,
			refresh_budget: self.refresh_budget,
			refresh_window: self.refresh_window,
			lang: self.lang,
		})
	}
}

fn parse_endpoint(
	name: &'static str,
	supplied: Option<String>,
	default: &str,
) -> Result<Url, ValidationError> {
	Url::parse(supplied.as_deref().unwrap_or(default))
		.map_err(|e| ValidationError::InvalidEndpoint { endpoint: name, source: e })
}
