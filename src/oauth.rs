//! Per-user OAuth session management: code exchange, cached tokens, refresh,
//! and profile fetches.
//!
//! A session lives under a caller-chosen key (falling back to the user's
//! `openid`). Presenting an authorization code always re-runs the remote
//! exchange; without a code the cached record is served while valid and
//! refreshed through the refresh endpoint once expired. A rejected refresh
//! token cannot be recovered here, because the broker has no browser to
//! restart the redirect dance with; callers get
//! [`OAuthError::ReauthorizeRequired`] instead.

// self
use crate::{
	_prelude::*,
	auth::{OAuthTokenPatch, OAuthTokenRecord},
	config::AppConfig,
	error::{OAuthError, UpstreamError},
	http::{UpstreamClient, UserProfile},
	obs::{self, FlowKind},
	store::CredentialStore,
};

/// Manages per-user OAuth token records.
pub struct OAuthManager<C>
where
	C: ?Sized + UpstreamClient,
{
	config: Arc<AppConfig>,
	store: Arc<dyn CredentialStore>,
	client: Arc<C>,
}
impl<C> OAuthManager<C>
where
	C: ?Sized + UpstreamClient,
{
	/// Creates a manager over the shared store and transport.
	pub fn new(config: Arc<AppConfig>, store: Arc<dyn CredentialStore>, client: Arc<C>) -> Self {
		Self { config, store, client }
	}

	/// Returns a valid token record for the session.
	///
	/// A present `code` always performs the remote exchange regardless of
	/// cache and persists under `key`, or under the returned `openid` when no
	/// key was supplied. Without a code the cached record is returned while
	/// unexpired and refreshed when expired;
	/// [`OAuthError::MissingAuthorization`] is raised when neither a code nor
	/// a cached record exists.
	pub async fn access_token(
		&self,
		code: Option<&str>,
		key: Option<&str>,
	) -> Result<OAuthTokenRecord> {
		if let Some(code) = code {
			return self.exchange_code(code, key).await;
		}

		let Some(key) = key else { return Err(OAuthError::MissingAuthorization.into()) };
		let cached = <dyn CredentialStore>::oauth_token(self.store.as_ref(), key)
			.await
			.map_err(Error::from)?;
		let Some(record) = cached else { return Err(OAuthError::MissingAuthorization.into()) };

		if record.is_valid_at(OffsetDateTime::now_utc()) {
			return Ok(record);
		}

		self.refresh_access_token(key, record).await
	}

	/// Refreshes an expired session in place with its stored refresh token.
	///
	/// An upstream `errcode` rejection means the refresh token itself is dead
	/// and becomes [`OAuthError::ReauthorizeRequired`]; transport failures
	/// stay [`UpstreamError`]s.
	pub async fn refresh_access_token(
		&self,
		key: &str,
		record: OAuthTokenRecord,
	) -> Result<OAuthTokenRecord> {
		obs::flow(FlowKind::OAuthRefresh, "refresh_access_token", async move {
			let response = match self
				.client
				.refresh_oauth_token(
					&self.config.endpoints.oauth_refresh,
					&self.config.app_id,
					record.refresh_token.expose(),
				)
				.await
			{
				Ok(response) => response,
				Err(UpstreamError::Api { code, message, .. }) =>
					return Err(OAuthError::ReauthorizeRequired {
						reason: format!("errcode {code}: {message}"),
					}
					.into()),
				Err(e) => return Err(e.into()),
			};

			<dyn CredentialStore>::update_oauth_token(
				self.store.as_ref(),
				key,
				OAuthTokenPatch {
					access_token: Some(response.access_token),
					refresh_token: Some(response.refresh_token),
					scope: response.scope,
					expires_in: Some(response.expires_in),
				},
			)
			.await
			.map_err(Error::from)
		})
		.await
	}

	/// Fetches the authorizing user's profile, resolving a valid access
	/// token first.
	///
	/// `with_token` attaches the resolved token record to the returned value.
	pub async fn user_info(
		&self,
		code: Option<&str>,
		key: Option<&str>,
		with_token: bool,
	) -> Result<UserInfo> {
		obs::flow(FlowKind::Profile, "user_info", async move {
			let record = self.access_token(code, key).await?;
			let profile = self
				.client
				.fetch_user_profile(
					&self.config.endpoints.user_profile,
					record.access_token.expose(),
					&record.openid,
					&self.config.lang,
				)
				.await?;

			Ok(UserInfo { profile, token: with_token.then_some(record) })
		})
		.await
	}

	async fn exchange_code(&self, code: &str, key: Option<&str>) -> Result<OAuthTokenRecord> {
		obs::flow(FlowKind::CodeExchange, "exchange_code", async move {
			let response = self
				.client
				.exchange_authorization_code(
					&self.config.endpoints.oauth_access_token,
					&self.config.app_id,
					self.config.secret.expose(),
					code,
				)
				.await?;
			let now = OffsetDateTime::now_utc();
			// A fresh exchange is a new grant, so the record is replaced
			// outright rather than patched.
			let record = OAuthTokenRecord {
				key: key.map(str::to_owned).unwrap_or_else(|| response.openid.clone()),
				access_token: response.access_token,
				refresh_token: response.refresh_token,
				openid: response.openid,
				scope: response.scope,
				expires_in: response.expires_in,
				expiration_time: OAuthTokenRecord::expiration_for(now, response.expires_in),
				create_date: now,
				modify_date: now,
			};

			<dyn CredentialStore>::save_oauth_token(self.store.as_ref(), record)
				.await
				.map_err(Error::from)
		})
		.await
	}
}
impl<C> Clone for OAuthManager<C>
where
	C: ?Sized + UpstreamClient,
{
	fn clone(&self) -> Self {
		Self { config: self.config.clone(), store: self.store.clone(), client: self.client.clone() }
	}
}
impl<C> Debug for OAuthManager<C>
where
	C: ?Sized + UpstreamClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthManager").field("app_id", &self.config.app_id).finish()
	}
}

/// Profile payload returned by [`OAuthManager::user_info`].
#[derive(Clone, Debug)]
pub struct UserInfo {
	/// Platform profile fields.
	pub profile: UserProfile,
	/// Token record backing the fetch, when requested via `with_token`.
	pub token: Option<OAuthTokenRecord>,
}
