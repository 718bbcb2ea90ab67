//! URL signature derivation, caching, and webhook verification.
//!
//! Signatures are SHA-1 digests over a canonical string of
//! `jsapi_ticket`/`noncestr`/`timestamp`/`url` pairs, keys sorted
//! lexicographically and joined `key=value&…` with raw values. The canonical
//! form is fixed by the platform; any deviation produces a signature the
//! JS-SDK rejects.

// crates.io
use rand::{Rng, distr::Alphanumeric};
use sha1::{Digest, Sha1};
// self
use crate::{
	_prelude::*,
	auth::{SignaturePatch, SignaturePayload, SignatureRecord},
	config::AppConfig,
	http::UpstreamClient,
	obs::{self, FlowKind},
	store::CredentialStore,
	token::TokenManager,
};

const NONCE_LEN: usize = 16;

/// Derives, caches, and verifies URL signatures.
pub struct SignatureEngine<C>
where
	C: ?Sized + UpstreamClient,
{
	config: Arc<AppConfig>,
	store: Arc<dyn CredentialStore>,
	tokens: TokenManager<C>,
}
impl<C> SignatureEngine<C>
where
	C: ?Sized + UpstreamClient,
{
	/// Creates an engine sharing the manager's store and refresh budget.
	pub fn new(
		config: Arc<AppConfig>,
		store: Arc<dyn CredentialStore>,
		tokens: TokenManager<C>,
	) -> Self {
		Self { config, store, tokens }
	}

	/// Returns the client-safe signature payload for `url`.
	///
	/// Serves the cached record while it is inside the freshness window
	/// unless `force_new` is set; otherwise derives a new signature, persists
	/// it, and returns the filtered view.
	pub async fn signature(&self, url: &str, force_new: bool) -> Result<SignaturePayload> {
		obs::flow(FlowKind::Signature, "signature", async move {
			let url = normalize_url(url);

			if !force_new {
				let cached = <dyn CredentialStore>::signature(self.store.as_ref(), &url)
					.await
					.map_err(Error::from)?;
				let now = OffsetDateTime::now_utc();

				if let Some(record) = cached.filter(|r| r.is_fresh_at(now, self.config.token_ttl)) {
					return Ok(SignaturePayload::filter(Some(&record), &self.config.app_id));
				}
			}

			self.create_signature(url).await
		})
		.await
	}

	/// Validates an inbound webhook query against the configured webhook
	/// token.
	///
	/// The platform signs webhook calls with the SHA-1 of the sorted
	/// concatenation of the shared token, timestamp, and nonce. Returns
	/// `false` for any tampered field, and always when no webhook token is
	/// configured.
	pub fn verify_signature(&self, query: &VerifyQuery) -> bool {
		let Some(token) = self.config.webhook_token.as_ref() else { return false };
		let mut values = [token.expose(), query.timestamp.as_str(), query.nonce.as_str()];

		values.sort_unstable();

		sha1_hex(&values.concat()) == query.signature
	}

	async fn create_signature(&self, url: String) -> Result<SignaturePayload> {
		let global = self.tokens.prepare_global_token().await?;
		let now = OffsetDateTime::now_utc();
		let nonce_str = random_string(NONCE_LEN);
		let timestamp = now.unix_timestamp();
		let signature = generate_signature(global.js_ticket.expose(), &nonce_str, timestamp, &url);
		let exists = <dyn CredentialStore>::signature_exists(self.store.as_ref(), &url)
			.await
			.map_err(Error::from)?;
		let record = if exists {
			<dyn CredentialStore>::update_signature(
				self.store.as_ref(),
				&url,
				SignaturePatch {
					nonce_str: Some(nonce_str),
					timestamp: Some(timestamp),
					signature: Some(signature),
					js_ticket: Some(global.js_ticket),
					access_token: Some(global.access_token),
				},
			)
			.await
			.map_err(Error::from)?
		} else {
			<dyn CredentialStore>::save_signature(
				self.store.as_ref(),
				SignatureRecord {
					url: url.clone(),
					signature_name: url,
					nonce_str,
					timestamp,
					signature,
					js_ticket: global.js_ticket,
					access_token: global.access_token,
					create_date: now,
					modify_date: now,
				},
			)
			.await
			.map_err(Error::from)?
		};

		Ok(SignaturePayload::filter(Some(&record), &self.config.app_id))
	}
}
impl<C> Clone for SignatureEngine<C>
where
	C: ?Sized + UpstreamClient,
{
	fn clone(&self) -> Self {
		Self { config: self.config.clone(), store: self.store.clone(), tokens: self.tokens.clone() }
	}
}
impl<C> Debug for SignatureEngine<C>
where
	C: ?Sized + UpstreamClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SignatureEngine")
			.field("app_id", &self.config.app_id)
			.field("webhook_token_set", &self.config.webhook_token.is_some())
			.finish()
	}
}

/// Inbound webhook query fields checked by [`SignatureEngine::verify_signature`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyQuery {
	/// Hex SHA-1 digest computed by the platform.
	pub signature: String,
	/// Echoed timestamp, kept as the raw query string value.
	pub timestamp: String,
	/// Echoed nonce.
	pub nonce: String,
}

/// Collapses fragment-only URL variants onto one cache key.
pub fn normalize_url(url: &str) -> String {
	url.split_once('#').map_or(url, |(base, _)| base).to_owned()
}

/// Computes the platform signature for the given ticket, nonce, timestamp,
/// and normalized URL.
///
/// Deterministic: fixed inputs always produce the same digest.
pub fn generate_signature(ticket: &str, nonce: &str, timestamp: i64, url: &str) -> String {
	let mut pairs = [
		("jsapi_ticket", ticket.to_owned()),
		("noncestr", nonce.to_owned()),
		("timestamp", timestamp.to_string()),
		("url", url.to_owned()),
	];

	pairs.sort_by(|a, b| a.0.cmp(b.0));

	let canonical = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");

	sha1_hex(&canonical)
}

fn sha1_hex(input: &str) -> String {
	let mut hasher = Sha1::new();

	hasher.update(input.as_bytes());

	format!("{:x}", hasher.finalize())
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
