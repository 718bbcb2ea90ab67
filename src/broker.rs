//! High-level facade composing the token, signature, and OAuth managers.

// self
use crate::{
	_prelude::*,
	auth::{GlobalTokenRecord, OAuthTokenRecord, SignaturePayload},
	config::AppConfig,
	http::UpstreamClient,
	oauth::{OAuthManager, UserInfo},
	signature::{SignatureEngine, VerifyQuery},
	store::CredentialStore,
	token::TokenManager,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestUpstreamClient;

/// Broker specialized for the crate's default reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestBroker = Broker<ReqwestUpstreamClient>;

/// Coordinates every credential flow over one store and one transport.
///
/// The broker owns the three managers and re-exposes their operations as the
/// surface outer layers call into. Collaborating subsystems (card/payment
/// pass-throughs, webhook handlers, demo servers) depend on this facade and
/// never on the managers directly.
pub struct Broker<C>
where
	C: ?Sized + UpstreamClient,
{
	/// Global access-token + JS-ticket manager.
	pub tokens: TokenManager<C>,
	/// URL signature engine.
	pub signatures: SignatureEngine<C>,
	/// Per-user OAuth session manager.
	pub oauth: OAuthManager<C>,
	/// Credential store shared by all three managers.
	pub store: Arc<dyn CredentialStore>,
}
impl<C> Broker<C>
where
	C: ?Sized + UpstreamClient,
{
	/// Creates a broker that reuses the caller-provided transport.
	///
	/// Requires a Tokio runtime context when `config.refresh_window` is
	/// positive (the manual-refresh budget starts its reset task here).
	pub fn with_client(
		config: AppConfig,
		store: Arc<dyn CredentialStore>,
		client: impl Into<Arc<C>>,
	) -> Self {
		let config = Arc::new(config);
		let client = client.into();
		let tokens = TokenManager::new(config.clone(), store.clone(), client.clone());
		let signatures = SignatureEngine::new(config.clone(), store.clone(), tokens.clone());
		let oauth = OAuthManager::new(config, store.clone(), client);

		Self { tokens, signatures, oauth, store }
	}

	/// Returns a fresh, complete global token record, refreshing it first if
	/// needed.
	pub async fn prepare_global_token(&self) -> Result<GlobalTokenRecord> {
		self.tokens.prepare_global_token().await
	}

	/// Forces a full global refresh, charging the manual budget.
	pub async fn refresh_global_token(&self) -> Result<GlobalTokenRecord> {
		self.tokens.refresh_global_token().await
	}

	/// Returns the client-safe signature payload for `url`.
	pub async fn signature(&self, url: &str, force_new: bool) -> Result<SignaturePayload> {
		self.signatures.signature(url, force_new).await
	}

	/// Validates an inbound webhook query against the configured webhook
	/// token.
	pub fn verify_signature(&self, query: &VerifyQuery) -> bool {
		self.signatures.verify_signature(query)
	}

	/// Returns a valid user token record for the session.
	pub async fn oauth_access_token(
		&self,
		code: Option<&str>,
		key: Option<&str>,
	) -> Result<OAuthTokenRecord> {
		self.oauth.access_token(code, key).await
	}

	/// Fetches the authorizing user's profile.
	pub async fn user_info(
		&self,
		code: Option<&str>,
		key: Option<&str>,
		with_token: bool,
	) -> Result<UserInfo> {
		self.oauth.user_info(code, key, with_token).await
	}

	/// Forces durable persistence on the underlying store.
	pub async fn flush(&self) -> Result<()> {
		<dyn CredentialStore>::flush(self.store.as_ref()).await.map_err(Error::from)
	}

	/// Flushes the store and stops the broker's background tasks.
	///
	/// Stores with their own tasks (the file-backed one) are shut down by
	/// their owner; this call only covers what the broker itself spawned.
	pub async fn shutdown(&self) -> Result<()> {
		self.tokens.shutdown();

		self.flush().await
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestUpstreamClient> {
	/// Creates a broker with the crate's default reqwest transport.
	pub fn new(config: AppConfig, store: Arc<dyn CredentialStore>) -> Self {
		Self::with_client(config, store, ReqwestUpstreamClient::default())
	}
}
impl<C> Clone for Broker<C>
where
	C: ?Sized + UpstreamClient,
{
	fn clone(&self) -> Self {
		Self {
			tokens: self.tokens.clone(),
			signatures: self.signatures.clone(),
			oauth: self.oauth.clone(),
			store: self.store.clone(),
		}
	}
}
impl<C> Debug for Broker<C>
where
	C: ?Sized + UpstreamClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("tokens", &self.tokens)
			.field("signatures", &self.signatures)
			.field("oauth", &self.oauth)
			.finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::store::{DocumentStore, MemoryBackend};

	fn test_broker() -> ReqwestBroker {
		let config = AppConfig::builder("wx-app", "app-secret")
			.webhook_token("spamtoken")
			.refresh_window(Duration::ZERO)
			.build()
			.expect("Test configuration should validate.");
		let store: Arc<dyn CredentialStore> =
			Arc::new(DocumentStore::new(Arc::new(MemoryBackend::default())));

		Broker::new(config, store)
	}

	#[test]
	fn webhook_verification_round_trips() {
		let broker = test_broker();
		let query = VerifyQuery {
			signature: "c4ec6713da749b319a3e23566ffe9f96f837321e".into(),
			timestamp: "1400000000".into(),
			nonce: "n456".into(),
		};

		assert!(broker.verify_signature(&query));

		let tampered = VerifyQuery { nonce: "tampered".into(), ..query };

		assert!(!broker.verify_signature(&tampered));
	}

	#[test]
	fn verification_requires_a_configured_webhook_token() {
		let config = AppConfig::builder("wx-app", "app-secret")
			.refresh_window(Duration::ZERO)
			.build()
			.expect("Test configuration should validate.");
		let store: Arc<dyn CredentialStore> =
			Arc::new(DocumentStore::new(Arc::new(MemoryBackend::default())));
		let broker = Broker::new(config, store);

		assert!(!broker.verify_signature(&VerifyQuery::default()));
	}
}
