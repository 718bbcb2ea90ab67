//! [`CredentialStore`] implementation over a remote document database seam.

// crates.io
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{
		GlobalTokenPatch, GlobalTokenRecord, OAuthTokenPatch, OAuthTokenRecord, SignaturePatch,
		SignatureRecord,
	},
	store::{CredentialStore, StoreError, StoreFuture},
};

/// Collection holding the capped global token history.
pub const GLOBAL_TOKEN_COLLECTION: &str = "global_tokens";
/// Collection holding one signature document per normalized URL.
pub const SIGNATURE_COLLECTION: &str = "signatures";
/// Collection holding one OAuth token document per user key.
pub const OAUTH_TOKEN_COLLECTION: &str = "oauth_tokens";
/// Document field carrying the last-modified instant, used to order history.
pub const MODIFY_DATE_FIELD: &str = "modifyDate";

/// Boxed future returned by every document backend operation.
pub type DocFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Minimal document database contract the store runs against.
///
/// Documents are JSON values. Date fields carry RFC 3339 strings, so a
/// backend may order them lexically without parsing. Transport failures map
/// to [`StoreError::Backend`].
pub trait DocumentBackend
where
	Self: Send + Sync,
{
	/// Appends a new document to the collection.
	fn insert<'a>(&'a self, collection: &'a str, document: Value) -> DocFuture<'a, ()>;

	/// Inserts or replaces the document stored under `id`.
	fn upsert<'a>(&'a self, collection: &'a str, id: &'a str, document: Value)
	-> DocFuture<'a, ()>;

	/// Fetches the document stored under `id`, if present.
	fn find<'a>(&'a self, collection: &'a str, id: &'a str) -> DocFuture<'a, Option<Value>>;

	/// Fetches the document whose `date_field` holds the greatest instant.
	fn find_latest<'a>(
		&'a self,
		collection: &'a str,
		date_field: &'a str,
	) -> DocFuture<'a, Option<Value>>;

	/// Counts the documents in the collection.
	fn count<'a>(&'a self, collection: &'a str) -> DocFuture<'a, u64>;

	/// Removes the document whose `date_field` holds the smallest instant.
	fn remove_oldest<'a>(&'a self, collection: &'a str, date_field: &'a str) -> DocFuture<'a, ()>;
}

/// Credential store persisting every record through a [`DocumentBackend`].
///
/// Signatures and OAuth tokens are one-document-per-key upserts. Global
/// tokens form an append-only history capped at `max_token_history`
/// documents; the latest document is the live record and the oldest is
/// evicted once the cap is exceeded. Every operation is durable on the
/// backend, so [`CredentialStore::flush`] is a no-op.
pub struct DocumentStore {
	backend: Arc<dyn DocumentBackend>,
	max_token_history: u64,
}
impl DocumentStore {
	/// Default number of global token documents retained as history.
	pub const DEFAULT_MAX_TOKEN_HISTORY: u64 = 5;

	/// Creates a store over the backend with the default history cap.
	pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
		Self { backend, max_token_history: Self::DEFAULT_MAX_TOKEN_HISTORY }
	}

	/// Overrides the global token history cap.
	pub fn max_token_history(mut self, cap: u64) -> Self {
		self.max_token_history = cap;

		self
	}
}
impl CredentialStore for DocumentStore {
	fn global_token(&self) -> StoreFuture<'_, Option<GlobalTokenRecord>> {
		Box::pin(async move {
			self.backend
				.find_latest(GLOBAL_TOKEN_COLLECTION, MODIFY_DATE_FIELD)
				.await?
				.map(decode)
				.transpose()
		})
	}

	fn update_global_token(&self, patch: GlobalTokenPatch) -> StoreFuture<'_, GlobalTokenRecord> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let mut record = match self
				.backend
				.find_latest(GLOBAL_TOKEN_COLLECTION, MODIFY_DATE_FIELD)
				.await?
			{
				Some(document) => decode::<GlobalTokenRecord>(document)?,
				None => GlobalTokenRecord::bootstrap(now),
			};

			record.apply(patch, now);
			self.backend.insert(GLOBAL_TOKEN_COLLECTION, encode(&record)?).await?;

			while self.backend.count(GLOBAL_TOKEN_COLLECTION).await? > self.max_token_history {
				self.backend.remove_oldest(GLOBAL_TOKEN_COLLECTION, MODIFY_DATE_FIELD).await?;
			}

			Ok(record)
		})
	}

	fn signature_exists<'a>(&'a self, url: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(self.backend.find(SIGNATURE_COLLECTION, url).await?.is_some()) })
	}

	fn signature<'a>(&'a self, url: &'a str) -> StoreFuture<'a, Option<SignatureRecord>> {
		Box::pin(async move {
			self.backend.find(SIGNATURE_COLLECTION, url).await?.map(decode).transpose()
		})
	}

	fn save_signature(&self, record: SignatureRecord) -> StoreFuture<'_, SignatureRecord> {
		Box::pin(async move {
			self.backend.upsert(SIGNATURE_COLLECTION, &record.url, encode(&record)?).await?;

			Ok(record)
		})
	}

	fn update_signature<'a>(
		&'a self,
		url: &'a str,
		patch: SignaturePatch,
	) -> StoreFuture<'a, SignatureRecord> {
		Box::pin(async move {
			let document = self
				.backend
				.find(SIGNATURE_COLLECTION, url)
				.await?
				.ok_or_else(|| StoreError::MissingRecord { key: url.into() })?;
			let mut record = decode::<SignatureRecord>(document)?;

			record.apply(patch, OffsetDateTime::now_utc());
			self.backend.upsert(SIGNATURE_COLLECTION, url, encode(&record)?).await?;

			Ok(record)
		})
	}

	fn oauth_token<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<OAuthTokenRecord>> {
		Box::pin(async move {
			self.backend.find(OAUTH_TOKEN_COLLECTION, key).await?.map(decode).transpose()
		})
	}

	fn save_oauth_token(&self, record: OAuthTokenRecord) -> StoreFuture<'_, OAuthTokenRecord> {
		Box::pin(async move {
			self.backend.upsert(OAUTH_TOKEN_COLLECTION, &record.key, encode(&record)?).await?;

			Ok(record)
		})
	}

	fn update_oauth_token<'a>(
		&'a self,
		key: &'a str,
		patch: OAuthTokenPatch,
	) -> StoreFuture<'a, OAuthTokenRecord> {
		Box::pin(async move {
			let document = self
				.backend
				.find(OAUTH_TOKEN_COLLECTION, key)
				.await?
				.ok_or_else(|| StoreError::MissingRecord { key: key.into() })?;
			let mut record = decode::<OAuthTokenRecord>(document)?;

			record.apply(patch, OffsetDateTime::now_utc());
			self.backend.upsert(OAUTH_TOKEN_COLLECTION, key, encode(&record)?).await?;

			Ok(record)
		})
	}

	fn flush(&self) -> StoreFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}
}

fn encode<T>(record: &T) -> Result<Value, StoreError>
where
	T: Serialize,
{
	serde_json::to_value(record).map_err(|e| StoreError::Serialization { message: e.to_string() })
}

fn decode<T>(document: Value) -> Result<T, StoreError>
where
	T: DeserializeOwned,
{
	serde_json::from_value(document)
		.map_err(|e| StoreError::Serialization { message: e.to_string() })
}
