//! Storage contracts and built-in credential store implementations.

pub mod document;
pub mod file;
pub mod memory;

pub use document::{DocumentBackend, DocumentStore};
pub use file::FileBackedStore;
pub use memory::MemoryBackend;

// self
use crate::{
	_prelude::*,
	auth::{
		GlobalTokenPatch, GlobalTokenRecord, OAuthTokenPatch, OAuthTokenRecord, SignaturePatch,
		SignatureRecord,
	},
};

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract implemented by credential stores.
///
/// Implementations are pure storage. Freshness checks, refresh pipelines, and
/// rate limiting live in the managers calling this trait; a store only merges,
/// stamps dates, and persists.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Fetches the global token record, if one has ever been persisted.
	fn global_token(&self) -> StoreFuture<'_, Option<GlobalTokenRecord>>;

	/// Merges the patch into the stored record (or an empty bootstrap record),
	/// stamps `modify_date`, persists, and returns the merged record.
	fn update_global_token(&self, patch: GlobalTokenPatch) -> StoreFuture<'_, GlobalTokenRecord>;

	/// Checks whether a signature record exists for the normalized URL.
	fn signature_exists<'a>(&'a self, url: &'a str) -> StoreFuture<'a, bool>;

	/// Fetches the signature record for the normalized URL, if present.
	fn signature<'a>(&'a self, url: &'a str) -> StoreFuture<'a, Option<SignatureRecord>>;

	/// Inserts or replaces the signature record keyed by `record.url`.
	fn save_signature(&self, record: SignatureRecord) -> StoreFuture<'_, SignatureRecord>;

	/// Merges the patch into the stored record, preserving `url`,
	/// `signature_name`, and `create_date`.
	fn update_signature<'a>(
		&'a self,
		url: &'a str,
		patch: SignaturePatch,
	) -> StoreFuture<'a, SignatureRecord>;

	/// Fetches the OAuth token record for the key, if present.
	fn oauth_token<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<OAuthTokenRecord>>;

	/// Inserts or replaces the OAuth token record keyed by `record.key`.
	fn save_oauth_token(&self, record: OAuthTokenRecord) -> StoreFuture<'_, OAuthTokenRecord>;

	/// Merges the patch into the stored record, preserving `create_date`.
	fn update_oauth_token<'a>(
		&'a self,
		key: &'a str,
		patch: OAuthTokenPatch,
	) -> StoreFuture<'a, OAuthTokenRecord>;

	/// Forces durable persistence of any buffered state. Idempotent and safe
	/// to call during shutdown.
	fn flush(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced while encoding or decoding records.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A partial update targeted a record that does not exist.
	#[error("No stored record for key: {key}.")]
	MissingRecord {
		/// Lookup key that failed to resolve.
		key: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let crate_error: Error = store_error.clone().into();

		assert!(matches!(crate_error, Error::Storage(_)));
		assert!(crate_error.to_string().contains("database unreachable"));

		let source = StdError::source(&crate_error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn missing_record_error_names_the_key() {
		let error = StoreError::MissingRecord { key: "https://example.com/page".into() };

		assert_eq!(error.to_string(), "No stored record for key: https://example.com/page.");
	}
}
