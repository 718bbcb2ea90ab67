// std
use std::sync::Arc;
// crates.io
use time::macros::datetime;
// self
use wechat_broker::{
	auth::{GlobalTokenPatch, OAuthTokenPatch, SignaturePatch, SignatureRecord, TokenSecret},
	store::{
		CredentialStore, DocumentBackend, DocumentStore, MemoryBackend, StoreError,
		document::GLOBAL_TOKEN_COLLECTION,
	},
};

fn build_signature_record(url: &str) -> SignatureRecord {
	let created = datetime!(2026-02-10 12:00 UTC);

	SignatureRecord {
		url: url.into(),
		signature_name: url.into(),
		nonce_str: "n456".into(),
		timestamp: 1_400_000_000,
		signature: "8507242a95ad8fb5ea3037f7cf3f29c8fac7fc02".into(),
		js_ticket: TokenSecret::new("t123"),
		access_token: TokenSecret::new("token-1"),
		create_date: created,
		modify_date: created,
	}
}

#[tokio::test]
async fn save_and_fetch_round_trip() {
	let store = DocumentStore::new(Arc::new(MemoryBackend::default()));
	let record = build_signature_record("https://shop.example.com/cart");

	store.save_signature(record.clone()).await.expect("Signature save should succeed.");

	let fetched = store
		.signature("https://shop.example.com/cart")
		.await
		.expect("Signature fetch should succeed.")
		.expect("Saved signature should be present.");

	assert_eq!(fetched, record);
	assert!(
		store
			.signature_exists("https://shop.example.com/cart")
			.await
			.expect("Existence check should succeed.")
	);
	assert!(
		!store
			.signature_exists("https://other.example.com")
			.await
			.expect("Existence check should succeed.")
	);
}

#[tokio::test]
async fn latest_global_token_merges_partial_patches() {
	let store = DocumentStore::new(Arc::new(MemoryBackend::default()));

	store
		.update_global_token(GlobalTokenPatch::access_token("token-a"))
		.await
		.expect("Token patch should succeed.");

	let record = store
		.update_global_token(GlobalTokenPatch::js_ticket("ticket-a"))
		.await
		.expect("Ticket patch should succeed.");

	assert_eq!(record.access_token.expose(), "token-a");
	assert_eq!(record.js_ticket.expose(), "ticket-a");

	let latest = store
		.global_token()
		.await
		.expect("Global token read should succeed.")
		.expect("Patched record should be present.");

	assert_eq!(latest, record);
}

#[tokio::test]
async fn global_token_history_is_capped() {
	let backend = Arc::new(MemoryBackend::default());
	let store = DocumentStore::new(backend.clone()).max_token_history(2);

	for index in 0..4 {
		store
			.update_global_token(GlobalTokenPatch::access_token(format!("token-{index}")))
			.await
			.expect("Global token update should succeed.");
	}

	assert_eq!(backend.count(GLOBAL_TOKEN_COLLECTION).await.expect("Count should succeed."), 2);

	let latest = store
		.global_token()
		.await
		.expect("Global token read should succeed.")
		.expect("Latest record should survive eviction.");

	assert_eq!(latest.access_token.expose(), "token-3");
}

#[tokio::test]
async fn missing_records_reject_partial_updates() {
	let store = DocumentStore::new(Arc::new(MemoryBackend::default()));
	let err = store
		.update_signature("https://missing.example.com", SignaturePatch::default())
		.await
		.expect_err("Updating an absent signature should fail.");

	assert!(matches!(err, StoreError::MissingRecord { .. }));

	let err = store
		.update_oauth_token("missing-key", OAuthTokenPatch::default())
		.await
		.expect_err("Updating an absent session should fail.");

	assert!(matches!(err, StoreError::MissingRecord { .. }));
}
