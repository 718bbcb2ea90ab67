//! Persisted credential records and the patches that update them in place.

// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Singleton record holding the application-wide access token and JS ticket.
///
/// Both credentials share one `modify_date`; freshness is always judged for
/// the pair, never per field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTokenRecord {
	/// Application-wide API access token.
	pub access_token: TokenSecret,
	/// JS-API ticket derived from the access token.
	pub js_ticket: TokenSecret,
	/// Instant of the last successful refresh of either credential.
	#[serde(with = "time::serde::rfc3339")]
	pub modify_date: OffsetDateTime,
}
impl GlobalTokenRecord {
	/// Creates an empty record stamped at `now`.
	///
	/// Used when a refresh starts from a store that has never held a token.
	pub fn bootstrap(now: OffsetDateTime) -> Self {
		Self {
			access_token: TokenSecret::default(),
			js_ticket: TokenSecret::default(),
			modify_date: now,
		}
	}

	/// Whether the record was refreshed within `ttl` of `instant`.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, ttl: Duration) -> bool {
		instant - self.modify_date < ttl
	}

	/// Whether both credentials are populated.
	///
	/// A fresh but incomplete record marks a refresh that persisted the token
	/// and then failed before the ticket arrived; the retry resumes at the
	/// ticket step.
	pub fn is_complete(&self) -> bool {
		!self.access_token.is_empty() && !self.js_ticket.is_empty()
	}

	/// Merges `patch` into the record and stamps `modify_date` with `now`.
	pub fn apply(&mut self, patch: GlobalTokenPatch, now: OffsetDateTime) {
		if let Some(access_token) = patch.access_token {
			self.access_token = access_token;
		}
		if let Some(js_ticket) = patch.js_ticket {
			self.js_ticket = js_ticket;
		}

		self.modify_date = now;
	}
}

/// Partial update for the global token record.
///
/// `None` fields keep their stored value; the store stamps `modify_date`
/// itself on every apply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalTokenPatch {
	/// Replacement access token, if the token step succeeded.
	pub access_token: Option<TokenSecret>,
	/// Replacement JS ticket, if the ticket step succeeded.
	pub js_ticket: Option<TokenSecret>,
}
impl GlobalTokenPatch {
	/// Patch carrying only a new access token.
	pub fn access_token(token: impl Into<String>) -> Self {
		Self { access_token: Some(TokenSecret::new(token)), ..Default::default() }
	}

	/// Patch carrying only a new JS ticket.
	pub fn js_ticket(ticket: impl Into<String>) -> Self {
		Self { js_ticket: Some(TokenSecret::new(ticket)), ..Default::default() }
	}
}

/// Cached signature for one normalized URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
	/// Normalized page URL the signature was computed for.
	pub url: String,
	/// Name assigned at creation, the normalized URL by default; never
	/// renamed afterwards.
	pub signature_name: String,
	/// Random nonce used in the canonical string.
	pub nonce_str: String,
	/// Unix timestamp (seconds) used in the canonical string.
	pub timestamp: i64,
	/// Hex-encoded SHA-1 over the canonical string.
	pub signature: String,
	/// Ticket the signature was derived from.
	pub js_ticket: TokenSecret,
	/// Access token current at derivation time.
	pub access_token: TokenSecret,
	/// Instant the record was first created.
	#[serde(with = "time::serde::rfc3339")]
	pub create_date: OffsetDateTime,
	/// Instant of the last recomputation.
	#[serde(with = "time::serde::rfc3339")]
	pub modify_date: OffsetDateTime,
}
impl SignatureRecord {
	/// Whether the signature was recomputed within `ttl` of `instant`.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, ttl: Duration) -> bool {
		instant - self.modify_date < ttl
	}

	/// Merges `patch` into the record, preserving `create_date` and stamping
	/// `modify_date` with `now`.
	pub fn apply(&mut self, patch: SignaturePatch, now: OffsetDateTime) {
		if let Some(nonce_str) = patch.nonce_str {
			self.nonce_str = nonce_str;
		}
		if let Some(timestamp) = patch.timestamp {
			self.timestamp = timestamp;
		}
		if let Some(signature) = patch.signature {
			self.signature = signature;
		}
		if let Some(js_ticket) = patch.js_ticket {
			self.js_ticket = js_ticket;
		}
		if let Some(access_token) = patch.access_token {
			self.access_token = access_token;
		}

		self.modify_date = now;
	}
}

/// Partial update for a cached signature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignaturePatch {
	/// Replacement nonce.
	pub nonce_str: Option<String>,
	/// Replacement timestamp.
	pub timestamp: Option<i64>,
	/// Replacement signature digest.
	pub signature: Option<String>,
	/// Ticket the recomputation used.
	pub js_ticket: Option<TokenSecret>,
	/// Access token current at recomputation time.
	pub access_token: Option<TokenSecret>,
}

/// Client-safe projection of a [`SignatureRecord`].
///
/// This is the exact shape handed to the browser-side JS-API config call;
/// credentials never appear here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePayload {
	/// Application identifier.
	pub app_id: String,
	/// Unix timestamp (seconds) the signature was computed with.
	pub timestamp: i64,
	/// Nonce the signature was computed with.
	pub nonce_str: String,
	/// Hex-encoded SHA-1 signature.
	pub signature: String,
	/// Normalized URL the signature covers.
	pub url: String,
}
impl SignaturePayload {
	/// Projects a stored record into the client-safe shape.
	///
	/// `None` yields the all-empty payload so callers always receive the same
	/// structure.
	pub fn filter(record: Option<&SignatureRecord>, app_id: &str) -> Self {
		record
			.map(|r| Self {
				app_id: app_id.into(),
				timestamp: r.timestamp,
				nonce_str: r.nonce_str.clone(),
				signature: r.signature.clone(),
				url: r.url.clone(),
			})
			.unwrap_or_default()
	}

	/// Whether the payload carries no signature.
	pub fn is_empty(&self) -> bool {
		self.signature.is_empty()
	}
}

/// Per-user OAuth token pair keyed by its originating authorization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokenRecord {
	/// Lookup key, the `openid` of the authorizing user.
	pub key: String,
	/// Short-lived user access token.
	pub access_token: TokenSecret,
	/// Long-lived refresh token.
	pub refresh_token: TokenSecret,
	/// Authorizing user's `openid`.
	pub openid: String,
	/// Granted scope, when the upstream reported one.
	pub scope: Option<String>,
	/// Upstream-reported lifetime in seconds.
	pub expires_in: i64,
	/// Absolute expiry, already shortened by the safety margin.
	#[serde(with = "time::serde::rfc3339")]
	pub expiration_time: OffsetDateTime,
	/// Instant the authorization was first exchanged.
	#[serde(with = "time::serde::rfc3339")]
	pub create_date: OffsetDateTime,
	/// Instant of the last refresh.
	#[serde(with = "time::serde::rfc3339")]
	pub modify_date: OffsetDateTime,
}
impl OAuthTokenRecord {
	/// Margin subtracted from upstream lifetimes so a token is never handed
	/// out in its final seconds.
	pub const EXPIRY_SAFETY_MARGIN: Duration = Duration::seconds(60);

	/// Computes the absolute expiry for a token issued at `issued_at`.
	pub fn expiration_for(issued_at: OffsetDateTime, expires_in: i64) -> OffsetDateTime {
		issued_at + Duration::seconds(expires_in) - Self::EXPIRY_SAFETY_MARGIN
	}

	/// Whether the access token is still usable at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expiration_time
	}

	/// Merges `patch` into the record, preserving `create_date` and stamping
	/// `modify_date` with `now`.
	pub fn apply(&mut self, patch: OAuthTokenPatch, now: OffsetDateTime) {
		if let Some(access_token) = patch.access_token {
			self.access_token = access_token;
		}
		if let Some(refresh_token) = patch.refresh_token {
			self.refresh_token = refresh_token;
		}
		if let Some(scope) = patch.scope {
			self.scope = Some(scope);
		}
		if let Some(expires_in) = patch.expires_in {
			self.expires_in = expires_in;
			self.expiration_time = Self::expiration_for(now, expires_in);
		}

		self.modify_date = now;
	}
}

/// Partial update for a per-user OAuth record, produced by the refresh flow.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OAuthTokenPatch {
	/// Replacement access token.
	pub access_token: Option<TokenSecret>,
	/// Replacement refresh token, when the upstream rotated it.
	pub refresh_token: Option<TokenSecret>,
	/// Replacement scope.
	pub scope: Option<String>,
	/// Replacement lifetime; applying it recomputes `expiration_time`.
	pub expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn global_token_freshness_respects_the_ttl_boundary() {
		let record = GlobalTokenRecord {
			access_token: TokenSecret::new("token"),
			js_ticket: TokenSecret::new("ticket"),
			modify_date: datetime!(2024-05-01 10:00 UTC),
		};
		let ttl = Duration::minutes(119);

		assert!(record.is_fresh_at(datetime!(2024-05-01 11:58 UTC), ttl));
		// Exactly at the TTL counts as stale.
		assert!(!record.is_fresh_at(datetime!(2024-05-01 11:59 UTC), ttl));
	}

	#[test]
	fn bootstrap_records_are_incomplete() {
		let record = GlobalTokenRecord::bootstrap(datetime!(2024-05-01 10:00 UTC));

		assert!(!record.is_complete());

		let mut with_token = record;

		with_token.apply(GlobalTokenPatch::access_token("t"), datetime!(2024-05-01 10:00:01 UTC));

		assert!(!with_token.is_complete());

		with_token.apply(GlobalTokenPatch::js_ticket("j"), datetime!(2024-05-01 10:00:02 UTC));

		assert!(with_token.is_complete());
		assert_eq!(with_token.modify_date, datetime!(2024-05-01 10:00:02 UTC));
	}

	#[test]
	fn signature_patch_preserves_create_date() {
		let created = datetime!(2024-05-01 09:00 UTC);
		let mut record = SignatureRecord {
			url: "https://example.com/page".into(),
			signature_name: "jsapi".into(),
			nonce_str: "n1".into(),
			timestamp: 1_714_554_000,
			signature: "old".into(),
			js_ticket: TokenSecret::new("ticket-1"),
			access_token: TokenSecret::new("token-1"),
			create_date: created,
			modify_date: created,
		};
		let refreshed = datetime!(2024-05-01 12:00 UTC);

		record.apply(
			SignaturePatch {
				nonce_str: Some("n2".into()),
				timestamp: Some(1_714_564_800),
				signature: Some("new".into()),
				js_ticket: Some(TokenSecret::new("ticket-2")),
				access_token: Some(TokenSecret::new("token-2")),
			},
			refreshed,
		);

		assert_eq!(record.create_date, created);
		assert_eq!(record.modify_date, refreshed);
		assert_eq!(record.signature, "new");
		assert_eq!(record.nonce_str, "n2");
	}

	#[test]
	fn oauth_expiry_applies_the_safety_margin() {
		let issued = datetime!(2024-05-01 10:00 UTC);
		let expiry = OAuthTokenRecord::expiration_for(issued, 7_200);

		assert_eq!(expiry, datetime!(2024-05-01 11:59 UTC));

		let record = OAuthTokenRecord {
			key: "openid-1".into(),
			access_token: TokenSecret::new("a"),
			refresh_token: TokenSecret::new("r"),
			openid: "openid-1".into(),
			scope: Some("snsapi_userinfo".into()),
			expires_in: 7_200,
			expiration_time: expiry,
			create_date: issued,
			modify_date: issued,
		};

		assert!(record.is_valid_at(datetime!(2024-05-01 11:58:59 UTC)));
		assert!(!record.is_valid_at(datetime!(2024-05-01 11:59 UTC)));
	}

	#[test]
	fn oauth_patch_recomputes_expiry_from_apply_time() {
		let issued = datetime!(2024-05-01 10:00 UTC);
		let mut record = OAuthTokenRecord {
			key: "openid-1".into(),
			access_token: TokenSecret::new("a1"),
			refresh_token: TokenSecret::new("r1"),
			openid: "openid-1".into(),
			scope: None,
			expires_in: 7_200,
			expiration_time: OAuthTokenRecord::expiration_for(issued, 7_200),
			create_date: issued,
			modify_date: issued,
		};
		let refreshed = datetime!(2024-05-01 11:30 UTC);

		record.apply(
			OAuthTokenPatch {
				access_token: Some(TokenSecret::new("a2")),
				refresh_token: Some(TokenSecret::new("r2")),
				scope: None,
				expires_in: Some(7_200),
			},
			refreshed,
		);

		assert_eq!(record.expiration_time, datetime!(2024-05-01 13:29 UTC));
		assert_eq!(record.create_date, issued);
		assert_eq!(record.modify_date, refreshed);
	}

	#[test]
	fn payload_filter_handles_missing_records() {
		let empty = SignaturePayload::filter(None, "wx-app");

		assert!(empty.is_empty());
		assert_eq!(empty, SignaturePayload::default());

		let record = SignatureRecord {
			url: "https://example.com/page".into(),
			signature_name: "jsapi".into(),
			nonce_str: "abc".into(),
			timestamp: 1_714_554_000,
			signature: "deadbeef".into(),
			js_ticket: TokenSecret::new("ticket"),
			access_token: TokenSecret::new("token"),
			create_date: datetime!(2024-05-01 09:00 UTC),
			modify_date: datetime!(2024-05-01 09:00 UTC),
		};
		let payload = SignaturePayload::filter(Some(&record), "wx-app");

		assert!(!payload.is_empty());
		assert_eq!(payload.app_id, "wx-app");
		assert_eq!(payload.signature, "deadbeef");
		// Credentials must never leak into the payload shape.
		assert!(!serde_json::to_string(&payload)
			.expect("Payload should serialize.")
			.contains("ticket"));
	}
}
