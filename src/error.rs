//! Broker-level error types shared across managers, transports, and stores.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const BODY_PREVIEW_LIMIT: usize = 256;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem caught before any network call.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Non-success response or transport failure from the upstream platform.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
	/// Manual refresh budget exhausted; raised locally without a network call.
	#[error(transparent)]
	RateLimit(#[from] RateLimitError),
	/// Expired or absent user session with no valid refresh path.
	#[error(transparent)]
	OAuth(#[from] OAuthError),
}

/// Configuration and validation failures raised while building the broker.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// Application identifier was missing or blank.
	#[error("Application identifier is required.")]
	MissingAppId,
	/// Application secret was missing or blank.
	#[error("Application secret is required.")]
	MissingSecret,
	/// An upstream endpoint URL could not be parsed.
	#[error("Endpoint URL `{endpoint}` is invalid.")]
	InvalidEndpoint {
		/// Endpoint label, e.g. `access_token` or `oauth_refresh`.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Failures reported by (or while talking to) the upstream platform.
///
/// The platform answers most rejections with HTTP 200 plus an `errcode` body,
/// so [`UpstreamError::Api`] is the common case and transport-level variants
/// cover the rest. The broker never retries any of these.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Platform rejected the call with a non-zero `errcode`.
	#[error("Upstream {endpoint} call was rejected with errcode {code}: {message}.")]
	Api {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// Platform `errcode` value.
		code: i64,
		/// Platform `errmsg` value.
		message: String,
	},
	/// Platform answered with a non-success HTTP status.
	#[error("Upstream {endpoint} call returned HTTP {status}.")]
	Status {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// HTTP status code.
		status: u16,
		/// Truncated response body for diagnostics.
		body: String,
	},
	/// Platform answered with JSON the broker could not decode.
	#[error("Upstream {endpoint} call returned malformed JSON.")]
	ResponseParse {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the upstream {endpoint} endpoint.")]
	Network {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl UpstreamError {
	/// Wraps a transport-specific network error for the given endpoint.
	pub fn network(
		endpoint: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}

	/// Builds a [`UpstreamError::Status`] with the body preview truncated.
	pub fn status(endpoint: &'static str, status: u16, body: impl Into<String>) -> Self {
		Self::Status { endpoint, status, body: truncate_preview(body.into()) }
	}
}

/// Raised when the manual token refresh budget for the current window is spent.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Manual refresh budget of {cap} calls per {window} window is exhausted.")]
pub struct RateLimitError {
	/// Maximum charges permitted per window.
	pub cap: u32,
	/// Window length after which the budget resets.
	pub window: Duration,
}

/// Signals that the caller must restart the authorization-code flow.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum OAuthError {
	/// Neither an authorization code nor a cached record was available.
	#[error("No authorization code and no cached token for the session key.")]
	MissingAuthorization,
	/// The cached refresh token was rejected upstream.
	#[error("Token refresh was rejected; restart the authorization flow: {reason}.")]
	ReauthorizeRequired {
		/// Platform-supplied reason string.
		reason: String,
	},
}

fn truncate_preview(mut body: String) -> String {
	if body.len() > BODY_PREVIEW_LIMIT {
		let mut cut = BODY_PREVIEW_LIMIT;

		while !body.is_char_boundary(cut) {
			cut -= 1;
		}

		body.truncate(cut);
		body.push_str("...");
	}

	body
}
