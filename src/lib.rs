//! Rust’s WeChat credential broker—cache global access tokens, sign JS-SDK URLs, and run
//! per-user OAuth sessions over pluggable async stores in one crate built for production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod signature;
pub mod store;
pub mod token;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		broker::Broker,
		config::AppConfig,
		http::ReqwestUpstreamClient,
		store::{CredentialStore, DocumentStore, MemoryBackend},
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestUpstreamClient>;

	/// Builds a reqwest client that accepts the self-signed certificates produced by `httpmock`
	/// during tests.
	pub fn test_reqwest_client() -> ReqwestUpstreamClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestUpstreamClient::with_client(client)
	}

	/// Constructs a [`Broker`] backed by an in-memory document store and the reqwest transport
	/// used across integration tests.
	pub fn build_reqwest_test_broker(config: AppConfig) -> (ReqwestTestBroker, Arc<MemoryBackend>) {
		let backend = Arc::new(MemoryBackend::default());
		let store: Arc<dyn CredentialStore> = Arc::new(DocumentStore::new(backend.clone()));
		let broker = Broker::with_client(config, store, test_reqwest_client());

		(broker, backend)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::Client as ReqwestClient;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
