//! Global access-token and JS-ticket lifecycle management.
//!
//! [`TokenManager`] owns the refresh pipeline: fetch a token, persist it,
//! fetch a ticket with it, persist again. Each step lands in the store as
//! soon as it succeeds, so a ticket failure still leaves the fresh token
//! behind and the retry resumes at the ticket step instead of burning
//! another token call against the account-wide quota.

// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	auth::{GlobalTokenPatch, GlobalTokenRecord},
	config::AppConfig,
	error::RateLimitError,
	http::UpstreamClient,
	obs::{self, FlowKind},
	store::CredentialStore,
};

/// Manages the process-global access token + JS-ticket pair.
pub struct TokenManager<C>
where
	C: ?Sized + UpstreamClient,
{
	config: Arc<AppConfig>,
	store: Arc<dyn CredentialStore>,
	client: Arc<C>,
	budget: Arc<RefreshBudget>,
}
impl<C> TokenManager<C>
where
	C: ?Sized + UpstreamClient,
{
	/// Creates a manager and starts its budget reset task.
	///
	/// Requires a Tokio runtime context when `config.refresh_window` is
	/// positive.
	pub fn new(config: Arc<AppConfig>, store: Arc<dyn CredentialStore>, client: Arc<C>) -> Self {
		let budget = Arc::new(RefreshBudget::new(config.refresh_budget, config.refresh_window));

		Self { config, store, client, budget }
	}

	/// Returns a fresh, complete global record, refreshing first when the
	/// cached one is stale, absent, or still missing its ticket.
	///
	/// Expiry-driven refreshes here are not charged against the manual
	/// budget.
	pub async fn prepare_global_token(&self) -> Result<GlobalTokenRecord> {
		obs::flow(FlowKind::TokenRefresh, "prepare_global_token", async move {
			let cached = <dyn CredentialStore>::global_token(self.store.as_ref())
				.await
				.map_err(Error::from)?;
			let now = OffsetDateTime::now_utc();

			if let Some(record) = cached
				.as_ref()
				.filter(|r| r.is_fresh_at(now, self.config.token_ttl) && r.is_complete())
			{
				return Ok(record.clone());
			}

			self.run_refresh_pipeline(cached, now).await
		})
		.await
	}

	/// Forces a full refresh, charging the manual budget before any network
	/// call.
	pub async fn refresh_global_token(&self) -> Result<GlobalTokenRecord> {
		obs::flow(FlowKind::TokenRefresh, "refresh_global_token", async move {
			self.budget.try_charge()?;

			// Forced refreshes never resume a half-finished record; both
			// fetches run again.
			self.run_refresh_pipeline(None, OffsetDateTime::now_utc()).await
		})
		.await
	}

	/// Stops the budget reset task. The manager stays usable; the budget
	/// simply stops resetting.
	pub fn shutdown(&self) {
		self.budget.shutdown();
	}

	async fn run_refresh_pipeline(
		&self,
		cached: Option<GlobalTokenRecord>,
		now: OffsetDateTime,
	) -> Result<GlobalTokenRecord> {
		let endpoints = &self.config.endpoints;
		// A fresh token whose ticket fetch failed last time resumes at the
		// ticket step.
		let resumed = cached.filter(|r| {
			r.is_fresh_at(now, self.config.token_ttl)
				&& !r.access_token.is_empty()
				&& r.js_ticket.is_empty()
		});
		let record = match resumed {
			Some(record) => record,
			None => {
				let token = self
					.client
					.fetch_access_token(
						&endpoints.access_token,
						&self.config.app_id,
						self.config.secret.expose(),
					)
					.await?;

				<dyn CredentialStore>::update_global_token(
					self.store.as_ref(),
					GlobalTokenPatch { access_token: Some(token.access_token), js_ticket: None },
				)
				.await
				.map_err(Error::from)?
			},
		};
		let ticket = self
			.client
			.fetch_js_ticket(&endpoints.js_ticket, record.access_token.expose())
			.await?;

		<dyn CredentialStore>::update_global_token(
			self.store.as_ref(),
			GlobalTokenPatch { access_token: None, js_ticket: Some(ticket.ticket) },
		)
		.await
		.map_err(Error::from)
	}
}
impl<C> Clone for TokenManager<C>
where
	C: ?Sized + UpstreamClient,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			store: self.store.clone(),
			client: self.client.clone(),
			budget: self.budget.clone(),
		}
	}
}
impl<C> Debug for TokenManager<C>
where
	C: ?Sized + UpstreamClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("app_id", &self.config.app_id)
			.field("token_ttl", &self.config.token_ttl)
			.field("budget", &self.budget)
			.finish()
	}
}

/// Windowed counter guarding the manual refresh path.
///
/// The check and the charge happen under one lock acquisition, so concurrent
/// callers can never exceed the cap within a window.
#[derive(Debug)]
pub struct RefreshBudget {
	cap: u32,
	window: Duration,
	used: Arc<Mutex<u32>>,
	task: Mutex<Option<JoinHandle<()>>>,
}
impl RefreshBudget {
	/// Creates a budget and starts its reset task.
	///
	/// A positive `window` spawns the reset task and therefore requires a
	/// Tokio runtime context; a non-positive window leaves the budget
	/// unresetting.
	pub fn new(cap: u32, window: Duration) -> Self {
		let used = Arc::new(Mutex::new(0));
		let task = window.is_positive().then(|| {
			let used = used.clone();
			let period = window.unsigned_abs();

			tokio::spawn(async move {
				let mut ticker = tokio::time::interval(period);

				// The first tick completes immediately; skip it so the first
				// window runs full length.
				ticker.tick().await;

				loop {
					ticker.tick().await;

					*used.lock() = 0;
				}
			})
		});

		Self { cap, window, used, task: Mutex::new(task) }
	}

	/// Consumes one charge, failing without side effects once the cap is
	/// spent.
	pub fn try_charge(&self) -> Result<(), RateLimitError> {
		let mut used = self.used.lock();

		if *used >= self.cap {
			return Err(RateLimitError { cap: self.cap, window: self.window });
		}

		*used += 1;

		Ok(())
	}

	/// Stops the reset task. Idempotent.
	pub fn shutdown(&self) {
		if let Some(task) = self.task.lock().take() {
			task.abort();
		}
	}
}
impl Drop for RefreshBudget {
	fn drop(&mut self) {
		self.shutdown();
	}
}
