//! Optional observability helpers for broker flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to run each flow inside a span named `wechat_broker.flow` with the `flow`
//!   (credential flow) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `wechat_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

// self
use crate::_prelude::*;

/// Credential flow kinds observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Global access-token + JS-ticket refresh pipeline.
	TokenRefresh,
	/// URL signature derivation.
	Signature,
	/// OAuth authorization-code exchange.
	CodeExchange,
	/// OAuth token refresh.
	OAuthRefresh,
	/// User profile fetch.
	Profile,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::TokenRefresh => "token_refresh",
			FlowKind::Signature => "signature",
			FlowKind::CodeExchange => "code_exchange",
			FlowKind::OAuthRefresh => "oauth_refresh",
			FlowKind::Profile => "profile",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"wechat_broker_flow_total",
		"flow" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Runs `future` as one observed flow attempt.
///
/// Counts the attempt and its outcome, and polls the future inside the flow
/// span when tracing is enabled.
pub async fn flow<T, F>(kind: FlowKind, stage: &'static str, future: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	record_flow_outcome(kind, FlowOutcome::Attempt);

	#[cfg(not(feature = "tracing"))]
	let _ = stage;
	#[cfg(feature = "tracing")]
	let future = {
		use tracing::Instrument;

		future.instrument(tracing::info_span!("wechat_broker.flow", flow = kind.as_str(), stage))
	};
	let result = future.await;

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}
