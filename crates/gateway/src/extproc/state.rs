//! Per-stream state carried across the lifetime of one ExtProc gRPC call.

use std::sync::Arc;
use std::time::Instant;

use http::HeaderMap;

use crate::config::Config;
use crate::extproc::registry::RouteKind;
use crate::translate::Translator;

/// Where a stream currently sits in the request/response message sequence
/// (§4.1). Trailers and immediate-responses are terminal shortcuts from any
/// state, so they are not modeled as distinct states here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
	AwaitReqHeaders,
	AwaitReqBody,
	AwaitRespHeaders,
	AwaitRespBody,
	Done,
}

/// The three values a model name can take over the life of a request,
/// tracked so the accountant can report `gen_ai.original.model`,
/// `gen_ai.request.model`, and `gen_ai.response.model` distinctly.
#[derive(Debug, Clone, Default)]
pub struct ModelNames {
	pub original: Option<String>,
	pub request_after_override: Option<String>,
	pub response_actual: Option<String>,
}

/// Cumulative token counts observed across a streaming or non-streaming
/// response. `output_tokens` is a running maximum (§3 invariant); it is
/// never decreased by a later, smaller report.
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
	pub input_tokens: u64,
	pub cached_input_tokens: u64,
	pub output_tokens: u64,
}

impl UsageAccumulator {
	pub fn observe_output_tokens(&mut self, reported: u64) {
		self.output_tokens = self.output_tokens.max(reported);
	}
}

/// Timing marks used by the token/latency accountant (§4.5).
#[derive(Debug, Clone)]
pub struct Timing {
	pub request_start: Instant,
	pub first_token_at: Option<Instant>,
}

impl Timing {
	pub fn new() -> Self {
		Timing {
			request_start: Instant::now(),
			first_token_at: None,
		}
	}
}

/// Full per-request state, created when request-headers arrive and dropped
/// when the stream completes.
pub struct PerRequestState {
	pub state: StreamState,
	pub method: Option<String>,
	pub authority: Option<String>,
	pub original_path: String,
	pub route: Option<RouteKind>,
	pub headers: HeaderMap,
	pub models: ModelNames,
	pub backend_name: Option<String>,
	pub translator: Option<Box<dyn Translator>>,
	pub request_buffer: Vec<u8>,
	pub response_buffer: Vec<u8>,
	pub usage: UsageAccumulator,
	pub timing: Timing,
	pub retry_epoch: u32,
	pub original_headers_snapshot: Option<HeaderMap>,
	pub config: Arc<Config>,
}

impl PerRequestState {
	pub fn new(original_path: String, config: Arc<Config>) -> Self {
		PerRequestState {
			state: StreamState::AwaitReqHeaders,
			method: None,
			authority: None,
			original_path,
			route: None,
			headers: HeaderMap::new(),
			models: ModelNames::default(),
			backend_name: None,
			translator: None,
			request_buffer: Vec::new(),
			response_buffer: Vec::new(),
			usage: UsageAccumulator::default(),
			timing: Timing::new(),
			retry_epoch: 0,
			original_headers_snapshot: None,
			config,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn output_tokens_is_monotone_nondecreasing() {
		let mut usage = UsageAccumulator::default();
		usage.observe_output_tokens(5);
		usage.observe_output_tokens(3);
		assert_eq!(usage.output_tokens, 5);
		usage.observe_output_tokens(9);
		assert_eq!(usage.output_tokens, 9);
	}
}
