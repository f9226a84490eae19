//! The `ExternalProcessor.Process` gRPC handler: drives one
//! [`PerRequestState`] through the §4.1 state machine for the lifetime of a
//! single HTTP request/response pair (and any retries envoy replays through
//! the same stream). Mirrors the teacher's `mpsc::channel` +
//! `ReceiverStream` pattern for producing an outbound stream, since the
//! teacher never reaches for `async_stream` anywhere in its ext_proc code.

use std::sync::Arc;
use std::time::{Duration, Instant};

use extproc_protos::envoy::config::core::v3::{HeaderValue as ProtoHeaderValue, HeaderValueOption};
use extproc_protos::envoy::service::ext_proc::v3::external_processor_server::ExternalProcessor;
use extproc_protos::envoy::service::ext_proc::v3::processing_request::Request as PReq;
use extproc_protos::envoy::service::ext_proc::v3::processing_response::Response as PResp;
use extproc_protos::envoy::service::ext_proc::v3::{
	BodyResponse, HeadersResponse, HttpBody, HttpHeaders, ProcessingRequest, ProcessingResponse, TrailersResponse,
};
use prost_wkt_types::Struct as ProtoStruct;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

use super::grpc_types::{common_response, diff_header_mutation, header_ops_to_mutation, immediate_response, split_headers};
use super::header_mutator::{apply_first_attempt, apply_retry};
use super::registry::{ProcessorRegistry, RouteKind};
use super::router::RouterSelector;
use super::state::{ModelNames, PerRequestState, StreamState, UsageAccumulator};
use crate::config::store::ConfigStore;
use crate::config::Config;
use crate::error::ProcessorError;
use crate::translate::{build_translator, requires_auth, RequestContext};

const OUTBOUND_CHANNEL_CAPACITY: usize = 16;

/// What a completed (or failed) stream reports to the telemetry layer. Kept
/// as a plain struct so `gateway-app` can wire a real OTel-backed observer in
/// without this module depending on the telemetry crate internals.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
	pub backend: Option<String>,
	pub route: Option<RouteKind>,
	pub status_code: u16,
	pub error_type: Option<&'static str>,
	pub usage: UsageAccumulator,
	pub models: ModelNames,
	pub duration: Duration,
	pub time_to_first_token: Option<Duration>,
	/// Header values mapped to OTel attribute names via
	/// `metricsRequestHeaderAttributes`, captured before the header was
	/// stripped by any mutation policy.
	pub extra_attributes: Vec<(String, String)>,
}

pub trait RequestObserver: Send + Sync {
	fn record_completion(&self, outcome: &RequestOutcome);
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl RequestObserver for NoopObserver {
	fn record_completion(&self, _outcome: &RequestOutcome) {}
}

pub struct ExtProcService {
	config: ConfigStore,
	registry: Arc<ProcessorRegistry>,
	selector: Arc<dyn RouterSelector>,
	observer: Arc<dyn RequestObserver>,
	/// `metricsRequestHeaderAttributes`: `(header name, OTel attribute name)`.
	header_attributes: Arc<[(String, String)]>,
	/// `spanRequestHeaderAttributes`: same shape, logged alongside the request
	/// span rather than recorded on an OTel metric (this crate wires no trace
	/// exporter, only a meter provider, so there is no span to attach to).
	span_attributes: Arc<[(String, String)]>,
}

impl ExtProcService {
	pub fn new(
		config: ConfigStore,
		registry: Arc<ProcessorRegistry>,
		selector: Arc<dyn RouterSelector>,
		observer: Arc<dyn RequestObserver>,
	) -> Self {
		ExtProcService {
			config,
			registry,
			selector,
			observer,
			header_attributes: Arc::from([]),
			span_attributes: Arc::from([]),
		}
	}

	pub fn with_header_attributes(mut self, header_attributes: Vec<(String, String)>) -> Self {
		self.header_attributes = Arc::from(header_attributes);
		self
	}

	pub fn with_span_attributes(mut self, span_attributes: Vec<(String, String)>) -> Self {
		self.span_attributes = Arc::from(span_attributes);
		self
	}
}

#[tonic::async_trait]
impl ExternalProcessor for ExtProcService {
	type ProcessStream = ReceiverStream<Result<ProcessingResponse, Status>>;

	async fn process(
		&self,
		request: Request<Streaming<ProcessingRequest>>,
	) -> Result<Response<Self::ProcessStream>, Status> {
		let mut inbound = request.into_inner();
		let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

		let config = self.config.current();
		let registry = self.registry.clone();
		let selector = self.selector.clone();
		let observer = self.observer.clone();
		let header_attributes = self.header_attributes.clone();
		let span_attributes = self.span_attributes.clone();

		tokio::spawn(async move {
			let mut state: Option<PerRequestState> = None;

			loop {
				let message = match inbound.next().await {
					Some(Ok(message)) => message,
					Some(Err(status)) => {
						debug!(%status, "ext_proc inbound stream error, ending stream");
						record_cancellation(&state, observer.as_ref());
						break;
					},
					None => {
						record_cancellation(&state, observer.as_ref());
						break;
					},
				};

				let keep_going = match message.request {
					Some(PReq::RequestHeaders(hdrs)) => {
						handle_request_headers(
							&mut state,
							hdrs,
							&config,
							&registry,
							selector.as_ref(),
							&tx,
							observer.as_ref(),
							&span_attributes,
						)
						.await
					},
					Some(PReq::RequestBody(body)) => handle_request_body(&mut state, body, &tx, observer.as_ref()).await,
					Some(PReq::RequestTrailers(_)) => {
						send(
							&tx,
							ProcessingResponse {
								response: Some(PResp::RequestTrailers(TrailersResponse { header_mutation: None })),
								dynamic_metadata: None,
								mode_override: None,
							},
						)
						.await;
						true
					},
					Some(PReq::ResponseHeaders(hdrs)) => handle_response_headers(&mut state, hdrs, &tx).await,
					Some(PReq::ResponseBody(body)) => {
						handle_response_body(&mut state, body, &tx, observer.as_ref(), &header_attributes).await
					},
					Some(PReq::ResponseTrailers(_)) => {
						send(
							&tx,
							ProcessingResponse {
								response: Some(PResp::ResponseTrailers(TrailersResponse { header_mutation: None })),
								dynamic_metadata: None,
								mode_override: None,
							},
						)
						.await;
						true
					},
					None => true,
				};

				if !keep_going {
					break;
				}
			}
		});

		Ok(Response::new(ReceiverStream::new(rx)))
	}
}

async fn send(tx: &mpsc::Sender<Result<ProcessingResponse, Status>>, response: ProcessingResponse) {
	if tx.send(Ok(response)).await.is_err() {
		debug!("ext_proc response receiver dropped, downstream likely closed the stream");
	}
}

async fn send_immediate(tx: &mpsc::Sender<Result<ProcessingResponse, Status>>, status: u16, message: String) {
	send(
		tx,
		ProcessingResponse {
			response: Some(PResp::ImmediateResponse(immediate_response(status, message))),
			dynamic_metadata: None,
			mode_override: None,
		},
	)
	.await;
}

/// A stream that ends (client disconnect, proxy deadline) before reaching
/// [`StreamState::Done`] is a cancellation (§6): it still gets a
/// request-completion metric, with `error.type=_OTHER`, so that failed
/// streams aren't invisible to the accountant.
fn record_cancellation(state_slot: &Option<PerRequestState>, observer: &dyn RequestObserver) {
	let Some(state) = state_slot else { return };
	if state.state == StreamState::Done {
		return;
	}
	observer.record_completion(&RequestOutcome {
		backend: state.backend_name.clone(),
		route: state.route,
		status_code: 499,
		error_type: Some("_OTHER"),
		usage: state.usage.clone(),
		models: state.models.clone(),
		duration: state.timing.request_start.elapsed(),
		time_to_first_token: state
			.timing
			.first_token_at
			.map(|at| at.saturating_duration_since(state.timing.request_start)),
		extra_attributes: Vec::new(),
	});
}

/// Builds the completion record for a failed stream (§8 error taxonomy: no
/// matching route, backend unreachable, translate error), reported to the
/// observer right before the matching immediate-response goes out.
fn failure_outcome(state: &PerRequestState, err: &ProcessorError) -> RequestOutcome {
	RequestOutcome {
		backend: state.backend_name.clone(),
		route: state.route,
		status_code: err.status_code(),
		error_type: Some(err.error_type()),
		usage: state.usage.clone(),
		models: state.models.clone(),
		duration: state.timing.request_start.elapsed(),
		time_to_first_token: None,
		extra_attributes: Vec::new(),
	}
}

fn set_path_header(mutation: &mut extproc_protos::envoy::service::ext_proc::v3::HeaderMutation, path: &str) {
	mutation.set_headers.push(HeaderValueOption {
		header: Some(ProtoHeaderValue {
			key: ":path".to_string(),
			value: path.to_string(),
		}),
		append: None,
		append_action: 2,
	});
}

/// Handles the headers phase of either the first attempt or a retry (§4.6):
/// resolves the route and backend, enforces the auth-presence invariant, and
/// applies the backend's configured header-mutation policy.
async fn handle_request_headers(
	state_slot: &mut Option<PerRequestState>,
	hdrs: HttpHeaders,
	config: &Arc<Config>,
	registry: &ProcessorRegistry,
	selector: &dyn RouterSelector,
	tx: &mpsc::Sender<Result<ProcessingResponse, Status>>,
	observer: &dyn RequestObserver,
	span_attributes: &[(String, String)],
) -> bool {
	let proto_headers = hdrs.headers.unwrap_or_default();
	let split = split_headers(&proto_headers);
	let path = split.path.clone().unwrap_or_default();

	let state = state_slot.get_or_insert_with(|| PerRequestState::new(path.clone(), config.clone()));
	state.method = split.method;
	state.authority = split.authority;
	state.request_buffer.clear();

	state.route = registry.lookup(&path);
	if state.route.is_none() {
		let err = ProcessorError::NoMatchingRule;
		observer.record_completion(&failure_outcome(state, &err));
		send_immediate(tx, err.status_code(), format!("no route matched `{path}`")).await;
		return false;
	}

	let backend_name = match selector.select(&split.headers, config) {
		Ok(name) => name,
		Err(err) => {
			observer.record_completion(&failure_outcome(state, &err));
			send_immediate(tx, err.status_code(), err.to_string()).await;
			return false;
		},
	};
	let backend = config
		.backend(&backend_name)
		.expect("router selector only ever returns a name present in the active config");

	if requires_auth(backend.schema) && backend.auth.is_none() {
		let err = ProcessorError::BackendUnreachable(format!("backend `{backend_name}` has no configured credentials"));
		observer.record_completion(&failure_outcome(state, &err));
		send_immediate(tx, err.status_code(), err.to_string()).await;
		return false;
	}

	state.backend_name = Some(backend_name);

	if !span_attributes.is_empty() {
		let resolved: std::collections::BTreeMap<&str, &str> = span_attributes
			.iter()
			.filter_map(|(header, attr)| {
				split
					.headers
					.get(header.as_str())
					.and_then(|v| v.to_str().ok())
					.map(|value| (attr.as_str(), value))
			})
			.collect();
		if !resolved.is_empty() {
			tracing::info!(path = %path, attributes = ?resolved, "request span attributes");
		}
	}

	let before = split.headers.clone();
	let mut mutated = split.headers;
	match &state.original_headers_snapshot {
		Some(original) => {
			state.retry_epoch += 1;
			apply_retry(&mut mutated, original, &backend.header_mutation);
		},
		None => {
			state.original_headers_snapshot = Some(before.clone());
			apply_first_attempt(&mut mutated, &backend.header_mutation);
			state.translator = Some(build_translator(backend));
		},
	}
	state.headers = mutated.clone();
	state.state = StreamState::AwaitReqBody;

	let mutation = diff_header_mutation(&before, &mutated);
	send(
		tx,
		ProcessingResponse {
			response: Some(PResp::RequestHeaders(HeadersResponse {
				response: Some(common_response(Some(mutation), None)),
			})),
			dynamic_metadata: None,
			mode_override: None,
		},
	)
	.await;
	true
}

/// Buffers request body chunks (§4.4: translators operate on the fully
/// buffered body) and, once `end_of_stream`, invokes the stream's translator
/// and rewrites path/headers/body to match the backend's wire format.
async fn handle_request_body(
	state_slot: &mut Option<PerRequestState>,
	body: HttpBody,
	tx: &mpsc::Sender<Result<ProcessingResponse, Status>>,
	observer: &dyn RequestObserver,
) -> bool {
	let Some(state) = state_slot.as_mut() else {
		send_immediate(tx, 400, "request body arrived before request headers".to_string()).await;
		return false;
	};

	state.request_buffer.extend_from_slice(&body.body);
	if !body.end_of_stream {
		send(
			tx,
			ProcessingResponse {
				response: Some(PResp::RequestBody(BodyResponse {
					response: Some(common_response(None, None)),
				})),
				dynamic_metadata: None,
				mode_override: None,
			},
		)
		.await;
		return true;
	}

	let original_model = serde_json::from_slice::<serde_json::Value>(&state.request_buffer)
		.ok()
		.and_then(|v| v.get("model").and_then(|m| m.as_str().map(str::to_string)));
	let model_override = state
		.backend_name
		.as_deref()
		.and_then(|name| state.config.backend(name))
		.and_then(|backend| backend.model_name_override.clone());
	state.models.original = original_model.clone();
	state.models.request_after_override = model_override.clone().or_else(|| original_model.clone());

	let ctx = RequestContext {
		backend_name: state.backend_name.clone().unwrap_or_default(),
		model_name_override: model_override,
		route: state.route,
	};

	let translator = state
		.translator
		.as_mut()
		.expect("translator is built during the request-headers phase");
	let translated = match translator.translate_request(&ctx, &state.request_buffer) {
		Ok(translated) => translated,
		Err(err) => {
			let err = ProcessorError::Translate(err);
			observer.record_completion(&failure_outcome(state, &err));
			send_immediate(tx, err.status_code(), err.to_string()).await;
			return false;
		},
	};

	let mut mutation = header_ops_to_mutation(&translated.header_ops);
	if let Some(path) = &translated.path_override {
		set_path_header(&mut mutation, path);
	}
	if let Some(resolved) = &state.models.request_after_override {
		mutation.set_headers.push(HeaderValueOption {
			header: Some(ProtoHeaderValue {
				key: state.config.model_name_header_key.clone(),
				value: resolved.clone(),
			}),
			append: None,
			append_action: 2,
		});
	}
	state.state = StreamState::AwaitRespHeaders;

	send(
		tx,
		ProcessingResponse {
			response: Some(PResp::RequestBody(BodyResponse {
				response: Some(common_response(Some(mutation), Some(translated.body))),
			})),
			dynamic_metadata: None,
			mode_override: None,
		},
	)
	.await;
	true
}

async fn handle_response_headers(
	state_slot: &mut Option<PerRequestState>,
	_hdrs: HttpHeaders,
	tx: &mpsc::Sender<Result<ProcessingResponse, Status>>,
) -> bool {
	let Some(state) = state_slot.as_mut() else {
		send_immediate(tx, 400, "response headers arrived before request headers".to_string()).await;
		return false;
	};

	let ctx = RequestContext {
		backend_name: state.backend_name.clone().unwrap_or_default(),
		model_name_override: state.models.request_after_override.clone(),
		route: state.route,
	};
	let translator = state
		.translator
		.as_mut()
		.expect("translator is built during the request-headers phase");
	let ops = translator.translate_response_headers(&ctx);
	state.state = StreamState::AwaitRespBody;

	send(
		tx,
		ProcessingResponse {
			response: Some(PResp::ResponseHeaders(HeadersResponse {
				response: Some(common_response(Some(header_ops_to_mutation(&ops)), None)),
			})),
			dynamic_metadata: None,
			mode_override: None,
		},
	)
	.await;
	true
}

/// Feeds each response body chunk to the translator (which owns its own
/// restart buffer, §9) and republishes every emitted frame. On the final
/// chunk, finalizes the usage accounting and reports the completed outcome.
async fn handle_response_body(
	state_slot: &mut Option<PerRequestState>,
	body: HttpBody,
	tx: &mpsc::Sender<Result<ProcessingResponse, Status>>,
	observer: &dyn RequestObserver,
	header_attributes: &[(String, String)],
) -> bool {
	let Some(state) = state_slot.as_mut() else {
		send_immediate(tx, 400, "response body arrived before request headers".to_string()).await;
		return false;
	};

	if state.timing.first_token_at.is_none() && !body.body.is_empty() {
		state.timing.first_token_at = Some(Instant::now());
	}

	let translator = state
		.translator
		.as_mut()
		.expect("translator is built during the request-headers phase");
	let feed = match translator.feed_response_body(&body.body, body.end_of_stream) {
		Ok(feed) => feed,
		Err(err) => {
			let err = ProcessorError::Translate(err);
			observer.record_completion(&failure_outcome(state, &err));
			send_immediate(tx, err.status_code(), err.to_string()).await;
			return false;
		},
	};

	if let Some(input) = feed.usage.input_tokens {
		state.usage.input_tokens = input;
	}
	if let Some(cached) = feed.usage.cached_input_tokens {
		state.usage.cached_input_tokens = cached;
	}
	if let Some(output) = feed.usage.output_tokens {
		state.usage.observe_output_tokens(output);
	}
	if let Some(model) = feed.usage.response_model {
		state.models.response_actual = Some(model);
	}

	let new_body: Vec<u8> = feed.frames.into_iter().flatten().collect();
	let dynamic_metadata = body.end_of_stream.then(|| {
		usage_dynamic_metadata(
			&state.config,
			&state.usage,
			state.models.request_after_override.as_deref().unwrap_or(""),
			state.backend_name.as_deref().unwrap_or(""),
		)
	});

	send(
		tx,
		ProcessingResponse {
			response: Some(PResp::ResponseBody(BodyResponse {
				response: Some(common_response(None, Some(new_body))),
			})),
			dynamic_metadata,
			mode_override: None,
		},
	)
	.await;

	if body.end_of_stream {
		state.state = StreamState::Done;
		let extra_attributes = header_attributes
			.iter()
			.filter_map(|(header, attribute)| {
				state
					.headers
					.get(header.as_str())
					.and_then(|v| v.to_str().ok())
					.map(|v| (attribute.clone(), v.to_string()))
			})
			.collect();
		observer.record_completion(&RequestOutcome {
			backend: state.backend_name.clone(),
			route: state.route,
			status_code: 200,
			error_type: None,
			usage: state.usage.clone(),
			models: state.models.clone(),
			duration: state.timing.request_start.elapsed(),
			time_to_first_token: state
				.timing
				.first_token_at
				.map(|at| at.saturating_duration_since(state.timing.request_start)),
			extra_attributes,
		});
	}
	true
}

/// Publishes the running token counts, plus every `llmRequestCosts` entry
/// that evaluated cleanly, under `config.metadata_namespace` as dynamic
/// metadata (§4.5).
fn usage_dynamic_metadata(config: &Config, usage: &UsageAccumulator, model: &str, backend: &str) -> ProtoStruct {
	let mut inner = serde_json::Map::new();
	inner.insert("input_tokens".to_string(), serde_json::json!(usage.input_tokens));
	inner.insert("output_tokens".to_string(), serde_json::json!(usage.output_tokens));
	inner.insert(
		"cached_input_tokens".to_string(),
		serde_json::json!(usage.cached_input_tokens),
	);

	let vars = crate::telemetry::cost::CostVars {
		model,
		backend,
		input_tokens: usage.input_tokens,
		cached_input_tokens: usage.cached_input_tokens,
		output_tokens: usage.output_tokens,
	};
	for (metadata_key, value) in config.cost_evaluator.evaluate(&vars) {
		inner.insert(metadata_key, serde_json::json!(value));
	}

	let mut outer = serde_json::Map::new();
	outer.insert(config.metadata_namespace.clone(), serde_json::Value::Object(inner));
	serde_json::from_value(serde_json::Value::Object(outer)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn noop_observer_does_not_panic() {
		let observer = NoopObserver;
		observer.record_completion(&RequestOutcome {
			backend: Some("b".to_string()),
			route: Some(RouteKind::ChatCompletions),
			status_code: 200,
			error_type: None,
			usage: UsageAccumulator::default(),
			models: ModelNames::default(),
			duration: Duration::from_millis(1),
			time_to_first_token: None,
			extra_attributes: Vec::new(),
		});
	}
}
