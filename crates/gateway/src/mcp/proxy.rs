//! The MCP proxy's HTTP surface (§4.8): JSON-RPC 2.0 forwarded to a single
//! named upstream per session, POST for request/notification delivery, GET
//! to establish a legacy SSE stream, DELETE to tear a session down.
//! Grounded on the teacher's `mcp::streamablehttp::StreamableHttpService`,
//! scoped down to this crate's single-upstream-per-session model.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use rmcp::model::{ClientJsonRpcMessage, ClientNotification, ClientRequest};
use rmcp::transport::common::http_header::{EVENT_STREAM_MIME_TYPE, HEADER_SESSION_ID, JSON_MIME_TYPE};
use tracing::{debug, warn};

use super::crypto::SessionEncoder;
use super::metrics::{CapabilityKind, CapabilityLabels, CapabilitySide, McpMetrics, MethodLabels, UpstreamLabels};
use super::session::{NegotiatedCapabilities, SessionManager};
use super::McpError;
use crate::config::store::ConfigStore;

#[derive(Clone)]
pub struct McpApp {
	config: ConfigStore,
	sessions: Arc<SessionManager>,
	metrics: Arc<McpMetrics>,
	http: reqwest::Client,
	write_timeout: Duration,
}

impl McpApp {
	pub fn new(config: ConfigStore, encryption_seeds: Vec<String>, metrics: Arc<McpMetrics>, write_timeout: Duration) -> Self {
		McpApp {
			config,
			sessions: Arc::new(SessionManager::new(Arc::new(SessionEncoder::new(&encryption_seeds)))),
			metrics,
			http: reqwest::Client::new(),
			write_timeout,
		}
	}

	pub fn router(&self) -> Router {
		Router::new()
			.route("/{upstream}", post(handle_post).get(handle_get).delete(handle_delete))
			.with_state(self.clone())
	}

	async fn handle_post(&self, upstream_name: &str, headers: HeaderMap, body: Bytes) -> Result<Response, McpError> {
		let content_type_ok = headers
			.get(CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.is_some_and(|v| v.starts_with(JSON_MIME_TYPE));
		if !content_type_ok {
			return Err(McpError::InvalidContentType);
		}

		let config = self.config.current();
		let target = config
			.mcp
			.upstreams
			.get(upstream_name)
			.ok_or_else(|| McpError::UnknownUpstream(upstream_name.to_string()))?
			.target
			.clone();

		let message: ClientJsonRpcMessage = serde_json::from_slice(&body)?;
		let method = describe_method(&message);
		let is_initialize = matches!(
			&message,
			ClientJsonRpcMessage::Request(r) if matches!(&r.request, ClientRequest::InitializeRequest(_))
		);

		let session_id_header = headers.get(HEADER_SESSION_ID).and_then(|v| v.to_str().ok());
		let session = match session_id_header {
			Some(id) => self.sessions.get_or_resume(id).ok_or(McpError::UnknownSession)?,
			None if is_initialize => self.sessions.start(upstream_name.to_string()),
			None => return Err(McpError::SessionIdRequired),
		};

		if let Some(method) = &method {
			self
				.metrics
				.method_count
				.get_or_create(&MethodLabels {
					upstream: upstream_name.to_string(),
					method: method.clone(),
				})
				.inc();
		}

		let started = Instant::now();
		let mut request = self
			.http
			.post(target)
			.timeout(self.write_timeout)
			.header(CONTENT_TYPE, JSON_MIME_TYPE)
			.header(ACCEPT, format!("{JSON_MIME_TYPE}, {EVENT_STREAM_MIME_TYPE}"))
			.body(body.to_vec());
		if let Some(upstream_session_id) = session.upstream_session_id() {
			request = request.header(HEADER_SESSION_ID, upstream_session_id);
		}

		let upstream_response = request.send().await?;
		let elapsed = started.elapsed();
		self
			.metrics
			.request_duration
			.get_or_create(&MethodLabels {
				upstream: upstream_name.to_string(),
				method: method.clone().unwrap_or_default(),
			})
			.observe(elapsed.as_secs_f64());

		if let Some(new_upstream_session_id) = upstream_response
			.headers()
			.get(HEADER_SESSION_ID)
			.and_then(|v| v.to_str().ok())
		{
			session.set_upstream_session_id(Some(new_upstream_session_id.to_string()));
		}

		let status = upstream_response.status();
		let content_type = upstream_response.headers().get(CONTENT_TYPE).cloned();
		let body = upstream_response.bytes().await?;

		let session = if is_initialize {
			self.metrics.init_duration.get_or_create(&UpstreamLabels {
				upstream: upstream_name.to_string(),
			}).observe(elapsed.as_secs_f64());

			let caps = extract_capabilities(&body);
			session.mark_initialized(caps.clone());
			record_capability_metrics(&self.metrics, upstream_name, &caps);
			self.sessions.finalize(session)
		} else {
			session
		};

		let mut response = Response::builder().status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));
		if let Some(content_type) = content_type {
			response = response.header(CONTENT_TYPE, content_type);
		}
		if is_initialize {
			response = response.header(HEADER_SESSION_ID, session.id.as_ref());
		}
		Ok(response.body(axum::body::Body::from(body)).expect("response with a validated status and headers"))
	}

	async fn handle_get(&self, upstream_name: &str, headers: HeaderMap) -> Result<Response, McpError> {
		let accepts_sse = headers
			.get(ACCEPT)
			.and_then(|v| v.to_str().ok())
			.is_some_and(|v| v.contains(EVENT_STREAM_MIME_TYPE));
		if !accepts_sse {
			return Err(McpError::InvalidContentType);
		}
		let session_id = headers
			.get(HEADER_SESSION_ID)
			.and_then(|v| v.to_str().ok())
			.ok_or(McpError::SessionIdRequired)?;
		let session = self.sessions.get_or_resume(session_id).ok_or(McpError::UnknownSession)?;
		debug!(upstream = upstream_name, session = %session.id, "mcp get stream requested; legacy SSE is not proxied");
		Ok(
			Response::builder()
				.status(StatusCode::NOT_IMPLEMENTED)
				.body(axum::body::Body::empty())
				.expect("valid response"),
		)
	}

	async fn handle_delete(&self, _upstream_name: &str, headers: HeaderMap) -> Result<Response, McpError> {
		let session_id = headers
			.get(HEADER_SESSION_ID)
			.and_then(|v| v.to_str().ok())
			.ok_or(McpError::SessionIdRequired)?;
		self.sessions.remove(session_id);
		Ok(
			Response::builder()
				.status(StatusCode::ACCEPTED)
				.body(axum::body::Body::empty())
				.expect("valid response"),
		)
	}
}

async fn handle_post(State(app): State<McpApp>, Path(upstream): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
	match app.handle_post(&upstream, headers, body).await {
		Ok(resp) => resp,
		Err(err) => error_response(err),
	}
}

async fn handle_get(State(app): State<McpApp>, Path(upstream): Path<String>, headers: HeaderMap) -> Response {
	match app.handle_get(&upstream, headers).await {
		Ok(resp) => resp,
		Err(err) => error_response(err),
	}
}

async fn handle_delete(State(app): State<McpApp>, Path(upstream): Path<String>, headers: HeaderMap) -> Response {
	match app.handle_delete(&upstream, headers).await {
		Ok(resp) => resp,
		Err(err) => error_response(err),
	}
}

fn error_response(err: McpError) -> Response {
	warn!(error = %err, "mcp proxy request failed");
	let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
	(status, err.to_string()).into_response()
}

fn describe_method(message: &ClientJsonRpcMessage) -> Option<String> {
	match message {
		ClientJsonRpcMessage::Request(r) => Some(r.request.method().to_string()),
		ClientJsonRpcMessage::Notification(n) => Some(
			match &n.notification {
				ClientNotification::CancelledNotification(r) => r.method.as_str(),
				ClientNotification::ProgressNotification(r) => r.method.as_str(),
				ClientNotification::InitializedNotification(r) => r.method.as_str(),
				ClientNotification::RootsListChangedNotification(r) => r.method.as_str(),
				ClientNotification::CustomNotification(r) => r.method.as_str(),
			}
			.to_string(),
		),
		_ => None,
	}
}

/// Parses `result.capabilities` out of the raw `initialize` response body.
/// Deliberately works on untyped JSON rather than `rmcp::model`'s nested
/// `ServerCapabilities` type: the proxy only needs presence/absence per
/// capability kind for metrics, not the full negotiated schema.
fn extract_capabilities(response_body: &[u8]) -> NegotiatedCapabilities {
	let Ok(value) = serde_json::from_slice::<serde_json::Value>(response_body) else {
		return NegotiatedCapabilities::default();
	};
	let capabilities = value.pointer("/result/capabilities");
	let server = capability_kinds(capabilities);
	NegotiatedCapabilities { client: Vec::new(), server }
}

fn capability_kinds(capabilities: Option<&serde_json::Value>) -> Vec<String> {
	const KINDS: &[&str] = &["tools", "prompts", "resources", "sampling", "roots", "logging"];
	let Some(capabilities) = capabilities.and_then(|v| v.as_object()) else {
		return Vec::new();
	};
	KINDS
		.iter()
		.filter(|kind| capabilities.contains_key(**kind))
		.map(|kind| kind.to_string())
		.collect()
}

fn record_capability_metrics(metrics: &McpMetrics, upstream: &str, caps: &NegotiatedCapabilities) {
	let _ = upstream;
	for kind in &caps.server {
		if let Some(kind) = parse_capability_kind(kind) {
			metrics
				.capabilities
				.get_or_create(&CapabilityLabels { side: CapabilitySide::Server, kind })
				.inc();
		}
	}
	for kind in &caps.client {
		if let Some(kind) = parse_capability_kind(kind) {
			metrics
				.capabilities
				.get_or_create(&CapabilityLabels { side: CapabilitySide::Client, kind })
				.inc();
		}
	}
}

fn parse_capability_kind(name: &str) -> Option<CapabilityKind> {
	match name {
		"tools" => Some(CapabilityKind::Tools),
		"prompts" => Some(CapabilityKind::Prompts),
		"resources" => Some(CapabilityKind::Resources),
		"sampling" => Some(CapabilityKind::Sampling),
		"roots" => Some(CapabilityKind::Roots),
		"logging" => Some(CapabilityKind::Logging),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_known_capability_kinds_from_an_initialize_response() {
		let body = br#"{"jsonrpc":"2.0","id":0,"result":{"capabilities":{"tools":{},"prompts":{},"unknownKind":{}}}}"#;
		let caps = extract_capabilities(body);
		assert_eq!(caps.server, vec!["tools".to_string(), "prompts".to_string()]);
	}

	#[test]
	fn malformed_body_yields_no_capabilities() {
		let caps = extract_capabilities(b"not json");
		assert!(caps.server.is_empty());
	}
}
