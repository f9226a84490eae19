//! Error taxonomy shared across the stream state machine, translators, and
//! config plane. Each leaf type maps to exactly one outcome in the error
//! handling design: an immediate-response status code, a logged-and-ignored
//! config reload, or a fatal startup exit.

use thiserror::Error;

/// Errors surfaced while driving a single ExtProc stream to completion.
#[derive(Debug, Error)]
pub enum ProcessorError {
	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("no backend matched the request")]
	NoMatchingRule,

	#[error("backend unreachable: {0}")]
	BackendUnreachable(String),

	#[error(transparent)]
	Translate(#[from] TranslateError),

	#[error(transparent)]
	Internal(#[from] anyhow::Error),
}

impl ProcessorError {
	/// The HTTP status code an immediate-response should carry for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			ProcessorError::BadRequest(_) => 400,
			ProcessorError::NoMatchingRule => 404,
			ProcessorError::BackendUnreachable(_) => 503,
			ProcessorError::Translate(_) => 502,
			ProcessorError::Internal(_) => 500,
		}
	}

	/// The `error.type` OTel attribute value recorded on the completion metric.
	pub fn error_type(&self) -> &'static str {
		match self {
			ProcessorError::BadRequest(_) => "invalid_request",
			ProcessorError::NoMatchingRule => "no_matching_rule",
			ProcessorError::BackendUnreachable(_) => "backend_unreachable",
			ProcessorError::Translate(_) => "translate_error",
			ProcessorError::Internal(_) => "_OTHER",
		}
	}
}

/// Errors produced by a schema translator, either reshaping a request body
/// once or feeding a streaming response buffer incrementally.
#[derive(Debug, Error)]
pub enum TranslateError {
	#[error("invalid json: {0}")]
	InvalidJson(#[from] serde_json::Error),

	#[error("unsupported conversion: {0}")]
	UnsupportedConversion(String),

	#[error("request signing failed: {0}")]
	Signing(String),

	#[error("malformed streaming frame: {0}")]
	Stream(String),
}

/// Errors produced while loading or validating a configuration snapshot.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("deprecated config key `{0}` is no longer supported; use the current schema")]
	DeprecatedField(&'static str),

	#[error(transparent)]
	Yaml(#[from] serde_yaml::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error("invalid configuration: {0}")]
	Validation(String),
}

/// Errors produced by the MCP proxy's session and upstream handling (§4.8).
#[derive(Debug, Error)]
pub enum McpError {
	#[error("method not allowed; must be GET, POST, or DELETE")]
	MethodNotAllowed,

	#[error("client must send application/json")]
	InvalidContentType,

	#[error("no mcp upstream named `{0}` is configured")]
	UnknownUpstream(String),

	#[error("session id is required for this request")]
	SessionIdRequired,

	#[error("session not found")]
	UnknownSession,

	#[error("invalid session id")]
	InvalidSessionId,

	#[error("failed to deserialize request body: {0}")]
	Deserialize(#[from] serde_json::Error),

	#[error("upstream request failed: {0}")]
	Upstream(#[from] reqwest::Error),
}

impl McpError {
	pub fn status_code(&self) -> u16 {
		match self {
			McpError::MethodNotAllowed => 405,
			McpError::InvalidContentType => 400,
			McpError::UnknownUpstream(_) => 404,
			McpError::SessionIdRequired | McpError::InvalidSessionId => 400,
			McpError::UnknownSession => 404,
			McpError::Deserialize(_) => 400,
			McpError::Upstream(_) => 502,
		}
	}
}
