//! Schema translators: one per (OpenAI Chat Completions, backend wire
//! format) pair, per §4.4. A translator is instantiated once per stream by
//! the processor registry's factory and owned for the stream's full
//! lifetime (never re-selected mid-stream).

pub mod anthropic;
pub mod azure_openai;
pub mod bedrock;
pub mod openai;
pub mod sigv4;
pub mod stream;
pub mod vertex;
pub mod wire;

use crate::config::Backend;
use crate::error::TranslateError;
use crate::extproc::registry::RouteKind;

/// A single outbound header directive a translator wants applied on top of
/// whatever the header mutator already computed.
#[derive(Debug, Clone)]
pub enum HeaderOp {
	Set(String, String),
	Remove(String),
}

/// The result of translating a complete, buffered request body.
#[derive(Debug, Clone, Default)]
pub struct RequestTranslation {
	pub header_ops: Vec<HeaderOp>,
	/// Replaces the `:path` pseudo-header when set (path templating for
	/// Azure/Bedrock/Vertex).
	pub path_override: Option<String>,
	pub body: Vec<u8>,
}

/// Token counts a translator was able to read out of a request or response
/// payload. Fields left `None` are not merged into the running accumulator.
#[derive(Debug, Clone, Default)]
pub struct UsageDelta {
	pub input_tokens: Option<u64>,
	pub cached_input_tokens: Option<u64>,
	pub output_tokens: Option<u64>,
	pub response_model: Option<String>,
}

/// Output of one `feed_response_body` call: zero or more complete,
/// re-framed output chunks plus any usage observed in this feed.
#[derive(Debug, Clone, Default)]
pub struct FeedOutput {
	pub frames: Vec<Vec<u8>>,
	pub usage: UsageDelta,
}

/// Per (input schema, output schema) transformation. Implementations must
/// be pure and restartable: `feed_response_body` owns its own buffer and
/// never assumes a frame boundary aligns with a chunk boundary (§9).
pub trait Translator: Send {
	/// Transform a fully-buffered request body. Pure; may return an
	/// unmodified body with no header ops for pass-through backends.
	fn translate_request(
		&mut self,
		ctx: &RequestContext,
		body: &[u8],
	) -> Result<RequestTranslation, TranslateError>;

	/// Rewrite response headers (e.g. content-type for event-stream ⇒ SSE
	/// re-framing).
	fn translate_response_headers(&mut self, ctx: &RequestContext) -> Vec<HeaderOp>;

	/// Feed the next chunk of the backend's response body. `end_of_stream`
	/// is true on the final chunk, including a zero-length one.
	fn feed_response_body(
		&mut self,
		chunk: &[u8],
		end_of_stream: bool,
	) -> Result<FeedOutput, TranslateError>;
}

/// Read-only context a translator needs in order to translate a request:
/// the backend it is targeting and the model name already resolved by the
/// router.
#[derive(Debug, Clone)]
pub struct RequestContext {
	pub backend_name: String,
	pub model_name_override: Option<String>,
	/// The route the processor registry resolved for this request (§4.2),
	/// so a translator can tell an embeddings body from a chat-shaped one
	/// before picking a deserialization target.
	pub route: Option<RouteKind>,
}

/// Build the translator for a backend's configured API schema. One
/// concrete type per schema kind, matching the teacher's
/// `llm::{openai,azureopenai,bedrock,anthropic,vertex}` module split.
pub fn build_translator(backend: &Backend) -> Box<dyn Translator> {
	use crate::config::ApiSchemaKind::*;
	match backend.schema {
		OpenAI => Box::new(openai::OpenAiTranslator::new()),
		AzureOpenAI => Box::new(azure_openai::AzureOpenAiTranslator::new(backend.auth.clone())),
		AWSBedrock => Box::new(bedrock::BedrockTranslator::new(backend.auth.clone())),
		Anthropic => Box::new(anthropic::AnthropicTranslator::new(backend.auth.clone())),
		GCPVertexAI => Box::new(vertex::VertexTranslator::new(backend.auth.clone(), false)),
		GCPAnthropic => Box::new(vertex::VertexTranslator::new(backend.auth.clone(), true)),
	}
}

/// Whether a backend's schema requires a configured auth object before a
/// request can be sent. OpenAI pass-through is the only schema that can
/// legitimately have none (the proxy may inject its own auth downstream).
pub fn requires_auth(schema: crate::config::ApiSchemaKind) -> bool {
	!matches!(schema, crate::config::ApiSchemaKind::OpenAI)
}
