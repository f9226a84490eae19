//! Anthropic Messages API translator: reshapes OpenAI Chat Completions
//! into `{model, system, messages, max_tokens}`, targets `/v1/messages`,
//! and injects `x-api-key` + `anthropic-version`. Grounded on
//! `llm::anthropic::Provider` (host/path constants) and the Messages API's
//! public wire shape.

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::stream::SseDecoder;
use super::wire::chat::ChatRequest;
use super::{FeedOutput, HeaderOp, RequestContext, RequestTranslation, Translator, UsageDelta};
use crate::config::BackendAuth;
use crate::error::TranslateError;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MESSAGES_PATH: &str = "/v1/messages";
const DEFAULT_MAX_TOKENS: u64 = 4096;

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
	role: String,
	content: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
	model: String,
	max_tokens: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	system: Option<String>,
	messages: Vec<AnthropicMessage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	top_p: Option<f64>,
	stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicUsage {
	#[serde(default)]
	input_tokens: u64,
	#[serde(default)]
	output_tokens: u64,
	#[serde(default)]
	cache_read_input_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicContentBlock {
	#[serde(default)]
	text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
	#[serde(default)]
	model: Option<String>,
	#[serde(default)]
	content: Vec<AnthropicContentBlock>,
	#[serde(default)]
	usage: Option<AnthropicUsage>,
}

pub struct AnthropicTranslator {
	auth: Option<BackendAuth>,
	streaming: bool,
	sse: SseDecoder,
	/// Accumulates the non-streaming response across chunks; parsed only
	/// once `end_of_stream` arrives.
	buffer: Vec<u8>,
}

impl AnthropicTranslator {
	pub fn new(auth: Option<BackendAuth>) -> Self {
		AnthropicTranslator {
			auth,
			streaming: false,
			sse: SseDecoder::new(),
			buffer: Vec::new(),
		}
	}
}

impl Translator for AnthropicTranslator {
	fn translate_request(
		&mut self,
		ctx: &RequestContext,
		body: &[u8],
	) -> Result<RequestTranslation, TranslateError> {
		if ctx.route == Some(crate::extproc::registry::RouteKind::Embeddings) {
			return Err(TranslateError::UnsupportedConversion(
				"anthropic backend does not support embeddings translation".to_string(),
			));
		}

		let key = match &self.auth {
			Some(BackendAuth::Anthropic { key }) => key.expose_secret().to_string(),
			_ => {
				return Err(TranslateError::UnsupportedConversion(
					"anthropic backend requires an api key".to_string(),
				));
			},
		};

		let request: ChatRequest = serde_json::from_slice(body)?;
		self.streaming = request.stream;

		let system = {
			let text = request.system_text();
			(!text.is_empty()).then_some(text)
		};
		let messages = request
			.non_system_messages()
			.filter_map(|m| {
				let content = m.content.clone()?;
				Some(AnthropicMessage {
					role: if m.role == "assistant" {
						"assistant".to_string()
					} else {
						"user".to_string()
					},
					content,
				})
			})
			.collect();

		let out = AnthropicRequest {
			model: ctx.model_name_override.clone().unwrap_or(request.model),
			max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
			system,
			messages,
			temperature: request.temperature,
			top_p: request.top_p,
			stream: self.streaming,
		};
		let body = serde_json::to_vec(&out)?;

		let header_ops = vec![
			HeaderOp::Remove("authorization".to_string()),
			HeaderOp::Set("x-api-key".to_string(), key),
			HeaderOp::Set("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
		];

		Ok(RequestTranslation {
			header_ops,
			path_override: Some(MESSAGES_PATH.to_string()),
			body,
		})
	}

	fn translate_response_headers(&mut self, _ctx: &RequestContext) -> Vec<HeaderOp> {
		Vec::new()
	}

	fn feed_response_body(
		&mut self,
		chunk: &[u8],
		end_of_stream: bool,
	) -> Result<FeedOutput, TranslateError> {
		if !self.streaming {
			self.buffer.extend_from_slice(chunk);
			if !end_of_stream {
				return Ok(FeedOutput::default());
			}
			let parsed: AnthropicResponse = serde_json::from_slice(&self.buffer)?;
			let text: String = parsed
				.content
				.iter()
				.filter_map(|b| b.text.as_deref())
				.collect();
			let usage = parsed
				.usage
				.as_ref()
				.map(|u| UsageDelta {
					input_tokens: Some(u.input_tokens),
					cached_input_tokens: Some(u.cache_read_input_tokens),
					output_tokens: Some(u.output_tokens),
					response_model: parsed.model.clone(),
				})
				.unwrap_or_default();
			let chunk = serde_json::json!({
				"model": parsed.model,
				"choices": [{"index": 0, "delta": {"role": "assistant", "content": text}}],
			});
			return Ok(FeedOutput {
				frames: vec![serde_json::to_vec(&chunk)?],
				usage,
			});
		}

		let events = self.sse.feed(chunk, end_of_stream);
		let mut frames = Vec::new();
		let mut usage = UsageDelta::default();
		for event in &events {
			let Some(payload) = event.strip_prefix(b"data: ") else {
				continue;
			};
			let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
				continue;
			};
			match value.get("type").and_then(|t| t.as_str()) {
				Some("content_block_delta") => {
					if let Some(text) = value
						.get("delta")
						.and_then(|d| d.get("text"))
						.and_then(|t| t.as_str())
					{
						let chunk = serde_json::json!({
							"choices": [{"index": 0, "delta": {"content": text}}],
						});
						frames.push(super::stream::frame_as_sse_event(&serde_json::to_vec(&chunk)?));
					}
				},
				Some("message_delta") => {
					if let Some(u) = value.get("usage") {
						if let Some(out) = u.get("output_tokens").and_then(|v| v.as_u64()) {
							usage.output_tokens = Some(out);
						}
					}
				},
				Some("message_start") => {
					if let Some(u) = value.get("message").and_then(|m| m.get("usage")) {
						if let Some(input) = u.get("input_tokens").and_then(|v| v.as_u64()) {
							usage.input_tokens = Some(input);
						}
						if let Some(cached) = u.get("cache_read_input_tokens").and_then(|v| v.as_u64()) {
							usage.cached_input_tokens = Some(cached);
						}
					}
				},
				_ => {},
			}
		}
		if end_of_stream {
			frames.push(super::stream::DONE_EVENT.to_vec());
		}
		Ok(FeedOutput { frames, usage })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use secrecy::SecretString;

	fn anthropic_auth() -> BackendAuth {
		BackendAuth::Anthropic {
			key: SecretString::from("sk-ant-test".to_string()),
		}
	}

	#[test]
	fn rewrites_path_and_injects_headers() {
		let mut t = AnthropicTranslator::new(Some(anthropic_auth()));
		let ctx = RequestContext {
			backend_name: "anthropic".to_string(),
			model_name_override: None,
			route: Some(crate::extproc::registry::RouteKind::ChatCompletions),
		};
		let out = t
			.translate_request(&ctx, br#"{"model":"claude-3-opus","messages":[{"role":"user","content":"hi"}]}"#)
			.unwrap();
		assert_eq!(out.path_override.unwrap(), MESSAGES_PATH);
		assert!(matches!(&out.header_ops[1], HeaderOp::Set(name, _) if name == "x-api-key"));
	}
}
