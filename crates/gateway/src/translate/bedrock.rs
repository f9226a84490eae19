//! AWS Bedrock translator: reshapes OpenAI Chat Completions into the
//! Bedrock Converse API body, rewrites the path to `converse` /
//! `converse-stream`, and SigV4-signs the request. Narrowed to text-only
//! content blocks; grounded on `llm::bedrock::Provider` and
//! `llm::types::bedrock::{ConverseRequest,ConverseResponse}`.

use serde::{Deserialize, Serialize};

use super::stream::AwsEventStreamDecoder;
use super::wire::chat::ChatRequest;
use super::{sigv4, FeedOutput, HeaderOp, RequestContext, RequestTranslation, Translator, UsageDelta};
use crate::config::BackendAuth;
use crate::error::TranslateError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
enum Role {
	User,
	Assistant,
}

#[derive(Debug, Clone, Serialize)]
enum ContentBlock {
	#[serde(rename = "text")]
	Text(String),
}

#[derive(Debug, Clone, Serialize)]
struct Message {
	role: Role,
	content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct InferenceConfiguration {
	#[serde(rename = "maxTokens", skip_serializing_if = "Option::is_none")]
	max_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	temperature: Option<f64>,
	#[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
	top_p: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct ConverseRequest {
	messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	system: Option<Vec<SystemBlock>>,
	#[serde(rename = "inferenceConfig", skip_serializing_if = "Option::is_none")]
	inference_config: Option<InferenceConfiguration>,
}

#[derive(Debug, Clone, Serialize)]
struct SystemBlock {
	text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenUsage {
	input_tokens: u64,
	output_tokens: u64,
	#[serde(default)]
	cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConverseResponseMessage {
	content: Vec<ConverseResponseContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
enum ConverseResponseContentBlock {
	Text(String),
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
enum ConverseOutput {
	Message(ConverseResponseMessage),
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, Deserialize)]
struct ConverseResponse {
	output: Option<ConverseOutput>,
	usage: Option<TokenUsage>,
}

pub struct BedrockTranslator {
	auth: Option<BackendAuth>,
	model_id: String,
	streaming: bool,
	aws_stream: AwsEventStreamDecoder,
	/// Accumulates the non-streaming response across chunks; parsed only once
	/// `end_of_stream` arrives, since a single Converse response can be split
	/// across several `HttpBody` messages.
	buffer: Vec<u8>,
}

impl BedrockTranslator {
	pub fn new(auth: Option<BackendAuth>) -> Self {
		BedrockTranslator {
			auth,
			model_id: String::new(),
			streaming: false,
			aws_stream: AwsEventStreamDecoder::new(),
			buffer: Vec::new(),
		}
	}

	fn region(&self) -> Result<&str, TranslateError> {
		match &self.auth {
			Some(BackendAuth::Aws { region, .. }) => Ok(region.as_str()),
			_ => Err(TranslateError::UnsupportedConversion(
				"bedrock backend requires aws auth".to_string(),
			)),
		}
	}
}

fn usage_delta(usage: &TokenUsage) -> UsageDelta {
	UsageDelta {
		input_tokens: Some(usage.input_tokens),
		cached_input_tokens: usage.cache_read_input_tokens,
		output_tokens: Some(usage.output_tokens),
		response_model: None,
	}
}

fn openai_chunk(text: &str, model: &str, usage: Option<&TokenUsage>) -> Vec<u8> {
	let usage_json = usage.map(|u| {
		serde_json::json!({
			"prompt_tokens": u.input_tokens,
			"completion_tokens": u.output_tokens,
			"total_tokens": u.input_tokens + u.output_tokens,
		})
	});
	let chunk = serde_json::json!({
		"model": model,
		"choices": [{
			"index": 0,
			"delta": { "role": "assistant", "content": text },
		}],
		"usage": usage_json,
	});
	serde_json::to_vec(&chunk).unwrap_or_default()
}

impl Translator for BedrockTranslator {
	fn translate_request(
		&mut self,
		ctx: &RequestContext,
		body: &[u8],
	) -> Result<RequestTranslation, TranslateError> {
		if ctx.route == Some(crate::extproc::registry::RouteKind::Embeddings) {
			return Err(TranslateError::UnsupportedConversion(
				"bedrock backend does not support embeddings translation".to_string(),
			));
		}
		self.region()?;

		let request: ChatRequest = serde_json::from_slice(body)?;
		self.streaming = request.stream;
		self.model_id = ctx
			.model_name_override
			.clone()
			.unwrap_or_else(|| request.model.clone());

		let system_text = request.system_text();
		let system = if system_text.is_empty() {
			None
		} else {
			Some(vec![SystemBlock { text: system_text }])
		};
		let messages = request
			.non_system_messages()
			.filter_map(|m| {
				let content = m.content.as_deref()?;
				if content.trim().is_empty() {
					return None;
				}
				let role = if m.role == "assistant" {
					Role::Assistant
				} else {
					Role::User
				};
				Some(Message {
					role,
					content: vec![ContentBlock::Text(content.to_string())],
				})
			})
			.collect();

		let inference_config = InferenceConfiguration {
			max_tokens: request.max_tokens,
			temperature: request.temperature,
			top_p: request.top_p,
		};

		let converse = ConverseRequest {
			messages,
			system,
			inference_config: Some(inference_config),
		};
		let out_body = serde_json::to_vec(&converse)?;

		let route = if self.streaming {
			"converse-stream"
		} else {
			"converse"
		};
		let path = format!("/model/{}/{route}", self.model_id);

		let signed = sigv4::sign_headers(
			"POST",
			&path,
			&[("content-type".to_string(), "application/json".to_string())],
			&out_body,
			self.auth.as_ref().unwrap(),
		)?;

		let mut header_ops = vec![HeaderOp::Remove("authorization".to_string())];
		header_ops.extend(signed.into_iter().map(|(k, v)| HeaderOp::Set(k, v)));

		Ok(RequestTranslation {
			header_ops,
			path_override: Some(path),
			body: out_body,
		})
	}

	fn translate_response_headers(&mut self, _ctx: &RequestContext) -> Vec<HeaderOp> {
		if self.streaming {
			vec![HeaderOp::Set(
				"content-type".to_string(),
				"text/event-stream".to_string(),
			)]
		} else {
			Vec::new()
		}
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
			let parsed: ConverseResponse = serde_json::from_slice(&self.buffer)?;
			let text = match parsed.output {
				Some(ConverseOutput::Message(m)) => m
					.content
					.into_iter()
					.filter_map(|c| match c {
						ConverseResponseContentBlock::Text(t) => Some(t),
						ConverseResponseContentBlock::Unknown => None,
					})
					.collect::<Vec<_>>()
					.join(""),
				_ => String::new(),
			};
			let usage = parsed.usage.as_ref().map(usage_delta).unwrap_or_default();
			let frame = openai_chunk(&text, &self.model_id, parsed.usage.as_ref());
			return Ok(FeedOutput {
				frames: vec![frame],
				usage,
			});
		}

		let messages = self.aws_stream.feed(chunk, end_of_stream)?;
		let mut frames = Vec::new();
		let mut usage = UsageDelta::default();
		for message in messages {
			let event = super::stream::aws_event_stream::event_type(&message).unwrap_or_default();
			let payload = message.payload();
			match event.as_str() {
				"contentBlockDelta" => {
					if let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) {
						if let Some(text) = value
							.get("delta")
							.and_then(|d| d.get("text"))
							.and_then(|t| t.as_str())
						{
							let frame = openai_chunk(text, &self.model_id, None);
							frames.push(super::stream::frame_as_sse_event(&frame));
						}
					}
				},
				"metadata" => {
					if let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) {
						if let Some(token_usage) = value
							.get("usage")
							.and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok())
						{
							usage = usage_delta(&token_usage);
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

	fn aws_auth() -> BackendAuth {
		BackendAuth::Aws {
			access_key_id: SecretString::from("AKIAEXAMPLE".to_string()),
			secret_access_key: SecretString::from("secret".to_string()),
			session_token: None,
			region: "us-east-1".to_string(),
		}
	}

	#[test]
	fn non_streaming_request_rewrites_path_and_body() {
		let mut t = BedrockTranslator::new(Some(aws_auth()));
		let ctx = RequestContext {
			backend_name: "bedrock".to_string(),
			model_name_override: None,
			route: Some(crate::extproc::registry::RouteKind::ChatCompletions),
		};
		let out = t
			.translate_request(
				&ctx,
				br#"{"model":"anthropic.claude-3","messages":[{"role":"user","content":"hi"}]}"#,
			)
			.unwrap();
		assert_eq!(out.path_override.unwrap(), "/model/anthropic.claude-3/converse");
		assert!(out.body.windows(4).any(|w| w == b"user" || w == b"User"));
	}

	#[test]
	fn streaming_request_uses_converse_stream_path() {
		let mut t = BedrockTranslator::new(Some(aws_auth()));
		let ctx = RequestContext {
			backend_name: "bedrock".to_string(),
			model_name_override: None,
			route: Some(crate::extproc::registry::RouteKind::ChatCompletions),
		};
		let out = t
			.translate_request(
				&ctx,
				br#"{"model":"anthropic.claude-3","messages":[],"stream":true}"#,
			)
			.unwrap();
		assert_eq!(
			out.path_override.unwrap(),
			"/model/anthropic.claude-3/converse-stream"
		);
	}
}
