//! Azure OpenAI translator: body is untouched (Azure speaks the same Chat
//! Completions / embeddings JSON), but the path is templated with the
//! deployment name and `api-version`, and the API key is injected as
//! `api-key`. Grounded on the teacher's
//! `llm::azureopenai::Provider::get_path_for_model`.

use secrecy::ExposeSecret;

use super::stream::SseDecoder;
use super::wire::chat::{ChatRequest, ChatResponse};
use super::wire::embeddings::EmbeddingsRequest;
use super::{FeedOutput, HeaderOp, RequestContext, RequestTranslation, Translator, UsageDelta};
use crate::config::BackendAuth;
use crate::error::TranslateError;
use crate::extproc::registry::RouteKind;

const DEFAULT_API_VERSION: &str = "2024-10-21";

pub struct AzureOpenAiTranslator {
	auth: Option<BackendAuth>,
	streaming: bool,
	sse: SseDecoder,
	/// Accumulates a non-streaming response across chunks; parsed only once
	/// `end_of_stream` arrives and emitted verbatim (Azure already speaks
	/// OpenAI's wire shape, so there is nothing to reshape).
	buffer: Vec<u8>,
}

impl AzureOpenAiTranslator {
	pub fn new(auth: Option<BackendAuth>) -> Self {
		AzureOpenAiTranslator {
			auth,
			streaming: false,
			sse: SseDecoder::new(),
			buffer: Vec::new(),
		}
	}

	fn api_key(&self) -> Result<String, TranslateError> {
		match &self.auth {
			Some(BackendAuth::Azure { access_token }) => Ok(access_token.expose_secret().to_string()),
			_ => Err(TranslateError::UnsupportedConversion(
				"azure openai backend requires an access token".to_string(),
			)),
		}
	}
}

impl Translator for AzureOpenAiTranslator {
	fn translate_request(
		&mut self,
		ctx: &RequestContext,
		body: &[u8],
	) -> Result<RequestTranslation, TranslateError> {
		let key = self.api_key()?;
		let header_ops = vec![
			HeaderOp::Remove("authorization".to_string()),
			HeaderOp::Set("api-key".to_string(), key),
		];

		if ctx.route == Some(RouteKind::Embeddings) {
			let request: EmbeddingsRequest = serde_json::from_slice(body)?;
			let deployment = ctx.model_name_override.as_deref().unwrap_or(request.model.as_str());
			self.streaming = false;
			let path = format!("/openai/deployments/{deployment}/embeddings?api-version={DEFAULT_API_VERSION}");
			return Ok(RequestTranslation {
				header_ops,
				path_override: Some(path),
				body: body.to_vec(),
			});
		}

		let request: ChatRequest = serde_json::from_slice(body)?;
		let deployment = ctx.model_name_override.as_deref().unwrap_or(request.model.as_str());
		self.streaming = request.stream;

		let path = format!(
			"/openai/deployments/{deployment}/chat/completions?api-version={DEFAULT_API_VERSION}"
		);

		Ok(RequestTranslation {
			header_ops,
			path_override: Some(path),
			body: body.to_vec(),
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
			let usage = serde_json::from_slice::<ChatResponse>(&self.buffer)
				.ok()
				.map(|parsed| UsageDelta {
					input_tokens: parsed.usage.as_ref().map(|u| u.prompt_tokens),
					output_tokens: parsed.usage.as_ref().map(|u| u.completion_tokens),
					cached_input_tokens: parsed
						.usage
						.as_ref()
						.and_then(|u| u.prompt_tokens_details.as_ref())
						.map(|d| d.cached_tokens),
					response_model: parsed.model,
				})
				.unwrap_or_default();
			return Ok(FeedOutput {
				frames: vec![std::mem::take(&mut self.buffer)],
				usage,
			});
		}

		let events = self.sse.feed(chunk, end_of_stream);
		let mut usage = UsageDelta::default();
		let mut frames = Vec::with_capacity(events.len());
		for event in &events {
			frames.push(super::stream::sse::reframe(event));
			if let Some(payload) = event.strip_prefix(b"data: ") {
				if payload == b"[DONE]" {
					continue;
				}
				if let Ok(parsed) = serde_json::from_slice::<ChatResponse>(payload) {
					if let Some(u) = parsed.usage {
						usage.input_tokens = Some(u.prompt_tokens);
						usage.output_tokens = Some(u.completion_tokens);
						usage.cached_input_tokens = u.prompt_tokens_details.map(|d| d.cached_tokens);
					}
					usage.response_model = parsed.model;
				}
			}
		}
		Ok(FeedOutput { frames, usage })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use secrecy::SecretString;

	fn azure_auth() -> Option<BackendAuth> {
		Some(BackendAuth::Azure {
			access_token: SecretString::from("token".to_string()),
		})
	}

	fn chat_ctx() -> RequestContext {
		RequestContext {
			backend_name: "azure".to_string(),
			model_name_override: None,
			route: Some(RouteKind::ChatCompletions),
		}
	}

	#[test]
	fn templates_deployment_path_with_api_version() {
		let mut t = AzureOpenAiTranslator::new(azure_auth());
		let out = t
			.translate_request(&chat_ctx(), br#"{"model":"gpt-4o","messages":[]}"#)
			.unwrap();
		assert_eq!(
			out.path_override.unwrap(),
			format!("/openai/deployments/gpt-4o/chat/completions?api-version={DEFAULT_API_VERSION}")
		);
	}

	#[test]
	fn rejects_backend_with_no_auth() {
		let mut t = AzureOpenAiTranslator::new(None);
		assert!(t.translate_request(&chat_ctx(), br#"{"model":"gpt-4o","messages":[]}"#).is_err());
	}

	#[test]
	fn templates_embeddings_deployment_path() {
		let mut t = AzureOpenAiTranslator::new(azure_auth());
		let ctx = RequestContext {
			backend_name: "azure".to_string(),
			model_name_override: None,
			route: Some(RouteKind::Embeddings),
		};
		let out = t
			.translate_request(&ctx, br#"{"model":"text-embedding-3-small","input":"hello"}"#)
			.unwrap();
		assert_eq!(
			out.path_override.unwrap(),
			format!("/openai/deployments/text-embedding-3-small/embeddings?api-version={DEFAULT_API_VERSION}")
		);
	}

	#[test]
	fn non_streaming_response_is_passed_through_verbatim() {
		let mut t = AzureOpenAiTranslator::new(azure_auth());
		t.translate_request(&chat_ctx(), br#"{"model":"gpt-4o","messages":[],"stream":false}"#)
			.unwrap();
		let body = br#"{"model":"gpt-4o","choices":[],"usage":{"prompt_tokens":3,"completion_tokens":5,"total_tokens":8}}"#;
		let out = t.feed_response_body(body, true).unwrap();
		assert_eq!(out.frames, vec![body.to_vec()]);
		assert_eq!(out.usage.input_tokens, Some(3));
		assert_eq!(out.usage.output_tokens, Some(5));
	}

	#[test]
	fn non_streaming_response_buffers_across_chunks() {
		let mut t = AzureOpenAiTranslator::new(azure_auth());
		t.translate_request(&chat_ctx(), br#"{"model":"gpt-4o","messages":[]}"#).unwrap();
		let first = t.feed_response_body(br#"{"model":"gpt-4o","#, false).unwrap();
		assert!(first.frames.is_empty());
		let out = t.feed_response_body(br#""choices":[]}"#, true).unwrap();
		assert_eq!(out.frames, vec![br#"{"model":"gpt-4o","choices":[]}"#.to_vec()]);
	}
}
