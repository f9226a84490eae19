//! Pass-through translator for backends that already speak OpenAI Chat
//! Completions (and, for `/v1/embeddings`, OpenAI's embeddings shape): no
//! body reshape, only a little SSE/non-streaming bookkeeping so the usage
//! accountant can still read token counts back out.

use super::stream::SseDecoder;
use super::wire::chat::{peek_stream, ChatResponse};
use super::{FeedOutput, HeaderOp, RequestContext, RequestTranslation, Translator, UsageDelta};
use crate::error::TranslateError;

pub struct OpenAiTranslator {
	streaming: bool,
	sse: SseDecoder,
	/// Accumulates a non-streaming response across chunks; emitted verbatim
	/// once `end_of_stream` arrives rather than round-tripped through the
	/// SSE reframer, which assumes an event-stream delimiter that a plain
	/// JSON body never has.
	buffer: Vec<u8>,
}

impl OpenAiTranslator {
	pub fn new() -> Self {
		OpenAiTranslator {
			streaming: false,
			sse: SseDecoder::new(),
			buffer: Vec::new(),
		}
	}
}

impl Translator for OpenAiTranslator {
	fn translate_request(
		&mut self,
		_ctx: &RequestContext,
		body: &[u8],
	) -> Result<RequestTranslation, TranslateError> {
		self.streaming = peek_stream(body);
		Ok(RequestTranslation {
			header_ops: Vec::new(),
			path_override: None,
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
						usage.cached_input_tokens =
							u.prompt_tokens_details.map(|d| d.cached_tokens);
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
	use crate::extproc::registry::RouteKind;

	fn ctx() -> RequestContext {
		RequestContext {
			backend_name: "default".to_string(),
			model_name_override: None,
			route: Some(RouteKind::ChatCompletions),
		}
	}

	#[test]
	fn passthrough_body_is_unmodified() {
		let mut t = OpenAiTranslator::new();
		let out = t.translate_request(&ctx(), br#"{"model":"gpt-4o"}"#).unwrap();
		assert_eq!(out.body, br#"{"model":"gpt-4o"}"#.to_vec());
		assert!(out.path_override.is_none());
	}

	#[test]
	fn sse_round_trips_verbatim() {
		let mut t = OpenAiTranslator::new();
		t.translate_request(&ctx(), br#"{"model":"gpt-4o","stream":true}"#).unwrap();
		let out = t.feed_response_body(b"data: 1\n\ndata: 2", true).unwrap();
		assert_eq!(out.frames, vec![b"data: 1\n\n".to_vec(), b"data: 2\n\n".to_vec()]);
	}

	#[test]
	fn non_streaming_response_is_passed_through_verbatim() {
		let mut t = OpenAiTranslator::new();
		t.translate_request(&ctx(), br#"{"model":"gpt-4o","stream":false}"#).unwrap();
		let body = br#"{"model":"gpt-4o","choices":[],"usage":{"prompt_tokens":3,"completion_tokens":5,"total_tokens":8}}"#;
		let out = t.feed_response_body(body, true).unwrap();
		assert_eq!(out.frames, vec![body.to_vec()]);
		assert_eq!(out.usage.input_tokens, Some(3));
		assert_eq!(out.usage.output_tokens, Some(5));
	}

	#[test]
	fn embeddings_route_is_passed_through_without_a_messages_field() {
		let mut t = OpenAiTranslator::new();
		let ctx = RequestContext {
			backend_name: "default".to_string(),
			model_name_override: None,
			route: Some(RouteKind::Embeddings),
		};
		let out = t
			.translate_request(&ctx, br#"{"model":"text-embedding-3-small","input":"hello"}"#)
			.unwrap();
		assert_eq!(out.body, br#"{"model":"text-embedding-3-small","input":"hello"}"#.to_vec());
		let resp = t.feed_response_body(br#"{"model":"text-embedding-3-small"}"#, true).unwrap();
		assert_eq!(resp.frames, vec![br#"{"model":"text-embedding-3-small"}"#.to_vec()]);
	}
}
