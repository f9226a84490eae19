//! Google Vertex AI translator, covering both the OpenAI-compatible
//! `chat/completions` endpoint (`GCPVertexAI`) and the Anthropic-on-Vertex
//! `rawPredict`/`streamRawPredict` endpoints (`GCPAnthropic`), dispatching
//! the way the teacher's `llm::vertex::Provider::is_anthropic_model` does.
//! Grounded on `llm::vertex::Provider::get_path_for_model` and
//! `prepare_anthropic_request_body`.

use secrecy::ExposeSecret;
use serde_json::{Map, Value};

use super::anthropic::AnthropicTranslator;
use super::openai::OpenAiTranslator;
use super::{FeedOutput, HeaderOp, RequestContext, RequestTranslation, Translator};
use crate::config::BackendAuth;
use crate::error::TranslateError;

const ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

enum Inner {
	OpenAi(OpenAiTranslator),
	Anthropic(AnthropicTranslator),
}

/// `anthropic_mode` selects between the `GCPVertexAI` (OpenAI-compatible)
/// and `GCPAnthropic` (Anthropic Messages on Vertex) schema kinds; the
/// teacher dispatches on a per-model prefix check instead, but the config
/// layer already splits these into distinct `ApiSchemaKind` variants.
pub struct VertexTranslator {
	auth: Option<BackendAuth>,
	anthropic_mode: bool,
	inner: Inner,
}

impl VertexTranslator {
	pub fn new(auth: Option<BackendAuth>, anthropic_mode: bool) -> Self {
		let inner = if anthropic_mode {
			Inner::Anthropic(AnthropicTranslator::new(auth.clone()))
		} else {
			Inner::OpenAi(OpenAiTranslator::new())
		};
		VertexTranslator {
			auth,
			anthropic_mode,
			inner,
		}
	}

	fn project_and_region(&self) -> Result<(&str, &str), TranslateError> {
		match &self.auth {
			Some(BackendAuth::Gcp { project, region, .. }) => Ok((project.as_str(), region.as_str())),
			_ => Err(TranslateError::UnsupportedConversion(
				"gcp vertex backend requires gcp auth".to_string(),
			)),
		}
	}

	fn bearer_token(&self) -> Result<String, TranslateError> {
		match &self.auth {
			Some(BackendAuth::Gcp { access_token, .. }) => Ok(access_token.expose_secret().to_string()),
			_ => Err(TranslateError::UnsupportedConversion(
				"gcp vertex backend requires gcp auth".to_string(),
			)),
		}
	}

	/// Adds `anthropic_version` and drops `model` (it's already in the URL
	/// path), matching `prepare_anthropic_request_body`.
	fn prepare_anthropic_body(body: &[u8]) -> Result<Vec<u8>, TranslateError> {
		let mut map: Map<String, Value> = serde_json::from_slice(body)?;
		map.insert(
			"anthropic_version".to_string(),
			Value::String(ANTHROPIC_VERSION.to_string()),
		);
		map.remove("model");
		Ok(serde_json::to_vec(&map)?)
	}
}

impl Translator for VertexTranslator {
	fn translate_request(
		&mut self,
		ctx: &RequestContext,
		body: &[u8],
	) -> Result<RequestTranslation, TranslateError> {
		if ctx.route == Some(crate::extproc::registry::RouteKind::Embeddings) {
			return Err(TranslateError::UnsupportedConversion(
				"gcp vertex backend does not support embeddings translation".to_string(),
			));
		}

		let (project, region) = self.project_and_region()?;
		let token = self.bearer_token()?;

		let streaming = serde_json::from_slice::<Value>(body)
			.ok()
			.and_then(|v| v.get("stream").and_then(Value::as_bool))
			.unwrap_or(false);

		match &mut self.inner {
			Inner::Anthropic(translator) => {
				// Delegate for header/usage bookkeeping, then rewrite the body
				// and path per Vertex's Anthropic surface.
				let mut translation = translator.translate_request(ctx, body)?;
				translation.body = Self::prepare_anthropic_body(&translation.body)?;
				let model = ctx
					.model_name_override
					.clone()
					.unwrap_or_else(|| "claude".to_string());
				let route = if streaming {
					"streamRawPredict"
				} else {
					"rawPredict"
				};
				let path = format!(
					"/v1/projects/{project}/locations/{region}/publishers/anthropic/models/{model}:{route}"
				);
				translation.path_override = Some(path);
				translation.header_ops = vec![
					HeaderOp::Remove("authorization".to_string()),
					HeaderOp::Remove("x-api-key".to_string()),
					HeaderOp::Remove("anthropic-version".to_string()),
					HeaderOp::Set("authorization".to_string(), format!("Bearer {token}")),
				];
				return Ok(translation);
			},
			Inner::OpenAi(translator) => {
				let mut translation = translator.translate_request(ctx, body)?;
				let path = format!(
					"/v1/projects/{project}/locations/{region}/endpoints/openapi/chat/completions"
				);
				translation.path_override = Some(path);
				translation.header_ops = vec![
					HeaderOp::Remove("authorization".to_string()),
					HeaderOp::Set("authorization".to_string(), format!("Bearer {token}")),
				];
				return Ok(translation);
			},
		}
	}

	fn translate_response_headers(&mut self, ctx: &RequestContext) -> Vec<HeaderOp> {
		match &mut self.inner {
			Inner::OpenAi(t) => t.translate_response_headers(ctx),
			Inner::Anthropic(t) => t.translate_response_headers(ctx),
		}
	}

	fn feed_response_body(
		&mut self,
		chunk: &[u8],
		end_of_stream: bool,
	) -> Result<FeedOutput, TranslateError> {
		match &mut self.inner {
			Inner::OpenAi(t) => t.feed_response_body(chunk, end_of_stream),
			Inner::Anthropic(t) => t.feed_response_body(chunk, end_of_stream),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use secrecy::SecretString;

	fn gcp_auth() -> BackendAuth {
		BackendAuth::Gcp {
			access_token: SecretString::from("ya29.test".to_string()),
			region: "us-central1".to_string(),
			project: "my-project".to_string(),
		}
	}

	#[test]
	fn openai_mode_targets_chat_completions_endpoint() {
		let mut t = VertexTranslator::new(Some(gcp_auth()), false);
		let ctx = RequestContext {
			backend_name: "vertex".to_string(),
			model_name_override: None,
			route: Some(crate::extproc::registry::RouteKind::ChatCompletions),
		};
		let out = t
			.translate_request(&ctx, br#"{"model":"gemini-1.5-pro","messages":[]}"#)
			.unwrap();
		assert_eq!(
			out.path_override.unwrap(),
			"/v1/projects/my-project/locations/us-central1/endpoints/openapi/chat/completions"
		);
	}

	#[test]
	fn anthropic_mode_targets_raw_predict_and_strips_model() {
		let mut t = VertexTranslator::new(Some(gcp_auth()), true);
		let ctx = RequestContext {
			backend_name: "vertex-anthropic".to_string(),
			model_name_override: Some("claude-3-5-sonnet".to_string()),
			route: Some(crate::extproc::registry::RouteKind::ChatCompletions),
		};
		let out = t
			.translate_request(
				&ctx,
				br#"{"model":"claude-3-5-sonnet","messages":[{"role":"user","content":"hi"}]}"#,
			)
			.unwrap();
		assert_eq!(
			out.path_override.unwrap(),
			"/v1/projects/my-project/locations/us-central1/publishers/anthropic/models/claude-3-5-sonnet:rawPredict"
		);
		let value: serde_json::Value = serde_json::from_slice(&out.body).unwrap();
		assert!(value.get("model").is_none());
		assert_eq!(value.get("anthropic_version").unwrap(), ANTHROPIC_VERSION);
	}
}
