//! The narrowed OpenAI Chat Completions wire shape every translator speaks
//! as its common currency. Tool-calling and multi-part (image/document)
//! content blocks are intentionally not modeled — see DESIGN.md.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
	pub role: String,
	#[serde(default)]
	pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
	pub model: String,
	pub messages: Vec<ChatMessage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(default)]
	pub stream: bool,
}

/// Peeks at a request body's `stream` flag without committing to the full
/// `ChatRequest` shape, so a pass-through translator can tell streaming from
/// non-streaming for non-chat routes (embeddings, models) too.
#[derive(Debug, Default, Deserialize)]
struct StreamFlag {
	#[serde(default)]
	stream: bool,
}

pub fn peek_stream(body: &[u8]) -> bool {
	serde_json::from_slice::<StreamFlag>(body).map(|f| f.stream).unwrap_or(false)
}

impl ChatRequest {
	pub fn system_text(&self) -> String {
		self
			.messages
			.iter()
			.filter(|m| m.role == "system")
			.filter_map(|m| m.content.as_deref())
			.collect::<Vec<_>>()
			.join("\n")
	}

	pub fn non_system_messages(&self) -> impl Iterator<Item = &ChatMessage> {
		self.messages.iter().filter(|m| m.role != "system")
	}
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptTokensDetails {
	#[serde(default)]
	pub cached_tokens: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
	#[serde(default)]
	pub prompt_tokens: u64,
	#[serde(default)]
	pub completion_tokens: u64,
	#[serde(default)]
	pub total_tokens: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Choice {
	#[serde(default)]
	pub index: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<ChatMessage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delta: Option<ChatMessage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatResponse {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(default)]
	pub choices: Vec<Choice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}
