//! The OpenAI `/v1/embeddings` wire shape. Kept separate from `chat.rs`
//! since an embeddings request has no `messages` field and every
//! non-passthrough translator needs to tell the two apart before picking a
//! deserialization target (§4.2, §4.4).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingsRequest {
	pub model: String,
	/// A single string, or a batch of strings/token arrays; left untyped
	/// since translators that support embeddings pass it through unchanged.
	pub input: serde_json::Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub encoding_format: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dimensions: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmbeddingsUsage {
	#[serde(default)]
	pub prompt_tokens: u64,
	#[serde(default)]
	pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmbeddingsResponse {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<EmbeddingsUsage>,
}
