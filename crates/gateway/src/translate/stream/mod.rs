//! Restartable streaming frame codecs (§4.4, §9 "Streaming translator
//! buffer"). Each codec owns an internal buffer and exposes
//! `feed(bytes, eof) -> Vec<logical frame>`, never emitting a partial
//! frame.

pub mod aws_event_stream;
pub mod jsonl;
pub mod sse;

pub use aws_event_stream::AwsEventStreamDecoder;
pub use jsonl::JsonLinesDecoder;
pub use sse::SseDecoder;

/// Render one OpenAI-style chunk as a complete SSE event, `data: <payload>\n\n`.
pub fn frame_as_sse_event(payload: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(payload.len() + 8);
	out.extend_from_slice(b"data: ");
	out.extend_from_slice(payload);
	out.extend_from_slice(b"\n\n");
	out
}

/// The literal terminal SSE frame OpenAI-compatible streams emit.
pub const DONE_EVENT: &[u8] = b"data: [DONE]\n\n";
