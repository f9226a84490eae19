//! Server-Sent Events splitting: events are delimited by a blank line
//! (`\n\n`); partial events accumulate in the buffer across chunks.

/// Splits a byte stream into complete SSE events. Each returned event is
/// the raw event text (e.g. `data: {...}`) with the trailing blank-line
/// terminator stripped.
#[derive(Default)]
pub struct SseDecoder {
	buf: Vec<u8>,
}

impl SseDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Feed the next chunk. On `eof`, any remaining buffered bytes are
	/// flushed as a final event even without a terminator, so a caller that
	/// feeds an entire response in one shot with `eof=true` gets every event
	/// back regardless of whether the upstream closed the stream with a
	/// trailing blank line.
	pub fn feed(&mut self, chunk: &[u8], eof: bool) -> Vec<Vec<u8>> {
		self.buf.extend_from_slice(chunk);
		let mut events = Vec::new();
		while let Some(pos) = find(&self.buf, b"\n\n") {
			let event = self.buf[..pos].to_vec();
			self.buf.drain(..pos + 2);
			events.push(event);
		}
		if eof && !self.buf.is_empty() {
			events.push(std::mem::take(&mut self.buf));
		}
		events
	}
}

/// Reconstruct a complete SSE frame from event text already carrying its
/// `data: ` prefix (or `event:`/`id:` lines) — just restore the blank-line
/// terminator.
pub fn reframe(event_text: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(event_text.len() + 2);
	out.extend_from_slice(event_text);
	out.extend_from_slice(b"\n\n");
	out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack
		.windows(needle.len())
		.position(|window| window == needle)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_complete_events_across_feeds() {
		let mut decoder = SseDecoder::new();
		assert!(decoder.feed(b"data: 1\n\ndata: 2\n\n", false).len() == 2);
	}

	#[test]
	fn buffers_partial_event_until_more_data_arrives() {
		let mut decoder = SseDecoder::new();
		assert!(decoder.feed(b"data: 1\n\ndata: 2", false).len() == 1);
		let rest = decoder.feed(b"\n\n", false);
		assert_eq!(rest, vec![b"data: 2".to_vec()]);
	}

	#[test]
	fn flushes_trailing_partial_event_on_eof() {
		let mut decoder = SseDecoder::new();
		let events = decoder.feed(b"data: 1\n\ndata: 2", true);
		assert_eq!(events, vec![b"data: 1".to_vec(), b"data: 2".to_vec()]);
	}

	#[test]
	fn reframe_restores_terminator() {
		assert_eq!(reframe(b"data: 1"), b"data: 1\n\n".to_vec());
	}
}
