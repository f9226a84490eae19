//! JSON-line streaming: each non-empty line is a complete JSON payload,
//! reframed into an SSE `data:` event for the client.

/// Splits a byte stream on `\n`; each non-empty line is a complete frame.
#[derive(Default)]
pub struct JsonLinesDecoder {
	buf: Vec<u8>,
}

impl JsonLinesDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn feed(&mut self, chunk: &[u8], eof: bool) -> Vec<Vec<u8>> {
		self.buf.extend_from_slice(chunk);
		let mut lines = Vec::new();
		while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
			let line = self.buf[..pos].to_vec();
			self.buf.drain(..=pos);
			if !line.is_empty() {
				lines.push(line);
			}
		}
		if eof && !self.buf.is_empty() {
			lines.push(std::mem::take(&mut self.buf));
		}
		lines
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::translate::stream::frame_as_sse_event;

	#[test]
	fn splits_lines_and_reframes_as_sse() {
		let mut decoder = JsonLinesDecoder::new();
		let lines = decoder.feed(b"1\n2", true);
		assert_eq!(lines, vec![b"1".to_vec(), b"2".to_vec()]);
		let reframed: Vec<u8> = lines.iter().flat_map(|l| frame_as_sse_event(l)).collect();
		assert_eq!(reframed, b"data: 1\n\ndata: 2\n\n".to_vec());
	}

	#[test]
	fn skips_empty_lines() {
		let mut decoder = JsonLinesDecoder::new();
		let lines = decoder.feed(b"1\n\n2\n", false);
		assert_eq!(lines, vec![b"1".to_vec(), b"2".to_vec()]);
	}
}
