//! Decoder for the AWS event-stream binary framing (prelude length +
//! headers + payload + CRCs) used by Bedrock's `converse-stream` and
//! `invoke-with-response-stream` APIs. Grounded on the teacher's
//! `parse::aws_sse::EventStreamCodec`, which wraps the same
//! `aws_smithy_eventstream` decoder as a `tokio_util::codec::Decoder`; here
//! the decoder is driven directly since the ExtProc protocol hands us
//! discrete chunks rather than an async byte stream.

use aws_smithy_eventstream::frame::{DecodedFrame, MessageFrameDecoder};
use aws_smithy_types::event_stream::Message;
use bytes::BytesMut;

use crate::error::TranslateError;

#[derive(Default)]
pub struct AwsEventStreamDecoder {
	inner: MessageFrameDecoder,
	buf: BytesMut,
}

impl AwsEventStreamDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Decode as many complete messages as the buffer currently holds.
	/// `end_of_stream` carries no special meaning here beyond being
	/// forwarded by the caller for logging; a well-formed upstream always
	/// closes on a frame boundary.
	pub fn feed(&mut self, chunk: &[u8], _end_of_stream: bool) -> Result<Vec<Message>, TranslateError> {
		self.buf.extend_from_slice(chunk);
		let mut messages = Vec::new();
		loop {
			match self.inner.decode_frame(&mut self.buf) {
				Ok(DecodedFrame::Complete(message)) => messages.push(message),
				Ok(DecodedFrame::Incomplete) => break,
				Err(error) => return Err(TranslateError::Stream(error.to_string())),
			}
		}
		Ok(messages)
	}
}

/// The event-type header AWS event-stream messages carry (`:event-type`),
/// used to distinguish content chunks from the final metadata message.
pub fn event_type(message: &Message) -> Option<String> {
	message
		.headers()
		.iter()
		.find(|h| h.name().as_str() == ":event-type")
		.and_then(|h| h.value().as_string().ok())
		.map(|s| s.as_str().to_string())
}
