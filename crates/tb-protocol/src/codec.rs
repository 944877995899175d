//! Tokio codec for newline-delimited message envelopes

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::error::ProtocolError;
use crate::message::Message;

/// Maximum length of a single encoded record, excluding the newline
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Codec for encoding/decoding one JSON envelope per line
///
/// Blank lines are skipped. A record that is not a valid envelope yields
/// [`ProtocolError::Malformed`]; the stream cannot be resynchronized after
/// that, so callers should drop the connection.
#[derive(Debug)]
pub struct MessageCodec {
    lines: LinesCodec,
    max_length: usize,
}

impl MessageCodec {
    /// Create a new codec with the default record limit
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom record limit
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }

    fn parse(&self, line: Option<String>) -> Result<Option<Option<Message>>, ProtocolError> {
        match line {
            None => Ok(None),
            Some(line) if line.trim().is_empty() => Ok(Some(None)),
            Some(line) => Ok(Some(Some(serde_json::from_str(line.trim())?))),
        }
    }

    fn map_err(&self, err: LinesCodecError) -> ProtocolError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => ProtocolError::LineTooLong {
                max: self.max_length,
            },
            LinesCodecError::Io(e) => ProtocolError::Io(e),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let line = self.lines.decode(src).map_err(|e| self.map_err(e))?;
            match self.parse(line)? {
                None => return Ok(None), // Need more data
                Some(None) => continue,  // Blank line
                Some(Some(message)) => return Ok(Some(message)),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let line = self.lines.decode_eof(src).map_err(|e| self.map_err(e))?;
            match self.parse(line)? {
                None => return Ok(None),
                Some(None) => continue,
                Some(Some(message)) => return Ok(Some(message)),
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&message)?;
        if payload.len() > self.max_length {
            return Err(ProtocolError::LineTooLong {
                max: self.max_length,
            });
        }

        dst.reserve(payload.len() + 1);
        dst.put_slice(&payload);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Event, MessageKind};
    use crate::scope::ScopeId;

    #[test]
    fn test_codec_encodes_one_line_per_message() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(Message::ping(), &mut buf).unwrap();
        codec.encode(Message::subscribe(ScopeId::new(4)), &mut buf).unwrap();

        let text = std::str::from_utf8(&buf).unwrap();
        assert_eq!(text.matches('\n').count(), 2);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = MessageCodec::new();
        let mut full = BytesMut::new();
        codec
            .encode(
                Message::event(Event::database_changed(ScopeId::new(1), 5).with_sequence(12)),
                &mut full,
            )
            .unwrap();

        // Split the buffer to simulate partial read
        let mut partial = full.split_to(10);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.kind, MessageKind::Event);
        assert_eq!(decoded.into_event().unwrap().sequence, 12);
    }

    #[test]
    fn test_codec_skips_blank_lines() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&b"\n  \n{\"version\":1,\"kind\":\"ping\"}\n"[..]);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.kind, MessageKind::Ping);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_rejects_garbage() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&b"not json at all\n"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_codec_rejects_oversized_record() {
        let mut codec = MessageCodec::with_max_length(16);
        let mut buf = BytesMut::from(&b"{\"version\":1,\"kind\":\"ping\"}\n"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::LineTooLong { max: 16 })
        ));
    }

    #[test]
    fn test_codec_decodes_unterminated_tail_at_eof() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&b"{\"kind\":\"ping\"}"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        let decoded = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.kind, MessageKind::Ping);
    }
}
