//! Newline framing for the bridge stream.
//!
//! Each frame is one line. A line that is not valid UTF-8, or that exceeds
//! [`MAX_LINE_LENGTH`], decodes to an `Err` item so the reader can log it and
//! carry on; only I/O failures end the stream.

use super::Command;
use crate::errors::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Lines longer than this are dropped up to the next newline.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct LineCodec {
    /// Bytes already scanned for a newline
    scanned: usize,
    /// Dropping the tail of an over-long line
    discarding: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_line(bytes: &[u8]) -> ProtocolResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ProtocolError::Malformed(format!("invalid UTF-8: {}", e)))
}

fn too_long() -> ProtocolError {
    ProtocolError::Malformed(format!("line exceeds {} bytes", MAX_LINE_LENGTH))
}

impl Decoder for LineCodec {
    type Item = ProtocolResult<String>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.scanned..].iter().position(|b| *b == b'\n');
            let Some(offset) = newline else {
                if self.discarding {
                    src.clear();
                    self.scanned = 0;
                    return Ok(None);
                }
                if src.len() > MAX_LINE_LENGTH {
                    src.clear();
                    self.scanned = 0;
                    self.discarding = true;
                    return Ok(Some(Err(too_long())));
                }
                self.scanned = src.len();
                return Ok(None);
            };

            let end = self.scanned + offset;
            self.scanned = 0;
            let mut line = src.split_to(end);
            src.advance(1);
            if self.discarding {
                // tail of a line already reported
                self.discarding = false;
                continue;
            }
            if line.len() > MAX_LINE_LENGTH {
                return Ok(Some(Err(too_long())));
            }
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            return Ok(Some(to_line(&line)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => {
                // final line without a newline
                self.scanned = 0;
                let rest = src.split_to(src.len());
                Ok(Some(to_line(&rest)))
            }
        }
    }
}

impl Encoder<Command> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_line();
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_line(codec: &mut LineCodec, buf: &mut BytesMut) -> Option<String> {
        codec.decode(buf).unwrap().map(|line| line.unwrap())
    }

    #[test]
    fn test_decode_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("RUN a1\r\nPAUSE a");

        assert_eq!(next_line(&mut codec, &mut buf), Some("RUN a1".to_string()));
        assert_eq!(next_line(&mut codec, &mut buf), None);

        buf.extend_from_slice(b"2\n");
        assert_eq!(next_line(&mut codec, &mut buf), Some("PAUSE a2".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_eof_returns_trailing_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("STOP");
        let line = codec.decode_eof(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(line, "STOP");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_a_line_error() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"EVAL a1 \xff\xfe\nPAUSE a1\n"[..]);

        let bad = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(bad, Err(ProtocolError::Malformed(_))));
        assert_eq!(next_line(&mut codec, &mut buf), Some("PAUSE a1".to_string()));
    }

    #[test]
    fn test_overlong_line_is_dropped_up_to_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(vec![b'x'; MAX_LINE_LENGTH + 1].as_slice());

        let bad = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(bad, Err(ProtocolError::Malformed(_))));
        assert!(buf.is_empty());

        buf.extend_from_slice(b"xxxx\nRUN a1\n");
        assert_eq!(next_line(&mut codec, &mut buf), Some("RUN a1".to_string()));
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Command::Launched { id: "a1".into() }, &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"LAUNCHED a1\n");
    }
}
