//! Newline-delimited JSON framing.
//!
//! The decoder owns the read buffer: bytes stay in it until a `\n`
//! arrives, so a read that ends mid-object or mid-character just waits
//! for more input.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::OfsError;
use crate::message::Incoming;

/// Default upper bound on a single received line (16 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct JsonLineCodec {
    /// Index in the buffer where the newline search resumes.
    next_index: usize,
    max_length: usize,
}

impl JsonLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }
}

impl Default for JsonLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode bytes as UTF-8, or as Latin-1 when that fails.
///
/// Latin-1 maps every byte to a char, so this never fails.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Turn one raw line into a message. Blank lines yield `None`.
fn line_to_message(raw: &[u8]) -> Option<Incoming> {
    let text = decode_text(raw);
    let line = text.trim();
    if line.is_empty() {
        return None;
    }
    Some(Incoming::from_line(line.to_owned()))
}

impl Decoder for JsonLineCodec {
    type Item = Incoming;
    type Error = OfsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.next_index..].iter().position(|b| *b == b'\n');
            let Some(offset) = newline else {
                if src.len() > self.max_length {
                    return Err(OfsError::LineTooLong {
                        max: self.max_length,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            if end > self.max_length {
                return Err(OfsError::LineTooLong {
                    max: self.max_length,
                });
            }

            let line = src.split_to(end + 1);
            if let Some(msg) = line_to_message(&line[..end]) {
                return Ok(Some(msg));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(msg) = self.decode(src)? {
            return Ok(Some(msg));
        }
        // Unterminated tail left behind by the peer.
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        Ok(line_to_message(&rest))
    }
}

impl Encoder<String> for JsonLineCodec {
    type Error = OfsError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        if !item.ends_with('\n') {
            dst.put_u8(b'\n');
        }
        Ok(())
    }
}
