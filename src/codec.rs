//! Wire framing
//!
//! `Raw` reproduces the reference protocol: whatever one read returns (up to
//! the unit size) is one unit, and nothing is added on write. A byte stream
//! does not preserve write boundaries, so under load two units may arrive as
//! one or one unit may arrive in pieces. `LengthPrefixed` removes that
//! ambiguity with a 4-byte big-endian length before every payload.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use serde::Deserialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_UNIT_SIZE;
use crate::message::Message;

const LENGTH_PREFIX: usize = 4;

/// How units are delimited on the byte stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One read = one unit (reference behavior)
    #[default]
    Raw,
    /// `u32` big-endian length, then payload
    LengthPrefixed,
}

/// Codec for chat units
#[derive(Debug, Clone, Copy)]
pub struct ChatCodec {
    framing: Framing,
    max_unit_size: usize,
}

impl ChatCodec {
    pub fn new(framing: Framing, max_unit_size: usize) -> Self {
        Self {
            framing,
            max_unit_size,
        }
    }

    /// Whether `msg` fits this framing; raw units are never rejected
    pub fn can_encode(&self, msg: &Message) -> bool {
        match self.framing {
            Framing::Raw => true,
            Framing::LengthPrefixed => msg.len() <= self.max_unit_size,
        }
    }

    pub fn max_unit_size(&self) -> usize {
        self.max_unit_size
    }

    fn too_large(&self, len: usize) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unit of {} bytes exceeds limit of {}", len, self.max_unit_size),
        )
    }
}

impl Default for ChatCodec {
    fn default() -> Self {
        Self::new(Framing::Raw, MAX_UNIT_SIZE)
    }
}

impl Decoder for ChatCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, io::Error> {
        match self.framing {
            Framing::Raw => {
                if src.is_empty() {
                    return Ok(None);
                }
                let len = src.len().min(self.max_unit_size);
                Ok(Some(Message::from(src.split_to(len).freeze())))
            }
            Framing::LengthPrefixed => {
                if src.len() < LENGTH_PREFIX {
                    return Ok(None);
                }
                let mut prefix = [0u8; LENGTH_PREFIX];
                prefix.copy_from_slice(&src[..LENGTH_PREFIX]);
                let len = u32::from_be_bytes(prefix) as usize;
                if len > self.max_unit_size {
                    return Err(self.too_large(len));
                }
                if src.len() < LENGTH_PREFIX + len {
                    src.reserve(LENGTH_PREFIX + len - src.len());
                    return Ok(None);
                }
                src.advance(LENGTH_PREFIX);
                Ok(Some(Message::from(src.split_to(len).freeze())))
            }
        }
    }
}

impl Encoder<Message> for ChatCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), io::Error> {
        match self.framing {
            Framing::Raw => {
                dst.extend_from_slice(item.as_bytes());
            }
            Framing::LengthPrefixed => {
                if !self.can_encode(&item) {
                    return Err(self.too_large(item.len()));
                }
                dst.reserve(LENGTH_PREFIX + item.len());
                dst.put_u32(item.len() as u32);
                dst.extend_from_slice(item.as_bytes());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_splits_at_unit_size() {
        let mut codec = ChatCodec::new(Framing::Raw, 4);
        let mut buf = BytesMut::from(&b"abcdef"[..]);

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.as_bytes(), b"abcd");
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.as_bytes(), b"ef");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_raw_encode_adds_nothing() {
        let mut codec = ChatCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Message::text("APELIDO"), &mut buf).unwrap();
        assert_eq!(&buf[..], b"APELIDO");
    }

    #[test]
    fn test_length_prefixed_waits_for_full_frame() {
        let mut codec = ChatCodec::new(Framing::LengthPrefixed, MAX_UNIT_SIZE);
        let mut buf = BytesMut::from(&[0u8, 0, 0, 5, b'h', b'e'][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"llo");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.as_bytes(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_length_prefixed_keeps_boundaries() {
        let mut codec = ChatCodec::new(Framing::LengthPrefixed, MAX_UNIT_SIZE);
        let mut buf = BytesMut::new();
        codec.encode(Message::text("alice: oi"), &mut buf).unwrap();
        codec.encode(Message::text("bob: ola"), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().to_text(), "alice: oi");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().to_text(), "bob: ola");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_can_encode() {
        let long = Message::text("x".repeat(9));
        assert!(ChatCodec::new(Framing::Raw, 8).can_encode(&long));
        assert!(!ChatCodec::new(Framing::LengthPrefixed, 8).can_encode(&long));
        assert!(ChatCodec::new(Framing::LengthPrefixed, 9).can_encode(&long));
    }

    #[test]
    fn test_length_prefixed_rejects_oversized() {
        let mut codec = ChatCodec::new(Framing::LengthPrefixed, 8);

        let mut buf = BytesMut::from(&[0u8, 0, 0, 9][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut out = BytesMut::new();
        let err = codec.encode(Message::text("123456789"), &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
