//! `|`-delimited token codec for tokio.
//!
//! The hub itself splits tokens with [`BufferChain`](crate::BufferChain);
//! this codec serves clients and tests that want a `Framed` stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Default maximum token length.
pub const DEFAULT_MAX_TOKEN: usize = 64 * 1024;

/// Codec yielding one token (without its `|`) per frame.
#[derive(Debug, Clone)]
pub struct NmdcCodec {
    next_index: usize,
    max_len: usize,
}

impl NmdcCodec {
    /// Create a codec with the default token limit.
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_TOKEN)
    }

    /// Create a codec with a custom token limit.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for NmdcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NmdcCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'|') {
            let end = self.next_index + offset;
            self.next_index = 0;
            if end > self.max_len {
                return Err(ProtocolError::TokenTooLong {
                    actual: end,
                    limit: self.max_len,
                });
            }
            let token = src.split_to(end).freeze();
            src.advance(1);
            Ok(Some(token))
        } else {
            self.next_index = src.len();
            if src.len() > self.max_len {
                return Err(ProtocolError::TokenTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }
            Ok(None)
        }
    }
}

impl Encoder<Bytes> for NmdcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(&item);
        Ok(())
    }
}

impl<'a> Encoder<&'a [u8]> for NmdcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &'a [u8], dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(item);
        Ok(())
    }
}
