//! Byte buffers and buffer chains.
//!
//! The hub moves every message around as bytes from the [`bytes`] crate:
//!
//! - an owned, writable buffer is a [`BytesMut`] with a fixed capacity,
//!   extended through [`BufferExt`];
//! - a shared, read-only buffer is a [`Bytes`]: cloning it is a reference
//!   count bump, so a flush buffer handed to thousands of connections is
//!   never deep-copied; `Bytes::from_static` covers borrowed static data;
//! - a [`BufferChain`] is an ordered run of segments holding a logical
//!   message that spans several allocations (socket reads, growable output).

use std::collections::VecDeque;
use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

/// Smallest link allocated by [`BufferChain::append_formatted_growable`].
pub const GROWABLE_MIN: usize = 256;

/// Fixed-capacity write helpers for [`BytesMut`].
///
/// None of these methods reallocate: writes past the capacity chosen at
/// allocation time are truncated.
pub trait BufferExt {
    /// Bytes that can still be written without reallocating.
    fn remaining_capacity(&self) -> usize;

    /// Append as much of `bytes` as fits, returning the number copied.
    fn append_bytes(&mut self, bytes: &[u8]) -> usize;

    /// Append formatted text, truncating silently at capacity.
    ///
    /// Returns `false` when the output was truncated.
    fn append_formatted(&mut self, args: fmt::Arguments<'_>) -> bool;
}

/// Allocate an empty buffer able to hold `capacity` bytes.
pub fn allocate(capacity: usize) -> BytesMut {
    BytesMut::with_capacity(capacity)
}

impl BufferExt for BytesMut {
    fn remaining_capacity(&self) -> usize {
        self.capacity() - self.len()
    }

    fn append_bytes(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining_capacity());
        self.extend_from_slice(&bytes[..n]);
        n
    }

    fn append_formatted(&mut self, args: fmt::Arguments<'_>) -> bool {
        let room = self.remaining_capacity();
        let mut writer = Truncating {
            buf: self,
            room,
            overflowed: false,
        };
        let _ = fmt::Write::write_fmt(&mut writer, args);
        !writer.overflowed
    }
}

struct Truncating<'a> {
    buf: &'a mut BytesMut,
    room: usize,
    overflowed: bool,
}

impl fmt::Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let n = bytes.len().min(self.room);
        self.buf.extend_from_slice(&bytes[..n]);
        self.room -= n;
        if n < bytes.len() {
            self.overflowed = true;
            return Err(fmt::Error);
        }
        Ok(())
    }
}

/// An ordered chain of byte segments read or written as one logical stream.
#[derive(Debug, Default)]
pub struct BufferChain {
    segments: VecDeque<BytesMut>,
    len: usize,
    /// Offset before which no delimiter start can occur.
    scanned: usize,
}

impl BufferChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bytes in the chain.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the chain holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of linked segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Link a segment at the end of the chain. Empty segments are dropped.
    pub fn push(&mut self, segment: BytesMut) {
        if segment.is_empty() {
            return;
        }
        self.len += segment.len();
        self.segments.push_back(segment);
    }

    /// Copy `bytes` into a new segment at the end of the chain.
    pub fn push_slice(&mut self, bytes: &[u8]) {
        self.push(BytesMut::from(bytes));
    }

    /// Release every segment.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.len = 0;
        self.scanned = 0;
    }

    /// Remove and return the bytes before the first occurrence of
    /// `delimiter`, consuming the delimiter itself.
    ///
    /// Segments that are fully consumed are released. Returns `None` (and
    /// leaves the chain untouched) when no complete delimiter is buffered.
    pub fn split_on_delimiter(&mut self, delimiter: &[u8]) -> Option<Bytes> {
        if delimiter.is_empty() {
            return None;
        }
        let pos = self.find(delimiter)?;
        let token = self.take(pos);
        self.discard(delimiter.len());
        self.scanned = 0;
        Some(token)
    }

    /// Flatten the chain into a single fresh buffer with `extra_capacity`
    /// spare bytes after the copied content.
    pub fn concat_copy(&self, extra_capacity: usize) -> BytesMut {
        let mut out = BytesMut::with_capacity(self.len + extra_capacity);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out
    }

    /// Append formatted text to the last segment, linking a new segment of
    /// double the previous size whenever the text does not fit.
    pub fn append_formatted_growable(&mut self, args: fmt::Arguments<'_>) {
        let mut size = GROWABLE_MIN / 2;
        if let Some(back) = self.segments.back_mut() {
            let before = back.len();
            if back.append_formatted(args) {
                self.len += back.len() - before;
                return;
            }
            back.truncate(before);
            size = size.max(back.capacity());
        }
        loop {
            size = size.saturating_mul(2);
            let mut segment = BytesMut::with_capacity(size);
            if segment.append_formatted(args) {
                self.push(segment);
                return;
            }
        }
    }

    /// Consume the chain into one shared buffer. A single segment is frozen
    /// without copying.
    pub fn freeze(mut self) -> Bytes {
        if self.segments.len() == 1 {
            if let Some(only) = self.segments.pop_front() {
                return only.freeze();
            }
        }
        self.concat_copy(0).freeze()
    }

    fn find(&mut self, delimiter: &[u8]) -> Option<usize> {
        let first = delimiter[0];
        let mut base = 0;
        for (idx, segment) in self.segments.iter().enumerate() {
            let end = base + segment.len();
            if end > self.scanned {
                let from = self.scanned.saturating_sub(base);
                for (i, &byte) in segment[from..].iter().enumerate() {
                    if byte == first && self.matches_at(idx, from + i, delimiter) {
                        return Some(base + from + i);
                    }
                }
            }
            base = end;
        }
        self.scanned = self.len.saturating_sub(delimiter.len() - 1);
        None
    }

    fn matches_at(&self, idx: usize, offset: usize, delimiter: &[u8]) -> bool {
        if delimiter.len() == 1 {
            return true;
        }
        let head = &self.segments[idx][offset..];
        let mut bytes = head
            .iter()
            .chain(self.segments.range(idx + 1..).flat_map(|s| s.iter()));
        delimiter.iter().all(|d| bytes.next() == Some(d))
    }

    fn take(&mut self, n: usize) -> Bytes {
        self.len -= n;
        if let Some(front) = self.segments.front_mut() {
            if front.len() >= n {
                let token = front.split_to(n).freeze();
                if front.is_empty() {
                    self.segments.pop_front();
                }
                return token;
            }
        }

        let mut out = BytesMut::with_capacity(n);
        let mut left = n;
        while left > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            if front.len() <= left {
                left -= front.len();
                out.extend_from_slice(&front[..]);
                self.segments.pop_front();
            } else {
                out.extend_from_slice(&front.split_to(left));
                left = 0;
            }
        }
        out.freeze()
    }

    fn discard(&mut self, n: usize) {
        self.len -= n;
        let mut left = n;
        while left > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            if front.len() <= left {
                left -= front.len();
                self.segments.pop_front();
            } else {
                front.advance(left);
                left = 0;
            }
        }
    }
}
