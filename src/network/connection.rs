//! ConnectionState - buffered output and tokenised input for one socket.
//!
//! Output runs through a small state machine:
//!
//! ```text
//!            write blocks              queued >= soft + credit
//!   Normal ─────────────▶ Buffering ───────────────────────▶ Overflow
//!     ▲                      │  ▲                                │
//!     └──── queue drained ───┘  └─── queued < soft + credit ─────┘
//!
//!   any ──── close() ────▶ Closed
//! ```
//!
//! Every transition bumps `epoch`; the hub arms the matching timeout and
//! ignores timers whose epoch no longer matches.

use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;

use bytes::Bytes;
use nmdc_proto::{BufferChain, ProtocolError};

use super::transport::{MAX_IOVECS, Transport};
use crate::config::LimitsConfig;
use crate::state::ConnId;

const DELIMITER: &[u8] = b"|";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Nothing queued; writes go straight to the socket.
    Normal,
    /// Output queued below the soft limit.
    Buffering,
    /// Output queued at or above the soft limit.
    Overflow,
    Closed,
}

impl OutputState {
    pub fn name(self) -> &'static str {
        match self {
            OutputState::Normal => "normal",
            OutputState::Buffering => "buffering",
            OutputState::Overflow => "overflow",
            OutputState::Closed => "closed",
        }
    }
}

/// What happened to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Fully handed to the socket.
    Sent,
    /// At least partly queued.
    Queued,
    /// Refused by the hard or total limit.
    Dropped,
}

/// Buffer thresholds, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub soft: usize,
    pub hard: usize,
    pub total: usize,
}

impl From<&LimitsConfig> for BufferLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            soft: config.buffer_soft_limit,
            hard: config.buffer_hard_limit,
            total: config.buffer_total_limit,
        }
    }
}

pub struct ConnectionState {
    pub id: ConnId,
    pub ip: Ipv4Addr,
    transport: Box<dyn Transport>,
    state: OutputState,
    queue: VecDeque<Bytes>,
    queued: usize,
    credit: usize,
    epoch: u64,
    input: BufferChain,
    want_writable: bool,
}

impl ConnectionState {
    pub fn new(id: ConnId, ip: Ipv4Addr, transport: Box<dyn Transport>) -> Self {
        Self {
            id,
            ip,
            transport,
            state: OutputState::Normal,
            queue: VecDeque::new(),
            queued: 0,
            credit: 0,
            epoch: 0,
            input: BufferChain::new(),
            want_writable: false,
        }
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    /// Bytes received but not yet parsed.
    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn queued(&self) -> usize {
        self.queued
    }

    pub fn credit(&self) -> usize {
        self.credit
    }

    pub fn is_closed(&self) -> bool {
        self.state == OutputState::Closed
    }

    /// Allow `bytes` more output before the soft and hard limits trip.
    /// Used ahead of large hub-pushed payloads such as the nicklist.
    pub fn grant_credit(&mut self, bytes: usize) {
        self.credit = self.credit.saturating_add(bytes);
    }

    /// Write `bufs` in order, queueing what the socket does not take.
    ///
    /// `total` is the hub-wide queued byte count and is kept in step with
    /// this connection's queue. A partially written buffer is always queued
    /// so the stream never carries half a token. Returns the outcome and
    /// the new output state if it changed.
    pub fn write(
        &mut self,
        bufs: &[Bytes],
        limits: &BufferLimits,
        total: &mut usize,
    ) -> io::Result<(WriteOutcome, Option<OutputState>)> {
        if self.is_closed() {
            return Err(io::ErrorKind::NotConnected.into());
        }
        let len: usize = bufs.iter().map(Bytes::len).sum();
        if len == 0 {
            return Ok((WriteOutcome::Sent, None));
        }

        if !self.queue.is_empty() {
            if !self.fits(len, limits, *total) {
                return Ok((WriteOutcome::Dropped, None));
            }
            for buf in bufs.iter().filter(|b| !b.is_empty()) {
                self.enqueue(buf.clone(), total);
            }
            return Ok((WriteOutcome::Queued, self.update_state(limits)));
        }

        let written = self.send_direct(bufs)?;
        if written == len {
            return Ok((WriteOutcome::Sent, None));
        }

        // Skip what went out, force-queue the split buffer, then apply the
        // limits to the untouched remainder as a whole.
        let mut skip = written;
        let mut rest = bufs.iter().filter(|b| !b.is_empty());
        for buf in rest.by_ref() {
            if skip < buf.len() {
                self.enqueue(buf.slice(skip..), total);
                break;
            }
            skip -= buf.len();
        }
        let remainder: Vec<&Bytes> = rest.collect();
        let remainder_len: usize = remainder.iter().map(|b| b.len()).sum();
        let outcome = if remainder_len > 0 && !self.fits(remainder_len, limits, *total) {
            WriteOutcome::Dropped
        } else {
            for buf in remainder {
                self.enqueue(buf.clone(), total);
            }
            WriteOutcome::Queued
        };
        Ok((outcome, self.update_state(limits)))
    }

    /// Drain queued output after the socket reported writability.
    pub fn on_writable(
        &mut self,
        limits: &BufferLimits,
        total: &mut usize,
    ) -> io::Result<Option<OutputState>> {
        self.want_writable = false;
        if self.is_closed() {
            return Ok(None);
        }
        while !self.queue.is_empty() {
            let batch: Vec<Bytes> = self.queue.iter().take(MAX_IOVECS).cloned().collect();
            let batch_len: usize = batch.iter().map(Bytes::len).sum();
            let written = match self.transport.try_send(&batch) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
                Err(e) => return Err(e),
            };
            self.advance(written, total);
            if written < batch_len {
                break;
            }
        }
        Ok(self.update_state(limits))
    }

    /// Release the socket and the queue. Returns false if already closed.
    pub fn close(&mut self, total: &mut usize) -> bool {
        if self.is_closed() {
            return false;
        }
        *total = total.saturating_sub(self.queued);
        self.queue.clear();
        self.queued = 0;
        self.credit = 0;
        self.input.clear();
        self.state = OutputState::Closed;
        self.epoch += 1;
        self.transport.close();
        true
    }

    /// Append received bytes to the input chain.
    ///
    /// While parsing is withheld nothing drains the chain, so it may hold
    /// at most `max_len` bytes.
    pub fn feed(
        &mut self,
        data: &[u8],
        block_on_overflow: bool,
        max_len: usize,
    ) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Ok(());
        }
        let held = self.input.len() + data.len();
        if self.input_blocked(block_on_overflow) && held > max_len {
            return Err(ProtocolError::TokenTooLong {
                actual: held,
                limit: max_len,
            });
        }
        self.input.push_slice(data);
        Ok(())
    }

    /// Whether input parsing is currently withheld.
    pub fn input_blocked(&self, block_on_overflow: bool) -> bool {
        self.is_closed() || (block_on_overflow && self.state == OutputState::Overflow)
    }

    /// Next complete token, without its `|`.
    pub fn next_token(&mut self, max_len: usize) -> Result<Option<Bytes>, ProtocolError> {
        match self.input.split_on_delimiter(DELIMITER) {
            Some(token) if token.len() > max_len => Err(ProtocolError::TokenTooLong {
                actual: token.len(),
                limit: max_len,
            }),
            Some(token) => Ok(Some(token)),
            None if self.input.len() > max_len => Err(ProtocolError::TokenTooLong {
                actual: self.input.len(),
                limit: max_len,
            }),
            None => Ok(None),
        }
    }

    fn fits(&self, len: usize, limits: &BufferLimits, total: usize) -> bool {
        self.queued + len <= limits.hard.saturating_add(self.credit)
            && total + len <= limits.total
    }

    fn enqueue(&mut self, buf: Bytes, total: &mut usize) {
        self.queued += buf.len();
        *total += buf.len();
        self.queue.push_back(buf);
    }

    fn send_direct(&mut self, bufs: &[Bytes]) -> io::Result<usize> {
        let mut written = 0;
        for chunk in bufs.chunks(MAX_IOVECS) {
            let chunk_len: usize = chunk.iter().map(Bytes::len).sum();
            let n = match self.transport.try_send(chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
                Err(e) => return Err(e),
            };
            written += n;
            self.credit = self.credit.saturating_sub(n);
            if n < chunk_len {
                break;
            }
        }
        Ok(written)
    }

    fn advance(&mut self, mut written: usize, total: &mut usize) {
        self.queued -= written;
        *total = total.saturating_sub(written);
        self.credit = self.credit.saturating_sub(written);
        while written > 0 {
            let Some(front) = self.queue.front_mut() else {
                break;
            };
            if written < front.len() {
                let _ = front.split_to(written);
                break;
            }
            written -= front.len();
            self.queue.pop_front();
        }
    }

    fn update_state(&mut self, limits: &BufferLimits) -> Option<OutputState> {
        let next = if self.queued == 0 {
            self.credit = 0;
            OutputState::Normal
        } else if self.queued >= limits.soft.saturating_add(self.credit) {
            OutputState::Overflow
        } else {
            OutputState::Buffering
        };
        let wants = next != OutputState::Normal;
        if wants && !self.want_writable {
            self.transport.want_writable(true);
            self.want_writable = true;
        }
        if next == self.state {
            return None;
        }
        self.state = next;
        self.epoch += 1;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::transport::mock::MockTransport;

    const LIMITS: BufferLimits = BufferLimits {
        soft: 10,
        hard: 20,
        total: 1000,
    };

    fn conn(mock: &MockTransport) -> ConnectionState {
        ConnectionState::new(
            ConnId(1),
            Ipv4Addr::LOCALHOST,
            Box::new(mock.clone()),
        )
    }

    fn b(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_direct_write_stays_normal() {
        let mock = MockTransport::new();
        let mut c = conn(&mock);
        let mut total = 0;
        let (outcome, change) = c.write(&[b("$Hello a|")], &LIMITS, &mut total).unwrap();
        assert_eq!(outcome, WriteOutcome::Sent);
        assert_eq!(change, None);
        assert_eq!(mock.take_sent(), "$Hello a|");
        assert_eq!(total, 0);
    }

    #[test]
    fn test_partial_write_buffers_then_drains() {
        let mock = MockTransport::with_capacity(4);
        let mut c = conn(&mock);
        let mut total = 0;
        let (outcome, change) = c.write(&[b("abcdefgh")], &LIMITS, &mut total).unwrap();
        assert_eq!(outcome, WriteOutcome::Queued);
        assert_eq!(change, Some(OutputState::Buffering));
        assert_eq!(c.queued(), 4);
        assert_eq!(total, 4);
        assert!(mock.0.borrow().want_writable);

        mock.unlimited();
        let change = c.on_writable(&LIMITS, &mut total).unwrap();
        assert_eq!(change, Some(OutputState::Normal));
        assert_eq!(mock.take_sent(), "abcdefgh");
        assert_eq!(total, 0);
    }

    #[test]
    fn test_soft_limit_overflows_and_recovers() {
        let mock = MockTransport::with_capacity(0);
        let mut c = conn(&mock);
        let mut total = 0;
        c.write(&[b("12345")], &LIMITS, &mut total).unwrap();
        assert_eq!(c.state(), OutputState::Buffering);
        let (_, change) = c.write(&[b("67890")], &LIMITS, &mut total).unwrap();
        assert_eq!(change, Some(OutputState::Overflow));
        assert!(c.input_blocked(true));
        assert!(!c.input_blocked(false));

        mock.grant(3);
        let change = c.on_writable(&LIMITS, &mut total).unwrap();
        assert_eq!(change, Some(OutputState::Buffering));
        assert_eq!(c.queued(), 7);
    }

    #[test]
    fn test_hard_limit_drops_whole_write() {
        let mock = MockTransport::with_capacity(0);
        let mut c = conn(&mock);
        let mut total = 0;
        c.write(&[b("0123456789abcdef")], &LIMITS, &mut total).unwrap();
        let (outcome, _) = c.write(&[b("0123456789")], &LIMITS, &mut total).unwrap();
        assert_eq!(outcome, WriteOutcome::Dropped);
        assert_eq!(c.queued(), 16);
    }

    #[test]
    fn test_total_limit_drops() {
        let mock = MockTransport::with_capacity(0);
        let mut c = conn(&mock);
        let mut total = 995;
        c.write(&[b("abc")], &LIMITS, &mut total).unwrap();
        let (outcome, _) = c.write(&[b("defgh")], &LIMITS, &mut total).unwrap();
        assert_eq!(outcome, WriteOutcome::Dropped);
        assert_eq!(total, 998);
    }

    #[test]
    fn test_credit_lifts_soft_limit() {
        let mock = MockTransport::with_capacity(0);
        let mut c = conn(&mock);
        let mut total = 0;
        c.grant_credit(100);
        c.write(&[b("0123456789abcdef0123456789")], &LIMITS, &mut total).unwrap();
        assert_eq!(c.state(), OutputState::Buffering);

        mock.unlimited();
        c.on_writable(&LIMITS, &mut total).unwrap();
        assert_eq!(c.state(), OutputState::Normal);
        assert_eq!(c.credit(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mock = MockTransport::with_capacity(0);
        let mut c = conn(&mock);
        let mut total = 0;
        c.write(&[b("pending")], &LIMITS, &mut total).unwrap();
        assert!(c.close(&mut total));
        assert_eq!(total, 0);
        assert!(mock.is_closed());
        assert!(!c.close(&mut total));
        assert!(c.write(&[b("x")], &LIMITS, &mut total).is_err());
    }

    #[test]
    fn test_tokens_split_across_reads() {
        let mock = MockTransport::new();
        let mut c = conn(&mock);
        c.feed(b"$Key ab", true, 100).unwrap();
        assert_eq!(c.next_token(100).unwrap(), None);
        c.feed(b"c|$ValidateNick x|$My", true, 100).unwrap();
        assert_eq!(c.next_token(100).unwrap().unwrap(), "$Key abc");
        assert_eq!(c.next_token(100).unwrap().unwrap(), "$ValidateNick x");
        assert_eq!(c.next_token(100).unwrap(), None);
    }

    #[test]
    fn test_feed_refuses_while_blocked() {
        let mock = MockTransport::new();
        let mut c = conn(&mock);
        c.feed(&[b'a'; 64], false, 16).unwrap();
        assert_eq!(c.input_len(), 64);
        c.state = OutputState::Overflow;
        assert!(matches!(
            c.feed(b"more", true, 66),
            Err(ProtocolError::TokenTooLong { actual: 68, limit: 66 })
        ));
        assert_eq!(c.input_len(), 64);
        c.feed(b"ok", true, 66).unwrap();
        assert_eq!(c.input_len(), 66);
    }

    #[test]
    fn test_oversized_token_rejected() {
        let mock = MockTransport::new();
        let mut c = conn(&mock);
        c.feed(&[b'a'; 32], true, 16).unwrap();
        assert!(matches!(
            c.next_token(16),
            Err(ProtocolError::TokenTooLong { actual: 32, limit: 16 })
        ));
    }
}
