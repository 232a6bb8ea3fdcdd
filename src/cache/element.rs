//! One broadcast class queue.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::security::{LeakyBucket, LeakyBucketType};
use crate::state::ConnId;

/// Queued messages of one class, flushed as a single shared buffer.
///
/// Order of `entries` is delivery order. `length` is always the sum of the
/// queued message sizes.
#[derive(Debug)]
pub struct CacheElement {
    entries: VecDeque<(Option<ConnId>, Bytes)>,
    length: usize,
    cadence: LeakyBucketType,
    bucket: LeakyBucket,
}

/// A materialised class ready for delivery.
#[derive(Debug)]
pub struct Batch {
    pub shared: Bytes,
    pub entries: Vec<(Option<ConnId>, Bytes)>,
}

impl Batch {
    /// The batch without any message written by `id`.
    pub fn without(&self, id: ConnId) -> Bytes {
        let len = self
            .entries
            .iter()
            .filter(|(author, _)| *author != Some(id))
            .map(|(_, msg)| msg.len())
            .sum();
        let mut out = BytesMut::with_capacity(len);
        for (author, msg) in &self.entries {
            if *author != Some(id) {
                out.extend_from_slice(msg);
            }
        }
        out.freeze()
    }
}

impl CacheElement {
    /// A class flushed at most once per `period`. Periods of a second or
    /// less flush on every tick.
    pub fn new(period: Duration, now: Instant) -> Self {
        let cadence = LeakyBucketType::new(period, 1, 1);
        Self {
            entries: VecDeque::new(),
            length: 0,
            bucket: LeakyBucket::full(&cadence, now),
            cadence,
        }
    }

    pub fn set_period(&mut self, period: Duration) {
        self.cadence = LeakyBucketType::new(period, 1, 1);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Queued bytes.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn push(&mut self, author: Option<ConnId>, msg: Bytes) {
        self.length += msg.len();
        self.entries.push_back((author, msg));
    }

    /// Drop every queued message from `author`, returning how many went.
    pub fn purge(&mut self, author: ConnId) -> usize {
        let before = self.entries.len();
        let mut length = 0;
        self.entries.retain(|(who, msg)| {
            let keep = *who != Some(author);
            if keep {
                length += msg.len();
            }
            keep
        });
        self.length = length;
        before - self.entries.len()
    }

    /// Whether the class may flush now. Consumes the cadence token.
    pub fn ready(&mut self, now: Instant) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        if self.cadence.period <= Duration::from_secs(1) {
            return true;
        }
        self.bucket.try_take(&self.cadence, now)
    }

    /// Empty the queue into one shared buffer.
    pub fn take(&mut self) -> Batch {
        let mut shared = BytesMut::with_capacity(self.length);
        let entries: Vec<_> = self.entries.drain(..).collect();
        for (_, msg) in &entries {
            shared.extend_from_slice(msg);
        }
        self.length = 0;
        Batch {
            shared: shared.freeze(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_length_tracks_queue() {
        let mut element = CacheElement::new(Duration::from_secs(1), Instant::now());
        element.push(Some(ConnId(1)), msg("<a> hi|"));
        element.push(None, msg("<b> yo|"));
        assert_eq!(element.length(), 14);
        assert_eq!(element.purge(ConnId(1)), 1);
        assert_eq!(element.length(), 7);
        assert_eq!(element.len(), 1);
    }

    #[test]
    fn test_take_preserves_order_and_exceptions() {
        let mut element = CacheElement::new(Duration::from_secs(1), Instant::now());
        element.push(Some(ConnId(1)), msg("1|"));
        element.push(Some(ConnId(2)), msg("2|"));
        element.push(Some(ConnId(1)), msg("3|"));
        let batch = element.take();
        assert_eq!(batch.shared, "1|2|3|");
        assert_eq!(batch.without(ConnId(1)), "2|");
        assert_eq!(batch.without(ConnId(9)), "1|2|3|");
        assert!(element.is_empty());
        assert_eq!(element.length(), 0);
    }

    #[test]
    fn test_slow_cadence() {
        let start = Instant::now();
        let mut element = CacheElement::new(Duration::from_secs(5), start);
        assert!(!element.ready(start));
        element.push(None, msg("x|"));
        assert!(element.ready(start));
        element.take();
        element.push(None, msg("y|"));
        assert!(!element.ready(start + Duration::from_secs(2)));
        assert!(element.ready(start + Duration::from_secs(5)));
    }
}
