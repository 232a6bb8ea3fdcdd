//! Recent TTH search fingerprints per user.
//!
//! A fixed-capacity ring of `(fingerprint, last seen)` pairs. A search for a
//! hash already in the ring is either suppressed (seen within the minimum
//! interval) or flagged as a research (seen within the research interval);
//! anything older counts as new.

use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TthVerdict {
    /// First search for this hash in the research window.
    New,
    /// Repeated within the research window; route at lower priority.
    Research,
    /// Repeated within the minimum interval; drop.
    Suppress,
}

#[derive(Debug, Clone)]
pub struct TthRing {
    slots: VecDeque<(u64, Instant)>,
    capacity: usize,
}

fn fingerprint(tth: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    tth.hash(&mut hasher);
    hasher.finish()
}

impl TthRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Classify a search for `tth` at `now` and remember it.
    pub fn check_and_record(
        &mut self,
        tth: &[u8],
        now: Instant,
        min_interval: Duration,
        research_interval: Duration,
    ) -> TthVerdict {
        if self.capacity == 0 {
            return TthVerdict::New;
        }
        let print = fingerprint(tth);
        if let Some(slot) = self.slots.iter_mut().find(|(p, _)| *p == print) {
            let age = now.saturating_duration_since(slot.1);
            if age < min_interval {
                return TthVerdict::Suppress;
            }
            slot.1 = now;
            return if age < research_interval {
                TthVerdict::Research
            } else {
                TthVerdict::New
            };
        }
        if self.slots.len() == self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back((print, now));
        TthVerdict::New
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(10);
    const RESEARCH: Duration = Duration::from_secs(120);

    #[test]
    fn test_repeat_windows() {
        let now = Instant::now();
        let mut ring = TthRing::new(4);
        let hash = b"LWPNACQDBZRYXW3VHJVCJ64QBZNGHOHHHZWCLNQ";
        assert_eq!(ring.check_and_record(hash, now, MIN, RESEARCH), TthVerdict::New);
        assert_eq!(
            ring.check_and_record(hash, now + Duration::from_secs(5), MIN, RESEARCH),
            TthVerdict::Suppress
        );
        assert_eq!(
            ring.check_and_record(hash, now + Duration::from_secs(30), MIN, RESEARCH),
            TthVerdict::Research
        );
        // The research refreshed the timestamp.
        assert_eq!(
            ring.check_and_record(hash, now + Duration::from_secs(35), MIN, RESEARCH),
            TthVerdict::Suppress
        );
        assert_eq!(
            ring.check_and_record(hash, now + Duration::from_secs(400), MIN, RESEARCH),
            TthVerdict::New
        );
    }

    #[test]
    fn test_oldest_is_overwritten() {
        let now = Instant::now();
        let mut ring = TthRing::new(2);
        ring.check_and_record(b"A", now, MIN, RESEARCH);
        ring.check_and_record(b"B", now, MIN, RESEARCH);
        ring.check_and_record(b"C", now, MIN, RESEARCH);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.check_and_record(b"A", now, MIN, RESEARCH), TthVerdict::New);
        assert_eq!(ring.check_and_record(b"C", now, MIN, RESEARCH), TthVerdict::Suppress);
    }

    #[test]
    fn test_zero_capacity_remembers_nothing() {
        let now = Instant::now();
        let mut ring = TthRing::new(0);
        assert_eq!(ring.check_and_record(b"A", now, MIN, RESEARCH), TthVerdict::New);
        assert_eq!(ring.check_and_record(b"A", now, MIN, RESEARCH), TthVerdict::New);
        assert!(ring.is_empty());
    }
}
