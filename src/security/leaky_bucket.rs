//! Token-bucket admission control.
//!
//! A [`LeakyBucket`] holds only its token count and the time of the last
//! refill; the shape of the bucket ([`LeakyBucketType`]) is shared by every
//! bucket of the same kind. Refill is lazy: it happens only when a take
//! finds the bucket empty, in whole periods.

use std::time::{Duration, Instant};

use serde::Deserialize;

/// Shape of a family of buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LeakyBucketType {
    /// Refill period.
    #[serde(with = "seconds")]
    pub period: Duration,
    /// Maximum number of stored tokens.
    pub burst: u64,
    /// Tokens added per elapsed period.
    pub refill: u64,
}

impl LeakyBucketType {
    pub const fn new(period: Duration, burst: u64, refill: u64) -> Self {
        Self {
            period,
            burst,
            refill,
        }
    }

    pub const fn per_secs(secs: u64, burst: u64, refill: u64) -> Self {
        Self::new(Duration::from_secs(secs), burst, refill)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakyBucket {
    tokens: u64,
    last_refill: Instant,
}

impl LeakyBucket {
    /// An empty bucket whose refill clock starts at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            tokens: 0,
            last_refill: now,
        }
    }

    /// A bucket holding a full burst.
    pub fn full(ty: &LeakyBucketType, now: Instant) -> Self {
        Self {
            tokens: ty.burst,
            last_refill: now,
        }
    }

    /// Reset to empty with the refill clock at `now`.
    pub fn init(&mut self, now: Instant) {
        *self = Self::new(now);
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Credit every whole period elapsed since the last refill.
    pub fn refill(&mut self, ty: &LeakyBucketType, now: Instant) {
        if ty.period.is_zero() {
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        let periods = elapsed.as_nanos() / ty.period.as_nanos();
        if periods == 0 {
            return;
        }
        let periods = u64::try_from(periods).unwrap_or(u64::MAX);
        let added = periods.saturating_mul(ty.refill);
        self.tokens = self.tokens.saturating_add(added).min(ty.burst);
        self.last_refill = match u32::try_from(periods)
            .ok()
            .and_then(|p| ty.period.checked_mul(p))
        {
            Some(step) => self.last_refill + step,
            None => now,
        };
    }

    /// Take one token, refilling once if the bucket is empty.
    ///
    /// A zero period never refills, so such a bucket admits at most its
    /// initial contents.
    pub fn try_take(&mut self, ty: &LeakyBucketType, now: Instant) -> bool {
        if self.tokens > 0 {
            self.tokens -= 1;
            return true;
        }
        if ty.period.is_zero() {
            return false;
        }
        self.refill(ty, now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// `Duration` as whole seconds in config files.
pub(crate) mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
