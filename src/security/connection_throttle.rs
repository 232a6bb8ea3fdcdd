//! Per-IP connection throttle.
//!
//! Sits next to the hub-wide `connects` bucket at accept time: one governor
//! limiter per source address allowing a burst of connections and then one
//! new connection per second.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use tracing::debug;

const MAX_ENTRIES: usize = 10_000;

pub struct ConnectionThrottle {
    limiters: HashMap<Ipv4Addr, DefaultDirectRateLimiter>,
    quota: Quota,
}

impl ConnectionThrottle {
    /// `burst` connections at once per IP; zero is treated as one.
    pub fn new(burst: u32) -> Self {
        let burst = NonZeroU32::new(burst).unwrap_or(nonzero!(1u32));
        Self {
            limiters: HashMap::new(),
            quota: Quota::per_second(nonzero!(1u32)).allow_burst(burst),
        }
    }

    /// Check whether `ip` may open another connection now.
    pub fn check(&mut self, ip: Ipv4Addr) -> bool {
        let quota = self.quota;
        let limiter = self
            .limiters
            .entry(ip)
            .or_insert_with(|| RateLimiter::direct(quota));
        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(ip = %ip, "connection rate limit exceeded");
        }
        allowed
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Forget every limiter once the table grows past its bound.
    pub fn cleanup(&mut self) {
        if self.limiters.len() > MAX_ENTRIES {
            self.limiters.clear();
            debug!("cleared connection limiters (exceeded {} entries)", MAX_ENTRIES);
        }
    }
}
