//! Security primitives: admission control, bans and credentials.
//!
//! - [`leaky_bucket`]: the token bucket every rate limit is built from
//! - [`rate_limit`]: per-user bucket table, one bucket per action
//! - [`ban_list`]: netmask-aware ban table with lazy expiry
//! - [`tth_ring`]: duplicate TTH search suppression
//! - [`password`]: Argon2 account passwords
//! - [`connection_throttle`]: per-IP accept throttle

pub mod ban_list;
pub mod connection_throttle;
pub mod leaky_bucket;
pub mod password;
pub mod rate_limit;
pub mod tth_ring;

pub use ban_list::{BanEntry, BanError, BanId, BanList};
pub use connection_throttle::ConnectionThrottle;
pub use leaky_bucket::{LeakyBucket, LeakyBucketType};
pub use rate_limit::{RateAction, RateLimitTable};
pub use tth_ring::{TthRing, TthVerdict};
