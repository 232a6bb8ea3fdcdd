//! Per-user rate limiting.
//!
//! Every online user carries one [`LeakyBucket`] per rate-limited action.
//! The bucket shapes come from `[rates]` in the config and are shared by
//! all users; only token counts live in the table.

use std::fmt;
use std::time::Instant;

use tracing::debug;

use super::leaky_bucket::LeakyBucket;
use crate::config::RatesConfig;

/// Rate-limited action classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateAction {
    Search,
    Chat,
    MyInfo,
    MyInfoOp,
    GetNickList,
    GetInfo,
    Downloads,
    SearchResultsIn,
    SearchResultsOut,
    Warnings,
    Violations,
}

impl RateAction {
    pub const COUNT: usize = 11;

    pub const ALL: [RateAction; RateAction::COUNT] = [
        RateAction::Search,
        RateAction::Chat,
        RateAction::MyInfo,
        RateAction::MyInfoOp,
        RateAction::GetNickList,
        RateAction::GetInfo,
        RateAction::Downloads,
        RateAction::SearchResultsIn,
        RateAction::SearchResultsOut,
        RateAction::Warnings,
        RateAction::Violations,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            RateAction::Search => "search",
            RateAction::Chat => "chat",
            RateAction::MyInfo => "myinfo",
            RateAction::MyInfoOp => "myinfo_op",
            RateAction::GetNickList => "get_nicklist",
            RateAction::GetInfo => "get_info",
            RateAction::Downloads => "downloads",
            RateAction::SearchResultsIn => "search_results_in",
            RateAction::SearchResultsOut => "search_results_out",
            RateAction::Warnings => "warnings",
            RateAction::Violations => "violations",
        }
    }
}

impl fmt::Display for RateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One bucket per [`RateAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitTable {
    buckets: [LeakyBucket; RateAction::COUNT],
}

impl RateLimitTable {
    /// A table with every bucket holding its full burst.
    pub fn new(rates: &RatesConfig, now: Instant) -> Self {
        Self {
            buckets: RateAction::ALL.map(|action| LeakyBucket::full(rates.bucket(action), now)),
        }
    }

    /// Take a token for `action`; `false` means the action must be refused.
    pub fn try_take(&mut self, action: RateAction, rates: &RatesConfig, now: Instant) -> bool {
        let allowed = self.buckets[action.index()].try_take(rates.bucket(action), now);
        if !allowed {
            debug!(action = %action, "rate limit exceeded");
        }
        allowed
    }

    pub fn bucket(&self, action: RateAction) -> &LeakyBucket {
        &self.buckets[action.index()]
    }
}
