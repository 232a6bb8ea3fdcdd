//! Hub statistics.
//!
//! Plain counters owned by the hub actor. Every recording method also feeds
//! the matching Prometheus metric.

use std::fmt::Write as _;

use crate::metrics;
use crate::security::RateAction;

/// Why a connection was refused at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    HardBan,
    BufferBudget,
    HubThrottle,
    IpThrottle,
}

impl Refusal {
    pub fn name(self) -> &'static str {
        match self {
            Refusal::HardBan => "hardban",
            Refusal::BufferBudget => "buffer_budget",
            Refusal::HubThrottle => "hub_throttle",
            Refusal::IpThrottle => "ip_throttle",
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct HubStats {
    pub accepted: u64,
    pub refused: u64,
    pub logins: u64,
    pub peak_users: usize,
    pub broken_keys: u64,
    pub ctm_exploits: u64,
    pub nick_spoofs: u64,
    pub rate_denials: [u64; RateAction::COUNT],
    pub violation_bans: u64,
    pub bytes_flushed: u64,
    pub cache_flushes: u64,
    pub buffer_drops: u64,
    pub buffering_timeouts: u64,
    pub overflow_timeouts: u64,
}

impl HubStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted(&mut self) {
        self.accepted += 1;
        metrics::record_connection("accepted");
    }

    pub fn refused(&mut self, reason: Refusal) {
        self.refused += 1;
        metrics::record_connection(reason.name());
    }

    pub fn login(&mut self, online: usize) {
        self.logins += 1;
        self.peak_users = self.peak_users.max(online);
        metrics::record_login();
        metrics::set_online_users(online);
    }

    pub fn rate_denied(&mut self, action: RateAction) {
        self.rate_denials[action.index()] += 1;
        metrics::record_rate_limited(action.name());
    }

    pub fn buffer_drop(&mut self) {
        self.buffer_drops += 1;
        metrics::record_buffer_drop();
    }

    pub fn flushed(&mut self, bytes: u64, recipients: usize) {
        self.cache_flushes += 1;
        self.bytes_flushed += bytes;
        metrics::record_flush(bytes, recipients);
    }

    /// Multi-line dump for `!stats`.
    pub fn report(&self, online: usize, departed: usize, buffered: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Users online: {online} (peak {}), in grace: {departed}", self.peak_users);
        let _ = writeln!(out, "Connections: {} accepted, {} refused, {} logins", self.accepted, self.refused, self.logins);
        let _ = writeln!(
            out,
            "Abuse: {} broken keys, {} CTM exploits, {} nick spoofs, {} violation bans",
            self.broken_keys, self.ctm_exploits, self.nick_spoofs, self.violation_bans
        );
        let denials: Vec<String> = RateAction::ALL
            .iter()
            .filter(|action| self.rate_denials[action.index()] > 0)
            .map(|action| format!("{}={}", action.name(), self.rate_denials[action.index()]))
            .collect();
        if !denials.is_empty() {
            let _ = writeln!(out, "Rate denials: {}", denials.join(" "));
        }
        let _ = writeln!(out, "Cache: {} flushes, {} bytes", self.cache_flushes, self.bytes_flushed);
        let _ = write!(
            out,
            "Buffers: {buffered} bytes queued, {} drops, {} buffering / {} overflow timeouts",
            self.buffer_drops, self.buffering_timeouts, self.overflow_timeouts
        );
        out
    }
}
