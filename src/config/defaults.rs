//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use std::net::SocketAddr;

use crate::state::Rights;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Hub Identity Defaults
// =============================================================================

pub fn default_hub_name() -> String {
    "nmdc-hubd".to_string()
}

pub fn default_hub_description() -> String {
    "A Direct Connect hub".to_string()
}

pub fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 411))
}

pub fn default_hostname() -> String {
    "localhost:411".to_string()
}

pub fn default_max_users() -> u32 {
    1000
}

pub fn default_motd() -> String {
    "Welcome to the hub.".to_string()
}

pub fn default_hubsec_nick() -> String {
    "HubSec".to_string()
}

pub fn default_hubsec_description() -> String {
    "Hub security".to_string()
}

pub fn default_rights() -> Rights {
    Rights::CHAT | Rights::PM | Rights::SEARCH | Rights::DL
}

// =============================================================================
// Login Defaults
// =============================================================================

pub fn default_lock_length() -> usize {
    16
}

pub fn default_handshake_timeout() -> u64 {
    30
}

pub fn default_delayed_logout() -> u64 {
    30
}

pub fn default_nick_min_length() -> usize {
    2
}

pub fn default_nick_max_length() -> usize {
    32
}

pub fn default_password_retries() -> u32 {
    3
}

pub fn default_password_bantime() -> u64 {
    300
}

pub fn default_ctm_exploit_bantime() -> u64 {
    86_400
}

// =============================================================================
// Cache Defaults
// =============================================================================

pub fn default_rebuild_period() -> u64 {
    300
}

pub fn default_spare_divisor() -> usize {
    8
}

pub fn default_research_period() -> u64 {
    5
}

pub fn default_myinfo_period() -> u64 {
    2
}

// =============================================================================
// Persistence Defaults
// =============================================================================

pub fn default_banlist_path() -> String {
    "banlist.json".to_string()
}

pub fn default_hardbanlist_path() -> String {
    "hardbanlist.json".to_string()
}

pub fn default_accounts_path() -> String {
    "accounts.json".to_string()
}

pub fn default_autosave_interval() -> u64 {
    300
}
