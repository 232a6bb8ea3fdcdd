//! Output buffer limits and field length ceilings.

use nmdc_proto::FieldLimits;
use serde::Deserialize;

use super::defaults::default_true;

/// Output buffer limits and field length ceilings.
///
/// Buffer sizes are in bytes, timeouts in seconds. Writes that would take a
/// connection past `buffer_hard_limit`, or the whole hub past
/// `buffer_total_limit`, are dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Queued output at which a connection enters overflow.
    #[serde(default = "default_buffer_soft_limit")]
    pub buffer_soft_limit: usize,
    #[serde(default = "default_buffer_hard_limit")]
    pub buffer_hard_limit: usize,
    /// Hub-wide queued output ceiling; new connections are refused above it.
    #[serde(default = "default_buffer_total_limit")]
    pub buffer_total_limit: usize,
    #[serde(default = "default_timeout_buffering")]
    pub timeout_buffering: u64,
    #[serde(default = "default_timeout_overflow")]
    pub timeout_overflow: u64,
    /// Disconnect when a buffering/overflow timer expires.
    #[serde(default = "default_true")]
    pub disconnect_on_timeout: bool,
    /// Stop parsing input from connections in overflow.
    #[serde(default = "default_true")]
    pub block_on_overflow: bool,
    /// Longest token accepted before the connection is dropped.
    #[serde(default = "default_max_token_length")]
    pub max_token_length: usize,
    #[serde(default = "default_max_chat_length")]
    pub max_chat_length: usize,
    #[serde(default = "default_max_search_length")]
    pub max_search_length: usize,
    #[serde(default = "default_max_pm_length")]
    pub max_pm_length: usize,
    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,
    #[serde(default = "default_max_tag_length")]
    pub max_tag_length: usize,
    #[serde(default = "default_max_speed_length")]
    pub max_speed_length: usize,
    #[serde(default = "default_max_email_length")]
    pub max_email_length: usize,
    /// Digits allowed in the share field.
    #[serde(default = "default_max_share_length")]
    pub max_share_length: usize,
    /// Grant buffer credit for hub-pushed nicklists.
    #[serde(default = "default_true")]
    pub nicklist_credit: bool,
}

impl LimitsConfig {
    /// MyINFO field ceilings in the form the proto crate wants.
    pub fn field_limits(&self) -> FieldLimits {
        FieldLimits {
            description: self.max_description_length,
            tag: self.max_tag_length,
            speed: self.max_speed_length,
            email: self.max_email_length,
            share: self.max_share_length,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            buffer_soft_limit: default_buffer_soft_limit(),
            buffer_hard_limit: default_buffer_hard_limit(),
            buffer_total_limit: default_buffer_total_limit(),
            timeout_buffering: default_timeout_buffering(),
            timeout_overflow: default_timeout_overflow(),
            disconnect_on_timeout: true,
            block_on_overflow: true,
            max_token_length: default_max_token_length(),
            max_chat_length: default_max_chat_length(),
            max_search_length: default_max_search_length(),
            max_pm_length: default_max_pm_length(),
            max_description_length: default_max_description_length(),
            max_tag_length: default_max_tag_length(),
            max_speed_length: default_max_speed_length(),
            max_email_length: default_max_email_length(),
            max_share_length: default_max_share_length(),
            nicklist_credit: true,
        }
    }
}

fn default_buffer_soft_limit() -> usize {
    256 * 1024
}

fn default_buffer_hard_limit() -> usize {
    1024 * 1024
}

fn default_buffer_total_limit() -> usize {
    256 * 1024 * 1024
}

fn default_timeout_buffering() -> u64 {
    60
}

fn default_timeout_overflow() -> u64 {
    10
}

fn default_max_token_length() -> usize {
    64 * 1024
}

fn default_max_chat_length() -> usize {
    1024
}

fn default_max_search_length() -> usize {
    256
}

fn default_max_pm_length() -> usize {
    2048
}

fn default_max_description_length() -> usize {
    128
}

fn default_max_tag_length() -> usize {
    128
}

fn default_max_speed_length() -> usize {
    32
}

fn default_max_email_length() -> usize {
    64
}

fn default_max_share_length() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_consistent() {
        let config = LimitsConfig::default();
        assert!(config.buffer_soft_limit < config.buffer_hard_limit);
        assert!(config.buffer_hard_limit < config.buffer_total_limit);
        assert!(config.block_on_overflow);
    }

    #[test]
    fn field_limits_follow_config() {
        let config: LimitsConfig =
            toml::from_str("max_description_length = 10\nmax_share_length = 5").unwrap();
        let limits = config.field_limits();
        assert_eq!(limits.description, 10);
        assert_eq!(limits.share, 5);
        assert_eq!(limits.tag, 128);
    }
}
