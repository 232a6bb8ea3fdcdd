//! Security configuration: automatic ban durations and search deduplication.

use serde::Deserialize;

/// Security configuration. Times are in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Ban applied when the violations bucket runs dry; zero is permanent.
    #[serde(default = "default_violation_bantime")]
    pub violation_bantime: u64,
    /// Ban applied by `$Kick` and `!kick`.
    #[serde(default = "default_kick_bantime")]
    pub kick_bantime: u64,
    /// Identical TTH searches inside this window are dropped.
    #[serde(default = "default_search_repeat_min")]
    pub search_repeat_min: u64,
    /// Identical TTH searches inside this window go to the research class.
    #[serde(default = "default_research_interval")]
    pub research_interval: u64,
    /// TTH fingerprints remembered per user.
    #[serde(default = "default_tth_ring_size")]
    pub tth_ring_size: usize,
    /// Connections one IP may open in a burst.
    #[serde(default = "default_connection_burst_per_ip")]
    pub connection_burst_per_ip: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            violation_bantime: default_violation_bantime(),
            kick_bantime: default_kick_bantime(),
            search_repeat_min: default_search_repeat_min(),
            research_interval: default_research_interval(),
            tth_ring_size: default_tth_ring_size(),
            connection_burst_per_ip: default_connection_burst_per_ip(),
        }
    }
}

fn default_violation_bantime() -> u64 {
    600
}

fn default_kick_bantime() -> u64 {
    300
}

fn default_search_repeat_min() -> u64 {
    10
}

fn default_research_interval() -> u64 {
    120
}

fn default_tth_ring_size() -> usize {
    16
}

fn default_connection_burst_per_ip() -> u32 {
    5
}
