//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use super::defaults::*;
use super::limits::LimitsConfig;
use super::rates::RatesConfig;
use super::security::SecurityConfig;
use crate::state::Rights;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Hub configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Hub identity and listener.
    #[serde(default)]
    pub hub: HubConfig,
    /// Handshake and login policy.
    #[serde(default)]
    pub login: LoginConfig,
    /// Buffer limits and field length ceilings.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Leaky bucket shapes.
    #[serde(default)]
    pub rates: RatesConfig,
    /// Ban durations and search deduplication.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Broadcast cache cadences.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Persistence files.
    #[serde(default)]
    pub files: FilesConfig,
    /// Process-level settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Hub identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Hub name sent in `$HubName`.
    #[serde(default = "default_hub_name")]
    pub name: String,
    #[serde(default = "default_hub_description")]
    pub description: String,
    /// Owner contact shown in `$HubINFO`.
    #[serde(default)]
    pub owner: String,
    /// Listen socket.
    #[serde(default = "default_listen_address")]
    pub address: SocketAddr,
    /// `host:port` advertised in `$HubINFO`.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_max_users")]
    pub max_users: u32,
    /// Redirect target for soft-banned users and a full hub. Empty disables.
    #[serde(default)]
    pub redirect: String,
    /// Main-chat greeting sent after login. Empty disables.
    #[serde(default = "default_motd")]
    pub motd: String,
    /// Nick of the hub security bot.
    #[serde(default = "default_hubsec_nick")]
    pub hubsec_nick: String,
    #[serde(default = "default_hubsec_description")]
    pub hubsec_description: String,
    /// Rights of users without an account.
    #[serde(default = "default_rights")]
    pub default_rights: Rights,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: default_hub_name(),
            description: default_hub_description(),
            owner: String::new(),
            address: default_listen_address(),
            hostname: default_hostname(),
            max_users: default_max_users(),
            redirect: String::new(),
            motd: default_motd(),
            hubsec_nick: default_hubsec_nick(),
            hubsec_description: default_hubsec_description(),
            default_rights: default_rights(),
        }
    }
}

/// Handshake and login policy.
///
/// Durations are in seconds; a zero `delayed_logout` or `reconnect_bantime`
/// disables the feature.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    /// Random characters appended to `EXTENDEDPROTOCOL` in the lock.
    #[serde(default = "default_lock_length")]
    pub lock_length: usize,
    /// Time allowed for each handshake step.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,
    /// Grace period a departed user stays in the nicklist.
    #[serde(default = "default_delayed_logout")]
    pub delayed_logout: u64,
    /// Time a departed user must wait before logging in again.
    #[serde(default)]
    pub reconnect_bantime: u64,
    #[serde(default = "default_nick_min_length")]
    pub nick_min_length: usize,
    #[serde(default = "default_nick_max_length")]
    pub nick_max_length: usize,
    /// Allowed nick characters. Empty allows anything printable except
    /// space and the protocol characters `$|<>`.
    #[serde(default)]
    pub nick_chars: String,
    /// Wrong passwords before the nick is banned.
    #[serde(default = "default_password_retries")]
    pub password_retries: u32,
    #[serde(default = "default_password_bantime")]
    pub password_bantime: u64,
    /// Hard ban applied to `$MyNick` before the handshake; zero is permanent.
    #[serde(default = "default_ctm_exploit_bantime")]
    pub ctm_exploit_bantime: u64,
    /// Refuse MyINFO without a parsable tag unless the user holds `tag`.
    #[serde(default)]
    pub require_tag: bool,
    /// Minimum share in bytes.
    #[serde(default)]
    pub share_min: u64,
    #[serde(default)]
    pub slots_min: u32,
    /// Maximum total hubs in the tag; zero is unlimited.
    #[serde(default)]
    pub hubs_max: u32,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            lock_length: default_lock_length(),
            handshake_timeout: default_handshake_timeout(),
            delayed_logout: default_delayed_logout(),
            reconnect_bantime: 0,
            nick_min_length: default_nick_min_length(),
            nick_max_length: default_nick_max_length(),
            nick_chars: String::new(),
            password_retries: default_password_retries(),
            password_bantime: default_password_bantime(),
            ctm_exploit_bantime: default_ctm_exploit_bantime(),
            require_tag: false,
            share_min: 0,
            slots_min: 0,
            hubs_max: 0,
        }
    }
}

/// Broadcast cache cadences, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Full nicklist rebuild period.
    #[serde(default = "default_rebuild_period")]
    pub rebuild_period: u64,
    /// Incremental nicklist updates may grow to `1/spare_divisor` of the
    /// full lists before forcing a rebuild.
    #[serde(default = "default_spare_divisor")]
    pub spare_divisor: usize,
    /// Flush cadence of repeated searches.
    #[serde(default = "default_research_period")]
    pub research_period: u64,
    /// Flush cadence of MyINFO updates to non-operators.
    #[serde(default = "default_myinfo_period")]
    pub myinfo_period: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            rebuild_period: default_rebuild_period(),
            spare_divisor: default_spare_divisor(),
            research_period: default_research_period(),
            myinfo_period: default_myinfo_period(),
        }
    }
}

/// Persistence files.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_banlist_path")]
    pub banlist: String,
    #[serde(default = "default_hardbanlist_path")]
    pub hardbanlist: String,
    #[serde(default = "default_accounts_path")]
    pub accounts: String,
    /// Seconds between autosaves; zero disables.
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            banlist: default_banlist_path(),
            hardbanlist: default_hardbanlist_path(),
            accounts: default_accounts_path(),
            autosave_interval: default_autosave_interval(),
        }
    }
}

/// Process-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Prometheus metrics HTTP port; zero disables the endpoint.
    #[serde(default)]
    pub metrics_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.hub.name, "nmdc-hubd");
        assert_eq!(config.hub.address.port(), 411);
        assert_eq!(config.login.lock_length, 16);
        assert_eq!(config.server.metrics_port, 0);
        assert!(config.hub.default_rights.contains(Rights::CHAT));
    }

    #[test]
    fn test_sections_override() {
        let config: Config = toml::from_str(
            r#"
            [hub]
            name = "Test Hub"
            address = "127.0.0.1:4111"
            default_rights = "chat"

            [login]
            delayed_logout = 0
            nick_chars = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.hub.name, "Test Hub");
        assert_eq!(config.hub.address.port(), 4111);
        assert_eq!(config.hub.default_rights, Rights::CHAT);
        assert_eq!(config.login.delayed_logout, 0);
        assert_eq!(config.login.nick_chars, "abc");
        assert_eq!(config.login.password_retries, 3);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/hub.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_bad_rights_rejected() {
        let result: Result<Config, _> = toml::from_str("[hub]\ndefault_rights = \"fly\"");
        assert!(result.is_err());
    }
}
