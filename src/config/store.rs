//! Named, typed runtime view of the configuration.
//!
//! [`ConfigStore`] maps dotted keys (`hub.name`, `rates.chat.burst`) to
//! accessors on [`Config`]. Values travel as strings and are checked against
//! the key's [`ValueKind`]; a `set` is applied to a copy and only committed
//! when the whole config still validates.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use super::Config;
use super::validation::validate;
use crate::state::Rights;

/// Value types understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Int,
    Float,
    Bool,
    Ip,
    Rights,
    Bytes,
    Duration,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Str => "string",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Ip => "address",
            ValueKind::Rights => "rights",
            ValueKind::Bytes => "bytes",
            ValueKind::Duration => "duration",
        })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("{key} expects a {kind} value, got '{value}'")]
    InvalidValue {
        key: String,
        kind: ValueKind,
        value: String,
    },
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Parse `30s`, `5m`, `1h30m`, `2d`, `1w` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            'w' => 604_800,
            _ => return None,
        };
        let n: u64 = digits.parse().ok()?;
        digits.clear();
        total = total.checked_add(n.checked_mul(unit)?)?;
    }
    if !digits.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}

pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, size) in [("w", 604_800), ("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        if secs >= size {
            out.push_str(&format!("{}{unit}", secs / size));
            secs %= size;
        }
    }
    out
}

/// Parse `65536`, `64k`, `1M`, `2G` (binary multiples).
pub fn parse_bytes(input: &str) -> Option<u64> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number, suffix) = input.split_at(split);
    let number: u64 = number.parse().ok()?;
    let multiplier: u64 = match suffix.to_ascii_lowercase().trim_end_matches('b') {
        "" => 1,
        "k" | "ki" => 1 << 10,
        "m" | "mi" => 1 << 20,
        "g" | "gi" => 1 << 30,
        _ => return None,
    };
    number.checked_mul(multiplier)
}

pub fn format_bytes(bytes: u64) -> String {
    for (suffix, shift) in [("G", 30), ("M", 20), ("k", 10)] {
        if bytes >= 1 << shift && bytes % (1 << shift) == 0 {
            return format!("{}{suffix}", bytes >> shift);
        }
    }
    bytes.to_string()
}

/// Conversion between a config field and its string form.
trait Setting: Sized {
    fn render(&self, kind: ValueKind) -> String;
    fn parse(value: &str, kind: ValueKind) -> Option<Self>;
}

impl Setting for String {
    fn render(&self, _: ValueKind) -> String {
        self.clone()
    }

    fn parse(value: &str, _: ValueKind) -> Option<Self> {
        Some(value.to_string())
    }
}

impl Setting for bool {
    fn render(&self, _: ValueKind) -> String {
        self.to_string()
    }

    fn parse(value: &str, _: ValueKind) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

impl Setting for f64 {
    fn render(&self, _: ValueKind) -> String {
        self.to_string()
    }

    fn parse(value: &str, _: ValueKind) -> Option<Self> {
        value.parse().ok().filter(|v: &f64| v.is_finite())
    }
}

impl Setting for SocketAddr {
    fn render(&self, _: ValueKind) -> String {
        self.to_string()
    }

    fn parse(value: &str, _: ValueKind) -> Option<Self> {
        value.parse().ok()
    }
}

impl Setting for Rights {
    fn render(&self, _: ValueKind) -> String {
        self.to_string()
    }

    fn parse(value: &str, _: ValueKind) -> Option<Self> {
        Rights::parse(value).ok()
    }
}

impl Setting for Duration {
    fn render(&self, _: ValueKind) -> String {
        format_duration(*self)
    }

    fn parse(value: &str, _: ValueKind) -> Option<Self> {
        parse_duration(value)
    }
}

macro_rules! integer_setting {
    ($($ty:ty),*) => {$(
        impl Setting for $ty {
            fn render(&self, kind: ValueKind) -> String {
                let value = *self as u64;
                match kind {
                    ValueKind::Bytes => format_bytes(value),
                    ValueKind::Duration => format_duration(Duration::from_secs(value)),
                    _ => value.to_string(),
                }
            }

            fn parse(value: &str, kind: ValueKind) -> Option<Self> {
                let parsed = match kind {
                    ValueKind::Bytes => parse_bytes(value)?,
                    ValueKind::Duration => parse_duration(value)?.as_secs(),
                    _ => value.trim().parse::<u64>().ok()?,
                };
                <$ty>::try_from(parsed).ok()
            }
        }
    )*};
}

integer_setting!(u16, u32, u64, usize);

struct Entry {
    key: &'static str,
    kind: ValueKind,
    get: fn(&Config) -> String,
    set: fn(&mut Config, &str) -> Option<()>,
}

macro_rules! entries {
    ($($key:literal : $kind:ident => $($field:ident).+;)*) => {
        vec![$(
            Entry {
                key: $key,
                kind: ValueKind::$kind,
                get: |c: &Config| Setting::render(&c.$($field).+, ValueKind::$kind),
                set: |c: &mut Config, v: &str| {
                    c.$($field).+ = Setting::parse(v, ValueKind::$kind)?;
                    Some(())
                },
            },
        )*]
    };
}

/// The config registry.
pub struct ConfigStore {
    entries: Vec<Entry>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        let entries = entries! {
            "hub.name": Str => hub.name;
            "hub.description": Str => hub.description;
            "hub.owner": Str => hub.owner;
            "hub.address": Ip => hub.address;
            "hub.hostname": Str => hub.hostname;
            "hub.max_users": Int => hub.max_users;
            "hub.redirect": Str => hub.redirect;
            "hub.motd": Str => hub.motd;
            "hub.hubsec_nick": Str => hub.hubsec_nick;
            "hub.hubsec_description": Str => hub.hubsec_description;
            "hub.default_rights": Rights => hub.default_rights;

            "login.lock_length": Int => login.lock_length;
            "login.handshake_timeout": Duration => login.handshake_timeout;
            "login.delayed_logout": Duration => login.delayed_logout;
            "login.reconnect_bantime": Duration => login.reconnect_bantime;
            "login.nick_min_length": Int => login.nick_min_length;
            "login.nick_max_length": Int => login.nick_max_length;
            "login.nick_chars": Str => login.nick_chars;
            "login.password_retries": Int => login.password_retries;
            "login.password_bantime": Duration => login.password_bantime;
            "login.ctm_exploit_bantime": Duration => login.ctm_exploit_bantime;
            "login.require_tag": Bool => login.require_tag;
            "login.share_min": Bytes => login.share_min;
            "login.slots_min": Int => login.slots_min;
            "login.hubs_max": Int => login.hubs_max;

            "limits.buffer_soft_limit": Bytes => limits.buffer_soft_limit;
            "limits.buffer_hard_limit": Bytes => limits.buffer_hard_limit;
            "limits.buffer_total_limit": Bytes => limits.buffer_total_limit;
            "limits.timeout_buffering": Duration => limits.timeout_buffering;
            "limits.timeout_overflow": Duration => limits.timeout_overflow;
            "limits.disconnect_on_timeout": Bool => limits.disconnect_on_timeout;
            "limits.block_on_overflow": Bool => limits.block_on_overflow;
            "limits.max_token_length": Bytes => limits.max_token_length;
            "limits.max_chat_length": Int => limits.max_chat_length;
            "limits.max_search_length": Int => limits.max_search_length;
            "limits.max_pm_length": Int => limits.max_pm_length;
            "limits.max_description_length": Int => limits.max_description_length;
            "limits.max_tag_length": Int => limits.max_tag_length;
            "limits.max_speed_length": Int => limits.max_speed_length;
            "limits.max_email_length": Int => limits.max_email_length;
            "limits.max_share_length": Int => limits.max_share_length;
            "limits.nicklist_credit": Bool => limits.nicklist_credit;

            "rates.search.period": Duration => rates.search.period;
            "rates.search.burst": Int => rates.search.burst;
            "rates.search.refill": Int => rates.search.refill;
            "rates.chat.period": Duration => rates.chat.period;
            "rates.chat.burst": Int => rates.chat.burst;
            "rates.chat.refill": Int => rates.chat.refill;
            "rates.myinfo.period": Duration => rates.myinfo.period;
            "rates.myinfo.burst": Int => rates.myinfo.burst;
            "rates.myinfo.refill": Int => rates.myinfo.refill;
            "rates.myinfo_op.period": Duration => rates.myinfo_op.period;
            "rates.myinfo_op.burst": Int => rates.myinfo_op.burst;
            "rates.myinfo_op.refill": Int => rates.myinfo_op.refill;
            "rates.get_nicklist.period": Duration => rates.get_nicklist.period;
            "rates.get_nicklist.burst": Int => rates.get_nicklist.burst;
            "rates.get_nicklist.refill": Int => rates.get_nicklist.refill;
            "rates.get_info.period": Duration => rates.get_info.period;
            "rates.get_info.burst": Int => rates.get_info.burst;
            "rates.get_info.refill": Int => rates.get_info.refill;
            "rates.downloads.period": Duration => rates.downloads.period;
            "rates.downloads.burst": Int => rates.downloads.burst;
            "rates.downloads.refill": Int => rates.downloads.refill;
            "rates.search_results_in.period": Duration => rates.search_results_in.period;
            "rates.search_results_in.burst": Int => rates.search_results_in.burst;
            "rates.search_results_in.refill": Int => rates.search_results_in.refill;
            "rates.search_results_out.period": Duration => rates.search_results_out.period;
            "rates.search_results_out.burst": Int => rates.search_results_out.burst;
            "rates.search_results_out.refill": Int => rates.search_results_out.refill;
            "rates.warnings.period": Duration => rates.warnings.period;
            "rates.warnings.burst": Int => rates.warnings.burst;
            "rates.warnings.refill": Int => rates.warnings.refill;
            "rates.violations.period": Duration => rates.violations.period;
            "rates.violations.burst": Int => rates.violations.burst;
            "rates.violations.refill": Int => rates.violations.refill;
            "rates.connects.period": Duration => rates.connects.period;
            "rates.connects.burst": Int => rates.connects.burst;
            "rates.connects.refill": Int => rates.connects.refill;

            "security.violation_bantime": Duration => security.violation_bantime;
            "security.kick_bantime": Duration => security.kick_bantime;
            "security.search_repeat_min": Duration => security.search_repeat_min;
            "security.research_interval": Duration => security.research_interval;
            "security.tth_ring_size": Int => security.tth_ring_size;
            "security.connection_burst_per_ip": Int => security.connection_burst_per_ip;

            "cache.rebuild_period": Duration => cache.rebuild_period;
            "cache.spare_divisor": Int => cache.spare_divisor;
            "cache.research_period": Duration => cache.research_period;
            "cache.myinfo_period": Duration => cache.myinfo_period;

            "files.banlist": Str => files.banlist;
            "files.hardbanlist": Str => files.hardbanlist;
            "files.accounts": Str => files.accounts;
            "files.autosave_interval": Duration => files.autosave_interval;

            "server.metrics_port": Int => server.metrics_port;
        };
        Self { entries }
    }

    fn entry(&self, key: &str) -> Result<&Entry, StoreError> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .ok_or_else(|| StoreError::UnknownKey(key.to_string()))
    }

    pub fn kind(&self, key: &str) -> Option<ValueKind> {
        self.entry(key).ok().map(|entry| entry.kind)
    }

    pub fn get(&self, config: &Config, key: &str) -> Result<String, StoreError> {
        Ok((self.entry(key)?.get)(config))
    }

    /// Set `key` from its string form. The change is committed only if the
    /// resulting config validates.
    pub fn set(&self, config: &mut Config, key: &str, value: &str) -> Result<(), StoreError> {
        let entry = self.entry(key)?;
        let mut candidate = config.clone();
        (entry.set)(&mut candidate, value).ok_or_else(|| StoreError::InvalidValue {
            key: key.to_string(),
            kind: entry.kind,
            value: value.to_string(),
        })?;
        validate(&candidate).map_err(|errors| {
            StoreError::Rejected(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;
        *config = candidate;
        Ok(())
    }

    /// Every key with its kind and current value, in registry order.
    /// A non-empty `prefix` filters by key prefix.
    pub fn list(&self, config: &Config, prefix: &str) -> Vec<(&'static str, ValueKind, String)> {
        self.entries
            .iter()
            .filter(|entry| entry.key.starts_with(prefix))
            .map(|entry| (entry.key, entry.kind, (entry.get)(config)))
            .collect()
    }
}
