//! Configuration validation.
//!
//! Validates configuration at startup (and on every runtime `set`) to catch
//! inconsistent settings early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("hub.name is required")]
    MissingHubName,
    #[error("hub.max_users must be at least 1")]
    NoUsersAllowed,
    #[error("hub.hubsec_nick '{0}' is not a valid nick")]
    InvalidHubsecNick(String),
    #[error("login.lock_length must be between 4 and 128, got {0}")]
    InvalidLockLength(usize),
    #[error("login.nick_min_length ({min}) exceeds nick_max_length ({max})")]
    NickLengthRange { min: usize, max: usize },
    #[error("limits.buffer_soft_limit must be below buffer_hard_limit")]
    SoftAboveHard,
    #[error("limits.buffer_hard_limit must not exceed buffer_total_limit")]
    HardAboveTotal,
    #[error("limits.max_token_length must be at least 256")]
    TokenLimitTooSmall,
    #[error("rates.{0}.burst must be at least 1")]
    EmptyBucket(&'static str),
    #[error("security.research_interval must not be shorter than search_repeat_min")]
    ResearchWindow,
    #[error("cache.spare_divisor must be at least 1")]
    SpareDivisor,
    #[error("files.{0} parent directory does not exist: {1}")]
    FileDirMissing(&'static str, String),
}

fn valid_nick(nick: &str) -> bool {
    !nick.is_empty()
        && nick
            .chars()
            .all(|c| !c.is_control() && !matches!(c, ' ' | '$' | '|' | '<' | '>'))
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.hub.name.trim().is_empty() {
        errors.push(ValidationError::MissingHubName);
    }
    if config.hub.max_users == 0 {
        errors.push(ValidationError::NoUsersAllowed);
    }
    if !valid_nick(&config.hub.hubsec_nick) {
        errors.push(ValidationError::InvalidHubsecNick(
            config.hub.hubsec_nick.clone(),
        ));
    }

    let login = &config.login;
    if !(4..=128).contains(&login.lock_length) {
        errors.push(ValidationError::InvalidLockLength(login.lock_length));
    }
    if login.nick_min_length > login.nick_max_length {
        errors.push(ValidationError::NickLengthRange {
            min: login.nick_min_length,
            max: login.nick_max_length,
        });
    }

    let limits = &config.limits;
    if limits.buffer_soft_limit >= limits.buffer_hard_limit {
        errors.push(ValidationError::SoftAboveHard);
    }
    if limits.buffer_hard_limit > limits.buffer_total_limit {
        errors.push(ValidationError::HardAboveTotal);
    }
    if limits.max_token_length < 256 {
        errors.push(ValidationError::TokenLimitTooSmall);
    }

    for (name, bucket) in config.rates.named() {
        if bucket.burst == 0 {
            errors.push(ValidationError::EmptyBucket(name));
        }
    }

    if config.security.research_interval < config.security.search_repeat_min {
        errors.push(ValidationError::ResearchWindow);
    }
    if config.cache.spare_divisor == 0 {
        errors.push(ValidationError::SpareDivisor);
    }

    for (key, path) in [
        ("banlist", &config.files.banlist),
        ("hardbanlist", &config.files.hardbanlist),
        ("accounts", &config.files.accounts),
    ] {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::FileDirMissing(key, path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let toml = r#"
[hub]
name = ""
hubsec_nick = "Hub Sec"

[login]
nick_min_length = 10
nick_max_length = 5

[limits]
buffer_soft_limit = 2048
buffer_hard_limit = 1024

[rates.chat]
period = 1
burst = 0
refill = 1
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingHubName)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidHubsecNick(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::NickLengthRange { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::SoftAboveHard)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::EmptyBucket("chat"))));
    }

    #[test]
    fn test_missing_save_directory_fails() {
        let toml = r#"
[files]
banlist = "/nonexistent/dir/bans.json"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::FileDirMissing("banlist", _))));
    }

    #[test]
    fn test_research_window_order() {
        let toml = r#"
[security]
search_repeat_min = 60
research_interval = 30
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ResearchWindow)));
    }
}
