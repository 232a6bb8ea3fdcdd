//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: the root [`Config`] and the hub/login/cache/files sections
//! - [`limits`]: output buffer limits and field length ceilings
//! - [`rates`]: leaky bucket shapes per rate-limited action
//! - [`security`]: automatic ban durations and search deduplication
//! - [`validation`]: startup and runtime consistency checks
//! - [`store`]: the named, typed runtime registry used by `!show`/`!set`

mod defaults;
mod limits;
mod rates;
mod security;
pub mod store;
mod types;
pub mod validation;

pub use limits::LimitsConfig;
pub use rates::RatesConfig;
pub use security::SecurityConfig;
pub use store::{ConfigStore, StoreError, ValueKind};
pub use types::{CacheConfig, Config, ConfigError, FilesConfig, HubConfig, LoginConfig, ServerConfig};
pub use validation::{ValidationError, validate};
