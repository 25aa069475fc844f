//! Configuration for the resolution pipeline
//!
//! Settings are layered from three sources:
//! 1. Default values embedded in the structs
//! 2. A TOML file (`config/linkbox.toml`, overridable via `LINKBOX_CONFIG`)
//! 3. Environment variables (`LINKBOX__<SECTION>__<KEY>`, highest priority)
//!
//! Credentials (cookies, tokens, API keys) are only ever read from the
//! environment: `LINKBOX_OAUTH_TOKEN`, `LINKBOX_AGGREGATOR_KEY`,
//! `LINKBOX_REHOST_USERHASH` and `LINKBOX_COOKIE_<PLATFORM>`. A missing
//! credential disables the corresponding strategy; it is never an error.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    AggregatorCredentials, ArtifactConfig, CacheConfig, Config, CookieCredentials, Credentials,
    DeliveryLimits, HttpSettings, OAuthCredentials, OfficialCredentials, PlatformOverride,
    ProxyCredentials, RehostConfig, ResolutionConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path; used by tests.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
