use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "LINKBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/linkbox.toml";
const ENV_PREFIX: &str = "LINKBOX";
const ENV_SEPARATOR: &str = "__";

const COOKIE_ENV_PREFIX: &str = "LINKBOX_COOKIE_";

/// Load configuration from all sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if present)
/// 3. `.env` file via dotenvy
/// 4. System environment variables (highest)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);
    Ok(config)
}

/// Load configuration from a specific path, without secret injection.
/// Useful for testing with custom configuration files.
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "loading configuration file");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            path = %config_path.display(),
            "configuration file not found, using defaults and environment"
        );
    }

    // LINKBOX__LIMITS__SPLIT_TARGET -> limits.split_target
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// Secrets live only in the environment, never in TOML files.
fn load_secrets(config: &mut Config) {
    if let Ok(token) = env::var("LINKBOX_OAUTH_TOKEN") {
        config.credentials.oauth.token = Some(token);
    }
    if let Ok(key) = env::var("LINKBOX_AGGREGATOR_KEY") {
        config.credentials.aggregator.api_key = Some(key);
    }
    if let Ok(hash) = env::var("LINKBOX_REHOST_USERHASH") {
        config.rehost.user_hash = Some(hash);
    }

    // LINKBOX_COOKIE_BILIBILI=... -> cookies["bilibili"]
    for (name, value) in env::vars() {
        if let Some(platform) = name.strip_prefix(COOKIE_ENV_PREFIX) {
            config
                .credentials
                .cookie
                .cookies
                .insert(platform.to_ascii_lowercase(), value);
        }
    }
}
