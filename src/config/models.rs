use crate::humanize::ByteSize;
use crate::strategies::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub limits: DeliveryLimits,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub rehost: RehostConfig,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub credentials: Credentials,
    /// Per-platform overrides, keyed by platform id ("bilibili", ...)
    #[serde(default)]
    pub platforms: HashMap<String, PlatformOverride>,
}

/// Size limits of the delivery channel and the split policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryLimits {
    /// Largest video the channel accepts inline
    #[serde(default = "default_video_limit")]
    pub channel_video_limit: ByteSize,
    /// Largest image the channel accepts inline
    #[serde(default = "default_image_limit")]
    pub channel_image_limit: ByteSize,
    /// Target size for each part when splitting an oversized video
    #[serde(default = "default_split_target")]
    pub split_target: ByteSize,
    #[serde(default = "default_true")]
    pub split_enabled: bool,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

impl Default for DeliveryLimits {
    fn default() -> Self {
        Self {
            channel_video_limit: default_video_limit(),
            channel_image_limit: default_image_limit(),
            split_target: default_split_target(),
            split_enabled: true,
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

fn default_video_limit() -> ByteSize {
    ByteSize::from_mb(50)
}

fn default_image_limit() -> ByteSize {
    ByteSize::from_mb(10)
}

fn default_split_target() -> ByteSize {
    ByteSize::from_mb(45)
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_true() -> bool {
    true
}

/// Result cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_ttl_hours() -> u64 {
    24
}

/// Temp artifact retention settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_root")]
    pub root_dir: PathBuf,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_sweep_interval_hours")]
    pub sweep_interval_hours: u64,
}

impl ArtifactConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_hours * 3600)
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            root_dir: default_artifact_root(),
            retention_hours: default_retention_hours(),
            sweep_interval_hours: default_sweep_interval_hours(),
        }
    }
}

fn default_artifact_root() -> PathBuf {
    std::env::temp_dir().join("linkbox")
}

fn default_retention_hours() -> u64 {
    24
}

fn default_sweep_interval_hours() -> u64 {
    24
}

/// Resolution and adaptation timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolutionConfig {
    /// Wall-clock budget for the whole strategy chain of one request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Looser budget for transcode/upload during post-processing
    #[serde(default = "default_adapt_timeout_secs")]
    pub adapt_timeout_secs: u64,
}

impl ResolutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn adapt_timeout(&self) -> Duration {
        Duration::from_secs(self.adapt_timeout_secs)
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            adapt_timeout_secs: default_adapt_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_adapt_timeout_secs() -> u64 {
    300
}

/// External re-hosting for media the channel cannot carry inline
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RehostConfig {
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: Option<String>,
    /// Account hash for the host (loaded from environment, never TOML)
    #[serde(skip)]
    pub user_hash: Option<String>,
}

/// Outbound HTTP behaviour shared by all strategies
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Proxy used only when expanding region-locked short links
    pub redirect_proxy: Option<String>,
}

impl HttpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            redirect_proxy: None,
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    // Desktop UA; several platforms reject unknown clients outright
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
        .to_string()
}

/// Per-strategy credentials and endpoints. A strategy whose section is
/// incomplete is skipped for the affected platforms, never an error.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Credentials {
    #[serde(default)]
    pub official: OfficialCredentials,
    #[serde(default)]
    pub oauth: OAuthCredentials,
    #[serde(default)]
    pub cookie: CookieCredentials,
    #[serde(default)]
    pub proxy: ProxyCredentials,
    #[serde(default)]
    pub aggregator: AggregatorCredentials,
}

/// Self-hosted official resolver endpoints, keyed by platform id
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OfficialCredentials {
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OAuthCredentials {
    pub endpoint: Option<String>,
    /// Bearer token (loaded from environment, never TOML)
    #[serde(skip)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CookieCredentials {
    pub endpoint: Option<String>,
    /// Per-platform cookie strings (loaded from environment, never TOML)
    #[serde(skip)]
    pub cookies: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyCredentials {
    /// Anti-crawler proxy front that fetches on our behalf
    pub base: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AggregatorCredentials {
    pub endpoint: Option<String>,
    /// API key (loaded from environment, never TOML)
    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Deployment-specific platform tuning
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlatformOverride {
    /// Replaces the builtin fallback order for this platform
    #[serde(default)]
    pub strategy_order: Vec<StrategyKind>,
}
