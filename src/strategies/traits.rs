use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::artifacts::ArtifactManager;
use crate::platforms::{NormalizedUrl, PlatformId};
use crate::strategies::types::ResolvedMedia;

/// Resolution methods, in the order a fallback chain may try them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Official,
    Oauth,
    Cookie,
    Proxy,
    Aggregator,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Official => "official",
            StrategyKind::Oauth => "oauth",
            StrategyKind::Cookie => "cookie",
            StrategyKind::Proxy => "proxy",
            StrategyKind::Aggregator => "aggregator",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one strategy attempt did not produce media.
///
/// Transient failures (network, timeout) let the next attempt run
/// without leaving a trace; permanent ones are remembered per
/// `(url, strategy)` so retries skip straight past them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("attempt timed out")]
    Timeout,
    #[error("content not found or removed")]
    NotFound,
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("response not understood: {0}")]
    Unparseable(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Timeout)
    }
}

/// Per-request state handed to each strategy attempt.
#[derive(Clone)]
pub struct StrategyContext {
    pub platform: PlatformId,
    pub request_id: Uuid,
    pub download_dir: PathBuf,
    pub artifacts: Arc<ArtifactManager>,
}

/// One way of turning a supported URL into media. Implementations are
/// stateless beyond their credentials; the coordinator owns ordering
/// and fallback.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy has the credentials/endpoint it needs for
    /// the given platform. Unconfigured strategies are skipped without
    /// counting as failures.
    fn is_configured(&self, platform: PlatformId) -> bool;

    async fn resolve(
        &self,
        url: &NormalizedUrl,
        ctx: &StrategyContext,
    ) -> Result<ResolvedMedia, FetchError>;
}
