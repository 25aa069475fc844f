use std::time::Duration;
use thiserror::Error;

use crate::strategies::StrategyKind;

/// One exhausted attempt in a fallback chain.
#[derive(Debug, Clone)]
pub struct StrategyFailure {
    pub strategy: StrategyKind,
    pub reason: String,
    pub transient: bool,
}

/// Error results are cloneable so a single resolution can be fanned
/// out to every caller waiting on the same URL.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("no platform recognises this URL")]
    UnsupportedPlatform,

    #[error("all {} strategies failed: {}", .0.len(), summarize(.0))]
    AllStrategiesFailed(Vec<StrategyFailure>),

    #[error("resolution timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ResolveError>;

fn summarize(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.strategy, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
