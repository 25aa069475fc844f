//! Resolution coordinator: picks the platform, walks its strategy
//! chain, and funnels concurrent duplicate requests into one attempt.
//!
//! Results are adapted for delivery before they enter the cache, so a
//! cache hit is always ready to send as-is.

mod cache;
mod error;
mod flight;

pub use cache::ResultCache;
pub use error::{ResolveError, Result, StrategyFailure};
pub use flight::{FlightRole, SingleFlight};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifacts::ArtifactManager;
use crate::platforms::{NormalizedUrl, PlatformDescriptor, PlatformRegistry};
use crate::postprocess::PostProcessor;
use crate::strategies::{FetchStrategy, ResolvedMedia, StrategyContext};

/// A resolved result plus where it came from, so callers can count
/// cache hits separately from fresh work.
#[derive(Debug)]
pub struct Resolution {
    pub media: Arc<ResolvedMedia>,
    pub from_cache: bool,
}

pub struct ResolutionCoordinator {
    registry: Arc<PlatformRegistry>,
    strategies: Vec<Arc<dyn FetchStrategy>>,
    cache: ResultCache,
    flights: Arc<SingleFlight>,
    post: PostProcessor,
    artifacts: Arc<ArtifactManager>,
    resolve_timeout: Duration,
    adapt_timeout: Duration,
    download_dir: PathBuf,
}

impl ResolutionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<PlatformRegistry>,
        strategies: Vec<Arc<dyn FetchStrategy>>,
        post: PostProcessor,
        artifacts: Arc<ArtifactManager>,
        cache_ttl: Duration,
        resolve_timeout: Duration,
        adapt_timeout: Duration,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            strategies,
            cache: ResultCache::new(cache_ttl),
            flights: SingleFlight::new(),
            post,
            artifacts,
            resolve_timeout,
            adapt_timeout,
            download_dir,
        }
    }

    /// Resolve a supported URL into delivery-ready media.
    pub async fn resolve(&self, url: &NormalizedUrl) -> Result<Resolution> {
        let descriptor = self
            .registry
            .lookup(url)
            .ok_or(ResolveError::UnsupportedPlatform)?;

        loop {
            if let Some(media) = self.cache.get(url) {
                debug!(url = %url, "cache hit");
                return Ok(Resolution {
                    media,
                    from_cache: true,
                });
            }

            match self.flights.join(url) {
                FlightRole::Leader(guard) => {
                    let result = self.lead(descriptor, url).await;
                    guard.complete(result.clone());
                    return result.map(|media| Resolution {
                        media,
                        from_cache: false,
                    });
                }
                FlightRole::Follower(mut rx) => {
                    debug!(url = %url, "joining in-flight resolution");
                    match rx.recv().await {
                        Ok(result) => {
                            return result.map(|media| Resolution {
                                media,
                                from_cache: false,
                            });
                        }
                        // leader vanished without answering, take over
                        Err(_) => continue,
                    }
                }
            }
        }
    }

    async fn lead(
        &self,
        descriptor: &PlatformDescriptor,
        url: &NormalizedUrl,
    ) -> std::result::Result<Arc<ResolvedMedia>, ResolveError> {
        let mut media = match timeout(self.resolve_timeout, self.run_chain(descriptor, url)).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(url = %url, after = ?self.resolve_timeout, "resolution timed out");
                return Err(ResolveError::Timeout(self.resolve_timeout));
            }
        };

        // Adaptation runs under its own budget: splitting a large video
        // can dwarf the resolution itself.
        match timeout(self.adapt_timeout, self.post.adapt_for_delivery(&mut media)).await {
            Ok(report) => {
                if report.changed() {
                    info!(url = %url, ?report, "media adapted for delivery");
                }
            }
            Err(_) => {
                warn!(url = %url, "adaptation timed out, degrading oversized items to links");
                self.post.degrade_oversized(&mut media);
            }
        }

        let media = Arc::new(media);
        self.cache.insert(url.clone(), Arc::clone(&media));
        Ok(media)
    }

    async fn run_chain(
        &self,
        descriptor: &PlatformDescriptor,
        url: &NormalizedUrl,
    ) -> std::result::Result<ResolvedMedia, ResolveError> {
        let ctx = StrategyContext {
            platform: descriptor.platform_id,
            request_id: Uuid::new_v4(),
            download_dir: self.download_dir.clone(),
            artifacts: Arc::clone(&self.artifacts),
        };

        let mut failures = Vec::new();
        for kind in &descriptor.strategy_order {
            let Some(strategy) = self.strategies.iter().find(|s| s.kind() == *kind) else {
                continue;
            };
            if !strategy.is_configured(ctx.platform) {
                debug!(platform = %ctx.platform, strategy = %kind, "skipping unconfigured strategy");
                continue;
            }
            if self.cache.is_marked_failed(url, *kind) {
                debug!(url = %url, strategy = %kind, "skipping previously failed strategy");
                failures.push(StrategyFailure {
                    strategy: *kind,
                    reason: "previously failed permanently".to_string(),
                    transient: false,
                });
                continue;
            }

            match strategy.resolve(url, &ctx).await {
                Ok(media) => {
                    info!(url = %url, platform = %ctx.platform, strategy = %kind, "resolved");
                    return Ok(media);
                }
                Err(err) => {
                    if !err.is_transient() {
                        self.cache.mark_failed(url.clone(), *kind);
                    }
                    warn!(url = %url, strategy = %kind, error = %err, "strategy failed");
                    failures.push(StrategyFailure {
                        strategy: *kind,
                        reason: err.to_string(),
                        transient: err.is_transient(),
                    });
                }
            }
        }

        Err(ResolveError::AllStrategiesFailed(failures))
    }
}
