//! The pipeline facade: one entry point gluing URL detection,
//! resolution, adaptation, packaging and stats together.
//!
//! The surrounding bot framework calls `handle` once per inbound chat
//! event and sends whatever `DeliveryPlan` comes back. No listener or
//! wire protocol lives here.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::artifacts::ArtifactManager;
use crate::config::Config;
use crate::delivery::{self, DeliveryPlan};
use crate::platforms::{PlatformRegistry, UrlMatcher};
use crate::postprocess::{PostProcessor, Rehoster};
use crate::resolver::{ResolutionCoordinator, ResolveError};
use crate::stats::{RequestOutcome, StatRecord, StatsRecorder};
use crate::strategies::http::{HttpClient, HttpError};
use crate::strategies::{
    AggregatorResolver, CookieResolver, FetchStrategy, MediaLocation, OAuthResolver,
    OfficialResolver, ProxyResolver,
};

/// Buffered stat records kept before drop-oldest kicks in.
const STATS_CAPACITY: usize = 1024;

/// How the text reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Explicit user command; always acted on.
    Command,
    /// Message observed in passing; acted on only where the chat has
    /// passive detection enabled.
    Passive { allowed: bool },
}

/// One inbound chat event. Immutable for the life of the attempt.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub raw_text: String,
    pub requester_id: String,
    pub origin: Origin,
    pub submitted_at: DateTime<Utc>,
}

impl ParseRequest {
    pub fn command(raw_text: impl Into<String>, requester_id: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            requester_id: requester_id.into(),
            origin: Origin::Command,
            submitted_at: Utc::now(),
        }
    }

    pub fn passive(
        raw_text: impl Into<String>,
        requester_id: impl Into<String>,
        allowed: bool,
    ) -> Self {
        Self {
            raw_text: raw_text.into(),
            requester_id: requester_id.into(),
            origin: Origin::Passive { allowed },
            submitted_at: Utc::now(),
        }
    }
}

/// What one request produced.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Media is ready to send.
    Delivered {
        plan: DeliveryPlan,
        from_cache: bool,
    },
    /// No supported URL in the text. Passive detections end here
    /// silently; commands render it to the user.
    NoUrl,
    /// Resolution failed in a way worth telling the user about.
    Failed(ResolveError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] HttpError),

    #[error("failed to prepare artifact directory: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Pipeline {
    registry: Arc<PlatformRegistry>,
    matcher: UrlMatcher,
    coordinator: ResolutionCoordinator,
    artifacts: Arc<ArtifactManager>,
    stats: Arc<StatsRecorder>,
    sweeper: JoinHandle<()>,
}

impl Pipeline {
    /// Wire the whole pipeline from configuration and start the
    /// artifact sweeper. The config is expected to be validated.
    pub async fn new(config: Config) -> Result<Self, PipelineError> {
        let http = Arc::new(HttpClient::new(&config.http, None)?);
        let expander = match config.http.redirect_proxy.as_deref() {
            Some(proxy) => Arc::new(HttpClient::new(&config.http, Some(proxy))?),
            None => Arc::clone(&http),
        };

        let registry = Arc::new(PlatformRegistry::with_overrides(&config.platforms));
        let matcher = UrlMatcher::new(Arc::clone(&registry), Some(expander));

        let artifacts = Arc::new(ArtifactManager::new(&config.artifacts));
        artifacts.ensure_root().await?;
        let sweeper = artifacts.spawn_sweeper();

        let rehoster = Rehoster::from_config(&config.rehost, &config.http);
        let post = PostProcessor::new(config.limits.clone(), rehoster, Arc::clone(&artifacts));

        let strategies: Vec<Arc<dyn FetchStrategy>> = vec![
            Arc::new(OfficialResolver::new(
                Arc::clone(&http),
                &config.credentials.official,
            )),
            Arc::new(OAuthResolver::new(
                Arc::clone(&http),
                &config.credentials.oauth,
            )),
            Arc::new(CookieResolver::new(
                Arc::clone(&http),
                &config.credentials.cookie,
            )),
            Arc::new(ProxyResolver::new(
                Arc::clone(&http),
                &config.credentials.proxy,
            )),
            Arc::new(AggregatorResolver::new(
                Arc::clone(&http),
                &config.credentials.aggregator,
            )),
        ];

        let download_dir = artifacts.root_dir().to_path_buf();
        let coordinator = ResolutionCoordinator::new(
            Arc::clone(&registry),
            strategies,
            post,
            Arc::clone(&artifacts),
            config.cache.ttl(),
            config.resolution.timeout(),
            config.resolution.adapt_timeout(),
            download_dir,
        );

        Ok(Self {
            registry,
            matcher,
            coordinator,
            artifacts,
            stats: Arc::new(StatsRecorder::new(STATS_CAPACITY)),
            sweeper,
        })
    }

    /// Process one inbound chat event end to end.
    pub async fn handle(&self, request: &ParseRequest) -> PipelineOutcome {
        if let Origin::Passive { allowed: false } = request.origin {
            return PipelineOutcome::NoUrl;
        }

        let started = Instant::now();
        let Some(url) = self.matcher.find_supported_url(&request.raw_text).await else {
            debug!(requester = %request.requester_id, "no supported URL in text");
            if request.origin == Origin::Command {
                self.stats.record(StatRecord {
                    platform: None,
                    outcome: RequestOutcome::Unsupported,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            return PipelineOutcome::NoUrl;
        };

        match self.coordinator.resolve(&url).await {
            Ok(resolution) => {
                let plan = delivery::package(&resolution.media);
                // pin local files until the caller confirms delivery
                for entry in &plan.items {
                    if let MediaLocation::Local(path) = &entry.item.location {
                        self.artifacts.mark_in_use(path);
                    }
                }

                if resolution.from_cache {
                    self.stats.cache_hit();
                }
                self.stats.record(StatRecord {
                    platform: Some(resolution.media.platform_id),
                    outcome: RequestOutcome::Success,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
                info!(
                    url = %url,
                    requester = %request.requester_id,
                    items = plan.items.len(),
                    degraded = plan.degraded,
                    from_cache = resolution.from_cache,
                    "delivery plan ready"
                );
                PipelineOutcome::Delivered {
                    plan,
                    from_cache: resolution.from_cache,
                }
            }
            Err(err) => {
                let outcome = match &err {
                    ResolveError::UnsupportedPlatform => RequestOutcome::Unsupported,
                    ResolveError::AllStrategiesFailed(_) => RequestOutcome::AllStrategiesFailed,
                    ResolveError::Timeout(_) => RequestOutcome::Timeout,
                };
                let platform = self.registry.lookup(&url).map(|d| d.platform_id);
                self.stats.record(StatRecord {
                    platform,
                    outcome,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
                match err {
                    ResolveError::UnsupportedPlatform => PipelineOutcome::NoUrl,
                    other => PipelineOutcome::Failed(other),
                }
            }
        }
    }

    /// Unpin the files behind a plan once the channel confirms it went
    /// out. The files stay on disk for the cache window; the sweeper
    /// removes them with the cache entry's expiry.
    pub fn confirm_delivered(&self, plan: &DeliveryPlan) {
        for entry in &plan.items {
            if let MediaLocation::Local(path) = &entry.item.location {
                self.artifacts.clear_in_use(path);
            }
        }
    }

    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}
