//! End-to-end coordinator and pipeline behaviour with scripted
//! strategies standing in for the network.

use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use linkbox::artifacts::ArtifactManager;
use linkbox::config::{ArtifactConfig, Config, DeliveryLimits};
use linkbox::delivery;
use linkbox::pipeline::{ParseRequest, Pipeline, PipelineOutcome};
use linkbox::platforms::{NormalizedUrl, PlatformId, PlatformRegistry, normalize};
use linkbox::postprocess::{MediaSplitter, PostProcessor, SplitError, SplitPart};
use linkbox::resolver::{ResolutionCoordinator, ResolveError};
use linkbox::stats::RequestOutcome;
use linkbox::strategies::{
    FetchError, FetchStrategy, MediaItem, MediaKind, ResolvedMedia, StrategyContext, StrategyKind,
};

#[derive(Clone)]
enum Behaviour {
    Succeed,
    Fail(FetchError),
}

struct ScriptedStrategy {
    kind: StrategyKind,
    configured: bool,
    delay: Duration,
    behaviour: Behaviour,
    calls: Arc<AtomicUsize>,
}

impl ScriptedStrategy {
    fn new(kind: StrategyKind, behaviour: Behaviour) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = Arc::new(Self {
            kind,
            configured: true,
            delay: Duration::ZERO,
            behaviour,
            calls: Arc::clone(&calls),
        });
        (strategy, calls)
    }

    fn unconfigured(kind: StrategyKind) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = Arc::new(Self {
            kind,
            configured: false,
            delay: Duration::ZERO,
            behaviour: Behaviour::Succeed,
            calls: Arc::clone(&calls),
        });
        (strategy, calls)
    }

    fn slow(kind: StrategyKind, delay: Duration) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = Arc::new(Self {
            kind,
            configured: true,
            delay,
            behaviour: Behaviour::Succeed,
            calls: Arc::clone(&calls),
        });
        (strategy, calls)
    }
}

#[async_trait]
impl FetchStrategy for ScriptedStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn is_configured(&self, _platform: linkbox::platforms::PlatformId) -> bool {
        self.configured
    }

    async fn resolve(
        &self,
        url: &NormalizedUrl,
        ctx: &StrategyContext,
    ) -> Result<ResolvedMedia, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behaviour {
            Behaviour::Succeed => Ok(ResolvedMedia {
                platform_id: ctx.platform,
                kind: MediaKind::Video,
                items: vec![MediaItem::remote(
                    "https://cdn.example/clip.mp4",
                    5 * 1024 * 1024,
                    "video/mp4",
                )],
                caption: Some("a clip".to_string()),
                source_url: url.to_string(),
                resolved_at: Utc::now(),
            }),
            Behaviour::Fail(err) => Err(err.clone()),
        }
    }
}

struct Harness {
    coordinator: Arc<ResolutionCoordinator>,
    // keeps the artifact root alive for the test's duration
    _dir: TempDir,
}

fn harness(strategies: Vec<Arc<dyn FetchStrategy>>, ttl: Duration, timeout: Duration) -> Harness {
    let dir = TempDir::new().unwrap();
    let artifacts = Arc::new(ArtifactManager::new(&ArtifactConfig {
        root_dir: dir.path().to_path_buf(),
        retention_hours: 24,
        sweep_interval_hours: 24,
    }));
    let post = PostProcessor::new(DeliveryLimits::default(), None, Arc::clone(&artifacts));
    let coordinator = ResolutionCoordinator::new(
        Arc::new(PlatformRegistry::builtin()),
        strategies,
        post,
        artifacts,
        ttl,
        timeout,
        Duration::from_secs(30),
        dir.path().to_path_buf(),
    );
    Harness {
        coordinator: Arc::new(coordinator),
        _dir: dir,
    }
}

fn bilibili_url(id: &str) -> NormalizedUrl {
    normalize(&format!("https://www.bilibili.com/video/{id}")).unwrap()
}

#[tokio::test]
async fn concurrent_requests_share_one_resolution() {
    let (strategy, calls) =
        ScriptedStrategy::slow(StrategyKind::Cookie, Duration::from_millis(100));
    let harness = harness(
        vec![strategy],
        Duration::from_secs(60),
        Duration::from_secs(5),
    );
    let url = bilibili_url("BVflight");

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let coordinator = Arc::clone(&harness.coordinator);
        let url = url.clone();
        tasks.push(tokio::spawn(
            async move { coordinator.resolve(&url).await },
        ));
    }

    let mut medias = Vec::new();
    for task in tasks {
        let resolution = task.await.unwrap().unwrap();
        medias.push(resolution.media);
    }

    // one underlying chain ran; every caller saw the identical result
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for media in &medias[1..] {
        assert_eq!(**media, *medias[0]);
    }
}

#[tokio::test]
async fn all_permanent_failures_reported_with_causes_and_not_cached() {
    let (cookie, cookie_calls) = ScriptedStrategy::new(
        StrategyKind::Cookie,
        Behaviour::Fail(FetchError::AccessDenied("login wall".to_string())),
    );
    let (official, _) = ScriptedStrategy::new(
        StrategyKind::Official,
        Behaviour::Fail(FetchError::NotFound),
    );
    let (aggregator, _) = ScriptedStrategy::new(
        StrategyKind::Aggregator,
        Behaviour::Fail(FetchError::Unparseable("garbage".to_string())),
    );
    let harness = harness(
        vec![cookie, official, aggregator],
        Duration::from_secs(60),
        Duration::from_secs(5),
    );
    let url = bilibili_url("BVgone");

    let err = harness.coordinator.resolve(&url).await.unwrap_err();
    let ResolveError::AllStrategiesFailed(causes) = err else {
        panic!("expected AllStrategiesFailed");
    };
    // bilibili chain is cookie, official, aggregator: one cause each
    assert_eq!(causes.len(), 3);
    assert_eq!(causes[0].strategy, StrategyKind::Cookie);
    assert_eq!(causes[1].strategy, StrategyKind::Official);
    assert_eq!(causes[2].strategy, StrategyKind::Aggregator);
    assert!(causes.iter().all(|c| !c.transient));

    // nothing was cached, but permanent failures are remembered: the
    // second attempt fails again without re-invoking the strategies
    let err = harness.coordinator.resolve(&url).await.unwrap_err();
    assert!(matches!(err, ResolveError::AllStrategiesFailed(_)));
    assert_eq!(cookie_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unconfigured_strategies_are_skipped_silently() {
    let (cookie, cookie_calls) = ScriptedStrategy::unconfigured(StrategyKind::Cookie);
    let (aggregator, aggregator_calls) =
        ScriptedStrategy::new(StrategyKind::Aggregator, Behaviour::Succeed);
    let harness = harness(
        vec![cookie, aggregator],
        Duration::from_secs(60),
        Duration::from_secs(5),
    );

    let resolution = harness
        .coordinator
        .resolve(&bilibili_url("BVskip"))
        .await
        .unwrap();
    assert_eq!(cookie_calls.load(Ordering::SeqCst), 0);
    assert_eq!(aggregator_calls.load(Ordering::SeqCst), 1);
    assert!(!resolution.from_cache);
}

#[tokio::test]
async fn transient_failure_advances_to_next_strategy() {
    let (cookie, _) = ScriptedStrategy::new(
        StrategyKind::Cookie,
        Behaviour::Fail(FetchError::Network("connection reset".to_string())),
    );
    let (aggregator, _) = ScriptedStrategy::new(StrategyKind::Aggregator, Behaviour::Succeed);
    let harness = harness(
        vec![cookie, Arc::clone(&aggregator) as Arc<dyn FetchStrategy>],
        Duration::from_secs(60),
        Duration::from_secs(5),
    );

    let resolution = harness
        .coordinator
        .resolve(&bilibili_url("BVretry"))
        .await
        .unwrap();
    assert_eq!(resolution.media.items.len(), 1);
}

#[tokio::test]
async fn fast_success_beats_the_timeout_and_caches() {
    let (strategy, calls) = ScriptedStrategy::new(StrategyKind::Cookie, Behaviour::Succeed);
    let harness = harness(
        vec![strategy],
        Duration::from_secs(60),
        Duration::from_secs(5),
    );
    let url = bilibili_url("BVfast");

    let first = harness.coordinator.resolve(&url).await.unwrap();
    assert!(!first.from_cache);

    let second = harness.coordinator.resolve(&url).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(*second.media, *first.media);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cache_entries_expire_after_ttl() {
    let (strategy, calls) = ScriptedStrategy::new(StrategyKind::Cookie, Behaviour::Succeed);
    let harness = harness(
        vec![strategy],
        Duration::from_millis(50),
        Duration::from_secs(5),
    );
    let url = bilibili_url("BVttl");

    harness.coordinator.resolve(&url).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    let again = harness.coordinator.resolve(&url).await.unwrap();

    assert!(!again.from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn slow_chain_surfaces_timeout() {
    let (strategy, _) = ScriptedStrategy::slow(StrategyKind::Cookie, Duration::from_millis(300));
    let harness = harness(
        vec![strategy],
        Duration::from_secs(60),
        Duration::from_millis(50),
    );

    let err = harness
        .coordinator
        .resolve(&bilibili_url("BVslow"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::Timeout(_)));
}

#[tokio::test]
async fn oversized_media_never_reaches_delivery_inline() {
    struct HugeVideo;

    #[async_trait]
    impl FetchStrategy for HugeVideo {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Aggregator
        }
        fn is_configured(&self, _platform: linkbox::platforms::PlatformId) -> bool {
            true
        }
        async fn resolve(
            &self,
            url: &NormalizedUrl,
            ctx: &StrategyContext,
        ) -> Result<ResolvedMedia, FetchError> {
            Ok(ResolvedMedia {
                platform_id: ctx.platform,
                kind: MediaKind::Video,
                items: vec![MediaItem::remote(
                    "https://cdn.example/huge.mp4",
                    120 * 1024 * 1024,
                    "video/mp4",
                )],
                caption: Some("big one".to_string()),
                source_url: url.to_string(),
                resolved_at: Utc::now(),
            })
        }
    }

    let harness = harness(
        vec![Arc::new(HugeVideo)],
        Duration::from_secs(60),
        Duration::from_secs(5),
    );
    let url = bilibili_url("BVhuge");

    let resolution = harness.coordinator.resolve(&url).await.unwrap();
    let limit = DeliveryLimits::default().channel_video_limit.as_u64();
    for item in &resolution.media.items {
        assert!(item.is_fallback_link() || item.byte_size <= limit);
    }

    let plan = delivery::package(&resolution.media);
    assert!(plan.degraded);
    assert_eq!(plan.items[0].caption.as_deref(), Some("big one"));
}

#[tokio::test]
async fn oversized_video_splits_into_ordered_parts_with_one_caption() {
    // hands back a downloaded file ten times the channel limit
    struct DownloadedHugeVideo;

    #[async_trait]
    impl FetchStrategy for DownloadedHugeVideo {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Cookie
        }
        fn is_configured(&self, _platform: linkbox::platforms::PlatformId) -> bool {
            true
        }
        async fn resolve(
            &self,
            url: &NormalizedUrl,
            ctx: &StrategyContext,
        ) -> Result<ResolvedMedia, FetchError> {
            let path = ctx.download_dir.join("full.mp4");
            tokio::fs::write(&path, b"video bytes")
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            ctx.artifacts.register(&path, ctx.request_id);
            Ok(ResolvedMedia {
                platform_id: ctx.platform,
                kind: MediaKind::Video,
                items: vec![MediaItem::local(path, 120 * 1024 * 1024, "video/mp4")],
                caption: Some("full episode".to_string()),
                source_url: url.to_string(),
                resolved_at: Utc::now(),
            })
        }
    }

    // cuts any input into three conforming parts
    struct ThreePartSplitter;

    #[async_trait]
    impl MediaSplitter for ThreePartSplitter {
        async fn split(&self, input: &Path) -> Result<Vec<SplitPart>, SplitError> {
            let dir = input.parent().unwrap();
            Ok((0..3)
                .map(|n| SplitPart {
                    path: dir.join(format!("full_part{n:03}.mp4")),
                    byte_size: 40 * 1024 * 1024,
                })
                .collect())
        }
    }

    let dir = TempDir::new().unwrap();
    let artifacts = Arc::new(ArtifactManager::new(&ArtifactConfig {
        root_dir: dir.path().to_path_buf(),
        retention_hours: 24,
        sweep_interval_hours: 24,
    }));
    let post = PostProcessor::with_parts(
        DeliveryLimits::default(),
        Arc::new(ThreePartSplitter),
        None,
        Arc::clone(&artifacts),
    );
    let coordinator = ResolutionCoordinator::new(
        Arc::new(PlatformRegistry::builtin()),
        vec![Arc::new(DownloadedHugeVideo)],
        post,
        artifacts,
        Duration::from_secs(60),
        Duration::from_secs(5),
        Duration::from_secs(30),
        dir.path().to_path_buf(),
    );

    let resolution = coordinator.resolve(&bilibili_url("BVlong")).await.unwrap();
    let plan = delivery::package(&resolution.media);

    assert!(!plan.degraded);
    assert_eq!(plan.items.len(), 3);
    for (n, entry) in plan.items.iter().enumerate() {
        let expected = dir.path().join(format!("full_part{n:03}.mp4"));
        assert_eq!(entry.item.local_path(), Some(&expected));
        assert!(entry.item.byte_size <= DeliveryLimits::default().channel_video_limit.as_u64());
        assert!(!entry.is_fallback_link);
    }
    assert_eq!(plan.items[0].caption.as_deref(), Some("full episode"));
    assert!(plan.items[1].caption.is_none());
    assert!(plan.items[2].caption.is_none());
}

#[tokio::test]
async fn pipeline_ignores_passive_text_without_permission() {
    let pipeline = Pipeline::new(Config::default()).await.unwrap();

    let request = ParseRequest::passive(
        "look at https://www.bilibili.com/video/BV1 now",
        "user-1",
        false,
    );
    assert!(matches!(
        pipeline.handle(&request).await,
        PipelineOutcome::NoUrl
    ));
    // silent skip: no stat record either
    assert!(pipeline.stats().snapshot().records.is_empty());
}

#[tokio::test]
async fn pipeline_records_unsupported_for_commands_without_links() {
    let pipeline = Pipeline::new(Config::default()).await.unwrap();

    let request = ParseRequest::command("no links in here", "user-2");
    assert!(matches!(
        pipeline.handle(&request).await,
        PipelineOutcome::NoUrl
    ));

    let snapshot = pipeline.stats().snapshot();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].outcome, RequestOutcome::Unsupported);
}

#[tokio::test]
async fn pipeline_attributes_failures_to_the_platform() {
    // no credentials configured, so every strategy is skipped and the
    // chain fails, but the platform was still recognised from the URL
    let pipeline = Pipeline::new(Config::default()).await.unwrap();

    let request = ParseRequest::command("https://www.bilibili.com/video/BVstat", "user-3");
    let outcome = pipeline.handle(&request).await;
    assert!(matches!(
        outcome,
        PipelineOutcome::Failed(ResolveError::AllStrategiesFailed(_))
    ));

    let snapshot = pipeline.stats().snapshot();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(
        snapshot.records[0].outcome,
        RequestOutcome::AllStrategiesFailed
    );
    assert_eq!(snapshot.records[0].platform, Some(PlatformId::Bilibili));
}
