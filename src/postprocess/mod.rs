//! Media post-processing: reshape resolved media so every item fits
//! the channel's size limits before anything is cached or delivered.
//!
//! Per-item policy, applied once:
//!   * within limits, or already a fallback link: untouched
//!   * oversized local video: split into conforming parts
//!   * still oversized (split failed, disabled, or not a video):
//!     re-hosted and delivered by URL when a re-hoster is configured
//!   * anything else oversized: degraded to a source-page link
//!
//! The pass is idempotent: running it on already conforming media
//! changes nothing.

mod rehost;
mod split;

pub use rehost::{RehostError, Rehoster};
pub use split::{SplitError, SplitPart, VideoSplitter};

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::artifacts::ArtifactManager;
use crate::config::DeliveryLimits;
use crate::strategies::{MediaItem, MediaLocation, ResolvedMedia};

/// Cuts an oversized file into conforming parts.
#[async_trait]
pub trait MediaSplitter: Send + Sync {
    async fn split(&self, input: &Path) -> Result<Vec<SplitPart>, SplitError>;
}

#[async_trait]
impl MediaSplitter for VideoSplitter {
    async fn split(&self, input: &Path) -> Result<Vec<SplitPart>, SplitError> {
        VideoSplitter::split(self, input).await
    }
}

/// Moves an oversized file to an external host, returning its URL.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String, RehostError>;
}

#[async_trait]
impl MediaUploader for Rehoster {
    async fn upload(&self, path: &Path) -> Result<String, RehostError> {
        Rehoster::upload(self, path).await
    }
}

/// What one adaptation pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdaptReport {
    pub split: usize,
    pub rehosted: usize,
    pub degraded: usize,
}

impl AdaptReport {
    pub fn changed(&self) -> bool {
        self.split + self.rehosted + self.degraded > 0
    }
}

pub struct PostProcessor {
    limits: DeliveryLimits,
    splitter: Arc<dyn MediaSplitter>,
    uploader: Option<Arc<dyn MediaUploader>>,
    artifacts: Arc<ArtifactManager>,
}

impl PostProcessor {
    pub fn new(
        limits: DeliveryLimits,
        rehoster: Option<Rehoster>,
        artifacts: Arc<ArtifactManager>,
    ) -> Self {
        let splitter = Arc::new(VideoSplitter::new(
            &limits.ffmpeg_path,
            limits.split_target.as_u64(),
        ));
        Self::with_parts(
            limits,
            splitter,
            rehoster.map(|r| Arc::new(r) as Arc<dyn MediaUploader>),
            artifacts,
        )
    }

    /// Assemble from explicit collaborators; tests script them.
    pub fn with_parts(
        limits: DeliveryLimits,
        splitter: Arc<dyn MediaSplitter>,
        uploader: Option<Arc<dyn MediaUploader>>,
        artifacts: Arc<ArtifactManager>,
    ) -> Self {
        Self {
            limits,
            splitter,
            uploader,
            artifacts,
        }
    }

    fn limit_for(&self, item: &MediaItem) -> u64 {
        if item.is_video() {
            self.limits.channel_video_limit.as_u64()
        } else {
            self.limits.channel_image_limit.as_u64()
        }
    }

    fn conforms(&self, item: &MediaItem) -> bool {
        item.is_fallback_link() || item.byte_size <= self.limit_for(item)
    }

    /// Bring every item of `media` within delivery limits, in place.
    pub async fn adapt_for_delivery(&self, media: &mut ResolvedMedia) -> AdaptReport {
        let mut report = AdaptReport::default();
        if media.items.iter().all(|item| self.conforms(item)) {
            return report;
        }

        let owner = Uuid::new_v4();
        let source_url = media.source_url.clone();
        let mut adapted = Vec::with_capacity(media.items.len());

        for item in media.items.drain(..) {
            if self.conforms(&item) {
                adapted.push(item);
                continue;
            }
            let items = self.adapt_item(item, owner, &source_url, &mut report).await;
            adapted.extend(items);
        }

        media.items = adapted;
        report
    }

    async fn adapt_item(
        &self,
        item: MediaItem,
        owner: Uuid,
        source_url: &str,
        report: &mut AdaptReport,
    ) -> Vec<MediaItem> {
        let fallback = || MediaItem::link(source_url);

        let MediaLocation::Local(path) = &item.location else {
            // oversized remote media cannot be reshaped, only linked
            debug!(size = item.byte_size, "oversized remote item degraded to link");
            report.degraded += 1;
            return vec![fallback()];
        };

        if item.is_video() && self.limits.split_enabled {
            match self.splitter.split(path).await {
                Ok(parts) => {
                    let mime_kind = item.mime_kind.clone();
                    let items = parts
                        .into_iter()
                        .map(|part| {
                            self.artifacts.register(&part.path, owner);
                            MediaItem::local(part.path, part.byte_size, mime_kind.clone())
                        })
                        .collect();
                    // the oversized original is no longer deliverable
                    self.artifacts.release(path).await;
                    report.split += 1;
                    return items;
                }
                Err(err) => {
                    // keep the original on disk, re-hosting gets it next
                    warn!(file = %path.display(), error = %err, "split failed, trying re-host");
                }
            }
        }

        if let Some(uploader) = &self.uploader {
            match uploader.upload(path).await {
                Ok(url) => {
                    self.artifacts.release(path).await;
                    report.rehosted += 1;
                    return vec![MediaItem::remote(
                        url,
                        item.byte_size,
                        item.mime_kind.clone(),
                    )];
                }
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "re-host failed, degrading to link");
                }
            }
        }

        self.artifacts.release(path).await;
        report.degraded += 1;
        vec![fallback()]
    }

    /// Last-resort degrade used when adaptation runs out of time:
    /// every still-oversized item becomes a source-page link.
    pub fn degrade_oversized(&self, media: &mut ResolvedMedia) {
        let source_url = media.source_url.clone();
        for item in &mut media.items {
            if !self.conforms(item) {
                *item = MediaItem::link(&source_url);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArtifactConfig;
    use crate::platforms::PlatformId;
    use crate::strategies::MediaKind;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSplitter;

    #[async_trait]
    impl MediaSplitter for FailingSplitter {
        async fn split(&self, _input: &Path) -> Result<Vec<SplitPart>, SplitError> {
            Err(SplitError::FfmpegFailed("no keyframes".to_string()))
        }
    }

    struct CountingUploader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaUploader for CountingUploader {
        async fn upload(&self, _path: &Path) -> Result<String, RehostError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("https://files.example/abc.mp4".to_string())
        }
    }

    fn artifacts() -> Arc<ArtifactManager> {
        Arc::new(ArtifactManager::new(&ArtifactConfig::default()))
    }

    fn processor() -> PostProcessor {
        PostProcessor::new(DeliveryLimits::default(), None, artifacts())
    }

    fn media_with(items: Vec<MediaItem>) -> ResolvedMedia {
        ResolvedMedia {
            platform_id: PlatformId::Bilibili,
            kind: MediaKind::Video,
            items,
            caption: None,
            source_url: "https://www.bilibili.com/video/BV1".to_string(),
            resolved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn conforming_media_is_untouched() {
        let post = processor();
        let mut media = media_with(vec![
            MediaItem::local(PathBuf::from("/tmp/small.mp4"), 10 * 1024 * 1024, "video/mp4"),
            MediaItem::remote("https://cdn.example/a.jpg", 500 * 1024, "image/jpeg"),
        ]);
        let before = media.clone();

        let report = post.adapt_for_delivery(&mut media).await;
        assert!(!report.changed());
        assert_eq!(media, before);
    }

    #[tokio::test]
    async fn adaptation_is_idempotent_on_links() {
        let post = processor();
        let mut media = media_with(vec![MediaItem::link("https://www.bilibili.com/video/BV1")]);
        let before = media.clone();

        let report = post.adapt_for_delivery(&mut media).await;
        assert!(!report.changed());
        let report = post.adapt_for_delivery(&mut media).await;
        assert!(!report.changed());
        assert_eq!(media, before);
    }

    #[tokio::test]
    async fn oversized_remote_video_degrades_to_link() {
        let post = processor();
        let mut media = media_with(vec![MediaItem::remote(
            "https://cdn.example/huge.mp4",
            120 * 1024 * 1024,
            "video/mp4",
        )]);

        let report = post.adapt_for_delivery(&mut media).await;
        assert_eq!(report.degraded, 1);
        assert_eq!(media.items.len(), 1);
        assert!(media.items[0].is_fallback_link());
        assert_eq!(
            media.items[0].location,
            MediaLocation::Link("https://www.bilibili.com/video/BV1".to_string())
        );
    }

    #[tokio::test]
    async fn oversized_video_rehosts_when_splitting_is_disabled() {
        let uploader = Arc::new(CountingUploader {
            calls: AtomicUsize::new(0),
        });
        let limits = DeliveryLimits {
            split_enabled: false,
            ..DeliveryLimits::default()
        };
        let post = PostProcessor::with_parts(
            limits,
            Arc::new(FailingSplitter),
            Some(Arc::clone(&uploader) as Arc<dyn MediaUploader>),
            artifacts(),
        );
        let mut media = media_with(vec![MediaItem::local(
            PathBuf::from("/tmp/huge.mp4"),
            120 * 1024 * 1024,
            "video/mp4",
        )]);

        let report = post.adapt_for_delivery(&mut media).await;
        assert_eq!(report, AdaptReport { split: 0, rehosted: 1, degraded: 0 });
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            media.items[0].location,
            MediaLocation::Remote("https://files.example/abc.mp4".to_string())
        );
    }

    #[tokio::test]
    async fn failed_split_falls_through_to_rehost() {
        let uploader = Arc::new(CountingUploader {
            calls: AtomicUsize::new(0),
        });
        let post = PostProcessor::with_parts(
            DeliveryLimits::default(),
            Arc::new(FailingSplitter),
            Some(Arc::clone(&uploader) as Arc<dyn MediaUploader>),
            artifacts(),
        );
        let mut media = media_with(vec![MediaItem::local(
            PathBuf::from("/tmp/huge.mp4"),
            120 * 1024 * 1024,
            "video/mp4",
        )]);

        let report = post.adapt_for_delivery(&mut media).await;
        assert_eq!(report.rehosted, 1);
        assert_eq!(report.degraded, 0);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_split_without_rehoster_degrades_to_link() {
        let post = PostProcessor::with_parts(
            DeliveryLimits::default(),
            Arc::new(FailingSplitter),
            None,
            artifacts(),
        );
        let mut media = media_with(vec![MediaItem::local(
            PathBuf::from("/tmp/huge.mp4"),
            120 * 1024 * 1024,
            "video/mp4",
        )]);

        let report = post.adapt_for_delivery(&mut media).await;
        assert_eq!(report.degraded, 1);
        assert!(media.items[0].is_fallback_link());
    }

    #[tokio::test]
    async fn degrade_oversized_targets_only_offenders() {
        let post = processor();
        let mut media = media_with(vec![
            MediaItem::remote("https://cdn.example/ok.jpg", 1024, "image/jpeg"),
            MediaItem::remote("https://cdn.example/huge.mp4", 120 * 1024 * 1024, "video/mp4"),
        ]);

        post.degrade_oversized(&mut media);
        assert!(!media.items[0].is_fallback_link());
        assert!(media.items[1].is_fallback_link());
    }
}
