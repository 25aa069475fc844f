//! Resolution cache with a TTL and a negative side.
//!
//! The positive side stores fully adapted results so a repeated link
//! is answered without touching any strategy. The negative side
//! remembers permanent per-strategy failures so a later resolution of
//! the same URL skips straight past strategies that cannot succeed.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::platforms::NormalizedUrl;
use crate::strategies::{ResolvedMedia, StrategyKind};

struct CacheEntry {
    media: Arc<ResolvedMedia>,
    stored_at: Instant,
}

pub struct ResultCache {
    entries: DashMap<NormalizedUrl, CacheEntry>,
    negative: DashMap<(NormalizedUrl, StrategyKind), Instant>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            negative: DashMap::new(),
            ttl,
        }
    }

    /// Expired entries are evicted lazily on read.
    pub fn get(&self, url: &NormalizedUrl) -> Option<Arc<ResolvedMedia>> {
        let entry = self.entries.get(url)?;
        if entry.stored_at.elapsed() >= self.ttl {
            drop(entry);
            self.entries.remove(url);
            return None;
        }
        Some(Arc::clone(&entry.media))
    }

    pub fn insert(&self, url: NormalizedUrl, media: Arc<ResolvedMedia>) {
        self.entries.insert(
            url,
            CacheEntry {
                media,
                stored_at: Instant::now(),
            },
        );
    }

    /// Remember that `strategy` failed permanently for `url`.
    pub fn mark_failed(&self, url: NormalizedUrl, strategy: StrategyKind) {
        self.negative.insert((url, strategy), Instant::now());
    }

    pub fn is_marked_failed(&self, url: &NormalizedUrl, strategy: StrategyKind) -> bool {
        let key = (url.clone(), strategy);
        let expired = match self.negative.get(&key) {
            Some(marked_at) => marked_at.elapsed() >= self.ttl,
            None => return false,
        };
        if expired {
            self.negative.remove(&key);
            return false;
        }
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
